// Backend health probe
//
// `GET <endpoint>/health` bounded by a wall-clock timeout and a
// cancellation token. Either one drops the in-flight request.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Error;
use crate::sensor::SensorApiClient;

const HEALTH_PATH: &str = "/health";

/// Default time allowed for a health probe.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the probe URL for a base endpoint.
pub fn health_url(endpoint: &str) -> String {
    format!("{}{HEALTH_PATH}", endpoint.trim_end_matches('/'))
}

impl SensorApiClient {
    /// Probe `<endpoint>/health`, requiring a 2xx response within `timeout`.
    ///
    /// Returns [`Error::Timeout`] when the deadline elapses,
    /// [`Error::Cancelled`] when `cancel` fires first, and
    /// [`Error::Api`] for a non-2xx status.
    pub async fn check_health(
        &self,
        endpoint: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let url = health_url(endpoint);
        debug!(url = %url, ?timeout, "probing backend health");

        let request = self.http().get(&url).timeout(timeout).send();

        let resp = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = tokio::time::timeout(timeout, request) => match outcome {
                Err(_elapsed) => return Err(Error::Timeout { timeout }),
                Ok(Err(e)) if e.is_timeout() => return Err(Error::Timeout { timeout }),
                Ok(Err(e)) => return Err(Error::Transport(e)),
                Ok(Ok(resp)) => resp,
            },
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: format!("health check failed with status {status}"),
                details: None,
            });
        }

        debug!(url = %url, %status, "backend healthy");
        Ok(())
    }
}
