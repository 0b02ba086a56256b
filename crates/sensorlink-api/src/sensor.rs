// Sensor backend HTTP client
//
// Uploads parsed telemetry readings to `<base>/api/sensors/data` with a
// bearer token. The base URL is swapped at runtime when an integration
// endpoint is enabled or disabled, so it lives behind a lock and the
// client is shared as a cheap clone.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::Error;

/// Default path of the reading upload endpoint, relative to the base URL.
pub const DEFAULT_SENSOR_PATH: &str = "/api/sensors/data";

/// Request body for a single telemetry reading.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub device_id: String,
    pub device_name: String,
    #[serde(serialize_with = "serialize_iso_millis")]
    pub recorded_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// ISO-8601 with millisecond precision and a `Z` suffix
/// (e.g. `2024-06-15T10:30:00.000Z`).
fn serialize_iso_millis<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Debug, Default)]
struct Target {
    base_url: Option<String>,
    enabled: bool,
}

/// HTTP client for the sensor backend.
///
/// Cheaply cloneable; all clones share the same base URL and enabled flag.
#[derive(Debug, Clone)]
pub struct SensorApiClient {
    http: reqwest::Client,
    sensor_path: Arc<str>,
    target: Arc<RwLock<Target>>,
}

impl SensorApiClient {
    /// Create a client with an optional initial base URL. The client starts
    /// disabled; call [`enable`](Self::enable) once an endpoint is verified.
    pub fn new(http: reqwest::Client, base_url: Option<&str>, sensor_path: &str) -> Self {
        let client = Self {
            http,
            sensor_path: Arc::from(sensor_path),
            target: Arc::new(RwLock::new(Target::default())),
        };
        client.set_base_url(base_url);
        client
    }

    /// The underlying HTTP client (shared with the health probe).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Replace the base URL. Trailing slashes are trimmed; `None` clears it.
    pub fn set_base_url(&self, url: Option<&str>) {
        let trimmed = url
            .map(|u| u.trim_end_matches('/').to_owned())
            .filter(|u| !u.is_empty());
        self.write_target().base_url = trimmed;
    }

    /// Enable uploads, optionally switching to a new base URL first.
    /// Stays disabled when no base URL is known.
    pub fn enable(&self, endpoint: Option<&str>) {
        if endpoint.is_some() {
            self.set_base_url(endpoint);
        }
        let mut target = self.write_target();
        target.enabled = target.base_url.is_some();
    }

    /// Disable uploads. The base URL is kept.
    pub fn disable(&self) {
        self.write_target().enabled = false;
    }

    /// `true` when enabled and a base URL is set.
    pub fn is_enabled(&self) -> bool {
        let target = self.read_target();
        target.enabled && target.base_url.is_some()
    }

    /// The current base URL, if any.
    pub fn base_url(&self) -> Option<String> {
        self.read_target().base_url.clone()
    }

    /// Upload one reading.
    ///
    /// Returns the response JSON, or an empty object when the backend
    /// replies with a non-JSON success body.
    pub async fn send_reading(
        &self,
        bearer: &str,
        reading: &SensorReading,
    ) -> Result<serde_json::Value, Error> {
        let base = {
            let target = self.read_target();
            match (&target.base_url, target.enabled) {
                (Some(base), true) => base.clone(),
                _ => return Err(Error::Disabled),
            }
        };
        let url = format!("{base}{}", self.sensor_path);

        debug!(url = %url, device = %reading.device_id, "POST sensor reading");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(bearer)
            .json(reading)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let details = serde_json::from_str::<serde_json::Value>(&body).ok();
            return Err(Error::Api {
                status: status.as_u16(),
                message: format!("failed to send sensor reading (HTTP {status})"),
                details,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body).unwrap_or_else(|_| serde_json::json!({})))
    }

    fn read_target(&self) -> std::sync::RwLockReadGuard<'_, Target> {
        self.target.read().expect("sensor target lock poisoned")
    }

    fn write_target(&self) -> std::sync::RwLockWriteGuard<'_, Target> {
        self.target.write().expect("sensor target lock poisoned")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: Option<&str>) -> SensorApiClient {
        SensorApiClient::new(reqwest::Client::new(), base, DEFAULT_SENSOR_PATH)
    }

    #[test]
    fn base_url_trailing_slashes_are_trimmed() {
        let c = client(Some("http://localhost:4000///"));
        assert_eq!(c.base_url().as_deref(), Some("http://localhost:4000"));
    }

    #[test]
    fn starts_disabled_even_with_base_url() {
        let c = client(Some("http://localhost:4000"));
        assert!(!c.is_enabled());
    }

    #[test]
    fn enable_without_base_stays_disabled() {
        let c = client(None);
        c.enable(None);
        assert!(!c.is_enabled());
    }

    #[test]
    fn enable_switches_base_url() {
        let c = client(Some("http://localhost:4000"));
        c.enable(Some("https://api.example.com/v1/"));
        assert!(c.is_enabled());
        assert_eq!(c.base_url().as_deref(), Some("https://api.example.com/v1"));

        c.disable();
        assert!(!c.is_enabled());
        assert_eq!(c.base_url().as_deref(), Some("https://api.example.com/v1"));
    }

    #[test]
    fn clones_share_target() {
        let a = client(None);
        let b = a.clone();
        a.enable(Some("http://example.com"));
        assert!(b.is_enabled());
    }

    #[test]
    fn reading_serializes_camel_case_with_millis() {
        let reading = SensorReading {
            device_id: "dev-1".into(),
            device_name: "Boiler".into(),
            recorded_at: DateTime::parse_from_rfc3339("2024-06-15T10:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            payload: serde_json::json!({ "temperature": 21.5 }),
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["deviceId"], "dev-1");
        assert_eq!(json["deviceName"], "Boiler");
        assert_eq!(json["recordedAt"], "2024-06-15T10:30:00.000Z");
        assert_eq!(json["payload"]["temperature"], 21.5);
    }

    #[tokio::test]
    async fn send_while_disabled_is_rejected() {
        let c = client(Some("http://localhost:4000"));
        let reading = SensorReading {
            device_id: "d".into(),
            device_name: "n".into(),
            recorded_at: Utc::now(),
            payload: serde_json::Value::Null,
        };
        let result = c.send_reading("token", &reading).await;
        assert!(matches!(result, Err(Error::Disabled)), "got: {result:?}");
    }
}
