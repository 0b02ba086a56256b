use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `sensorlink-api` crate.
///
/// Covers every failure mode across both surfaces: the HTTP sensor
/// backend (health probe, reading uploads) and the MQTT broker session.
/// `sensorlink-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request did not complete within the allotted time.
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Request was aborted by its cancellation token.
    #[error("Request cancelled")]
    Cancelled,

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Sensor backend ──────────────────────────────────────────────
    /// Non-2xx response from the backend, with the parsed error body if any.
    #[error("Backend API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Upload attempted while the client has no enabled base URL.
    #[error("Backend endpoint not configured or disabled")]
    Disabled,

    // ── Broker ──────────────────────────────────────────────────────
    /// Broker address is not a usable `ws://` / `wss://` URL.
    #[error("Invalid broker URL {url}: {reason}")]
    InvalidBrokerUrl { url: String, reason: String },

    /// The MQTT client rejected a request (request queue closed or full).
    #[error("Broker client error: {0}")]
    Broker(String),
}

impl Error {
    /// Returns `true` if this error represents an elapsed deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
