// ── Core error types ──
//
// User-facing errors from sensorlink-core. Consumers see domain failures
// (unknown view, unhealthy endpoint, missing identity) rather than raw
// HTTP or MQTT errors. The `From<sensorlink_api::Error>` impl translates
// transport-layer errors into domain-appropriate variants.

use std::time::Duration;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Navigation ───────────────────────────────────────────────────
    #[error("View not found: {name}")]
    ViewNotFound { name: String },

    #[error("A view named '{name}' is already registered")]
    DuplicateViewName { name: String },

    // ── Identity & credentials ───────────────────────────────────────
    #[error("No authenticated identity")]
    NoAuthenticatedIdentity,

    #[error("Failed to refresh identity token: {message}")]
    TokenRefresh { message: String },

    // ── Integration ──────────────────────────────────────────────────
    #[error("Invalid endpoint '{input}': {reason}")]
    InvalidEndpoint { input: String, reason: String },

    #[error("Health check failed for {endpoint}: {reason}")]
    HealthCheckFailed { endpoint: String, reason: String },

    #[error("Health check for {endpoint} timed out after {timeout:?}")]
    HealthCheckTimeout { endpoint: String, timeout: Duration },

    #[error("Health check for {endpoint} was cancelled")]
    HealthCheckCancelled { endpoint: String },

    // ── Data ─────────────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Invalid device: {reason}")]
    InvalidDevice { reason: String },

    #[error("Settings store error: {message}")]
    Settings { message: String },

    // ── Remote API (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Broker connection error: {reason}")]
    Connection { reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sensorlink_api::Error> for CoreError {
    fn from(err: sensorlink_api::Error) -> Self {
        use sensorlink_api::Error as ApiError;

        match err {
            ApiError::Api {
                status, message, ..
            } => CoreError::Api {
                message,
                status: Some(status),
            },
            ApiError::Transport(ref e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            ApiError::Timeout { timeout } => CoreError::Api {
                message: format!("request timed out after {timeout:?}"),
                status: None,
            },
            ApiError::Cancelled => CoreError::Api {
                message: "request cancelled".into(),
                status: None,
            },
            ApiError::Disabled => CoreError::Config {
                message: "backend integration is not enabled".into(),
            },
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            ApiError::InvalidBrokerUrl { url, reason } => CoreError::Config {
                message: format!("Invalid broker URL {url}: {reason}"),
            },
            ApiError::Broker(reason) => CoreError::Connection { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_is_preserved() {
        let err: CoreError = sensorlink_api::Error::Api {
            status: 502,
            message: "bad gateway".into(),
            details: None,
        }
        .into();
        assert!(matches!(
            err,
            CoreError::Api {
                status: Some(502),
                ..
            }
        ));
    }

    #[test]
    fn broker_url_maps_to_config() {
        let err: CoreError = sensorlink_api::Error::InvalidBrokerUrl {
            url: "tcp://x".into(),
            reason: "scheme".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Config { .. }));
    }
}
