//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use sensorlink_config::ConfigError;
use sensorlink_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Identity ─────────────────────────────────────────────────────

    #[error("No identity configured")]
    #[diagnostic(
        code(sensorlink::no_identity),
        help(
            "Set [identity].uid in the config file.\n\
             Run: sensorlink config init --uid <uid>\n\
             Config: {path}"
        )
    )]
    NoIdentity { path: String },

    #[error("No identity token available for '{uid}'")]
    #[diagnostic(
        code(sensorlink::no_token),
        help(
            "Store one in the system keyring under service 'sensorlink', entry '{uid}/id-token',\n\
             or set [identity].token_env to an environment variable holding it."
        )
    )]
    NoToken { uid: String },

    // ── Backend ──────────────────────────────────────────────────────

    #[error("Backend at {endpoint} is not healthy")]
    #[diagnostic(
        code(sensorlink::health_check_failed),
        help("{reason}\nCheck that {endpoint}/health answers 200 and try again.")
    )]
    HealthCheckFailed { endpoint: String, reason: String },

    #[error("Backend at {endpoint} did not answer within {seconds}s")]
    #[diagnostic(
        code(sensorlink::timeout),
        help("Raise [backend].health_timeout_secs or check the backend's responsiveness.")
    )]
    Timeout { endpoint: String, seconds: u64 },

    #[error("Backend error: {message}")]
    #[diagnostic(code(sensorlink::api_error))]
    Api { message: String },

    #[error("Could not reach the realtime broker")]
    #[diagnostic(code(sensorlink::connection_failed), help("{reason}"))]
    ConnectionFailed { reason: String },

    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(sensorlink::not_found))]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("Configuration already exists at {path}")]
    #[diagnostic(
        code(sensorlink::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sensorlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(sensorlink::config))]
    Config(Box<ConfigError>),

    #[error("{0}")]
    #[diagnostic(code(sensorlink::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoIdentity { .. } | Self::NoToken { .. } => exit_code::AUTH,
            Self::HealthCheckFailed { .. } | Self::ConnectionFailed { .. } => {
                exit_code::CONNECTION
            }
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoToken { uid } => CliError::NoToken { uid },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidEndpoint { input, reason } => CliError::Validation {
                field: "endpoint".into(),
                reason: format!("'{input}': {reason}"),
            },

            CoreError::HealthCheckFailed { endpoint, reason } => {
                CliError::HealthCheckFailed { endpoint, reason }
            }

            CoreError::HealthCheckTimeout { endpoint, timeout } => CliError::Timeout {
                endpoint,
                seconds: timeout.as_secs(),
            },

            CoreError::HealthCheckCancelled { endpoint } => {
                CliError::Internal(format!("health check of {endpoint} was cancelled"))
            }

            CoreError::NoAuthenticatedIdentity => CliError::NoIdentity {
                path: sensorlink_config::config_path().display().to_string(),
            },

            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
            },

            CoreError::InvalidDevice { reason } => CliError::Validation {
                field: "device".into(),
                reason,
            },

            CoreError::ViewNotFound { name } => CliError::NotFound {
                resource_type: "view".into(),
                identifier: name,
            },

            CoreError::Connection { reason } => CliError::ConnectionFailed { reason },

            CoreError::Api { message, .. } | CoreError::TokenRefresh { message } => {
                CliError::Api { message }
            }

            CoreError::Config { message } | CoreError::Settings { message } => {
                CliError::Validation {
                    field: "settings".into(),
                    reason: message,
                }
            }

            other @ CoreError::DuplicateViewName { .. } => CliError::Internal(other.to_string()),

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn health_failures_map_to_connection_exit_code() {
        let err: CliError = CoreError::HealthCheckFailed {
            endpoint: "http://example.com:4000".into(),
            reason: "HTTP 503".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }

    #[test]
    fn timeout_keeps_whole_seconds() {
        let err: CliError = CoreError::HealthCheckTimeout {
            endpoint: "http://slow".into(),
            timeout: Duration::from_secs(5),
        }
        .into();
        assert!(matches!(err, CliError::Timeout { seconds: 5, .. }));
        assert_eq!(err.exit_code(), exit_code::TIMEOUT);
    }

    #[test]
    fn invalid_endpoint_is_a_usage_error() {
        let err: CliError = CoreError::InvalidEndpoint {
            input: "::".into(),
            reason: "not a URL".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
