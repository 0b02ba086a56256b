//! Shared configuration for the sensorlink binary.
//!
//! A TOML file at the platform config dir, layered over defaults and
//! overridden by `SENSORLINK_*` env vars, plus identity token resolution
//! (env + keyring + plaintext) and translation to
//! `sensorlink_core::DashboardConfig`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sensorlink_api::{BrokerOptions, TlsMode, TransportConfig};
use sensorlink_core::config::{
    DEFAULT_BACKEND_URL, DEFAULT_BROKER_URL, DEFAULT_CHART_POINTS, DEFAULT_TOKEN_CACHE_MINUTES,
    DEFAULT_TOPIC_PREFIX,
};
use sensorlink_core::{
    BackendSettings, BrokerSettings, DashboardConfig, Identity, StaticTokenSource,
};

const KEYRING_SERVICE: &str = "sensorlink";
const MIN_TOKEN_CACHE_MINUTES: u64 = 2;
const MAX_TOKEN_CACHE_MINUTES: u64 = 10;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no identity token configured for '{uid}'")]
    NoToken { uid: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerSection,

    #[serde(default)]
    pub backend: BackendSection,

    /// Identity the headless commands sign in as.
    #[serde(default)]
    pub identity: IdentitySection,

    #[serde(default)]
    pub chart: ChartSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BrokerSection {
    /// WebSocket URL of the MQTT broker.
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// Device topics are `<topic_prefix>/<location>`.
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_true")]
    pub clean_session: bool,

    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,

    pub username: Option<String>,

    /// Broker password (plaintext, prefer keyring).
    pub password: Option<String>,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            topic_prefix: default_topic_prefix(),
            keep_alive_secs: default_keep_alive(),
            clean_session: true,
            client_id_prefix: default_client_id_prefix(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackendSection {
    /// Base URL used whenever the integration is disabled.
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    #[serde(default = "default_sensor_path")]
    pub sensor_path: String,

    /// Identity token cache lifetime, clamped to 2..=10.
    #[serde(default = "default_token_cache_minutes")]
    pub token_cache_minutes: u64,

    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    /// Overall HTTP request timeout.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,

    /// Accept self-signed certificates.
    #[serde(default)]
    pub insecure: bool,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            sensor_path: default_sensor_path(),
            token_cache_minutes: default_token_cache_minutes(),
            health_timeout_secs: default_health_timeout(),
            timeout_secs: default_request_timeout(),
            insecure: false,
            ca_cert: None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IdentitySection {
    pub uid: Option<String>,

    pub email: Option<String>,

    /// Identity token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the identity token.
    pub token_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChartSection {
    #[serde(default = "default_chart_points")]
    pub max_points: usize,
}

impl Default for ChartSection {
    fn default() -> Self {
        Self {
            max_points: default_chart_points(),
        }
    }
}

fn default_broker_url() -> String {
    DEFAULT_BROKER_URL.into()
}
fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.into()
}
fn default_keep_alive() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_client_id_prefix() -> String {
    BrokerOptions::default().client_id_prefix
}
fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.into()
}
fn default_sensor_path() -> String {
    sensorlink_api::sensor::DEFAULT_SENSOR_PATH.into()
}
fn default_token_cache_minutes() -> u64 {
    DEFAULT_TOKEN_CACHE_MINUTES
}
fn default_health_timeout() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    30
}
fn default_chart_points() -> usize {
    DEFAULT_CHART_POINTS
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "sensorlink", "sensorlink")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory holding per-identity integration settings.
pub fn settings_dir() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share").join("settings"),
        |dirs| dirs.data_dir().join("settings"),
    )
}

fn dirs_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("sensorlink");
    p
}

// ── Loading & saving ────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, layered over defaults and under `SENSORLINK_*` env
/// vars (`SENSORLINK_BACKEND__BASE_URL` sets `backend.base_url`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SENSORLINK_").split("__"));

    Ok(figment.extract()?)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(&path, cfg)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Secret resolution ───────────────────────────────────────────────

/// Resolve the identity token: `token_env` → keyring → plaintext.
pub fn resolve_identity_token(identity: &IdentitySection) -> Result<SecretString, ConfigError> {
    let uid = identity.uid.clone().unwrap_or_default();

    // 1. Env var named by the config
    if let Some(ref env_name) = identity.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if !uid.is_empty() {
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{uid}/id-token")) {
            if let Ok(secret) = entry.get_password() {
                return Ok(SecretString::from(secret));
            }
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = identity.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoToken { uid })
}

/// Broker password from the keyring, falling back to plaintext.
fn resolve_broker_password(broker: &BrokerSection, username: &str) -> Option<SecretString> {
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("broker/{username}")) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }
    broker.password.clone().map(SecretString::from)
}

/// Build the configured identity, or `None` when no uid is set.
pub fn resolve_identity(cfg: &Config) -> Result<Option<Identity>, ConfigError> {
    let Some(uid) = cfg.identity.uid.as_deref().filter(|u| !u.trim().is_empty()) else {
        return Ok(None);
    };
    let token = resolve_identity_token(&cfg.identity)?;
    Ok(Some(Identity::new(
        uid,
        cfg.identity.email.clone(),
        Arc::new(StaticTokenSource::new(token)),
    )))
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<(), ConfigError> {
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|e| ConfigError::Validation {
            field: field.into(),
            reason: format!("invalid URL '{raw}': {e}"),
        })
}

/// Build the core `DashboardConfig`, validating URLs and clamping limits.
pub fn to_dashboard_config(cfg: &Config) -> Result<DashboardConfig, ConfigError> {
    parse_url("broker.url", &cfg.broker.url)?;
    parse_url("backend.base_url", &cfg.backend.base_url)?;
    if cfg.chart.max_points == 0 {
        return Err(ConfigError::Validation {
            field: "chart.max_points".into(),
            reason: "must be at least 1".into(),
        });
    }

    let credentials = cfg.broker.username.as_ref().and_then(|username| {
        resolve_broker_password(&cfg.broker, username).map(|pw| (username.clone(), pw))
    });

    let options = BrokerOptions {
        client_id: None,
        client_id_prefix: cfg.broker.client_id_prefix.clone(),
        clean_session: cfg.broker.clean_session,
        keep_alive: Duration::from_secs(cfg.broker.keep_alive_secs),
        credentials,
    };

    let tls = if cfg.backend.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = cfg.backend.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    Ok(DashboardConfig {
        broker: BrokerSettings {
            url: cfg.broker.url.clone(),
            topic_prefix: cfg.broker.topic_prefix.clone(),
            options,
        },
        backend: BackendSettings {
            base_url: cfg.backend.base_url.trim_end_matches('/').to_owned(),
            sensor_path: cfg.backend.sensor_path.clone(),
            token_cache_minutes: cfg
                .backend
                .token_cache_minutes
                .clamp(MIN_TOKEN_CACHE_MINUTES, MAX_TOKEN_CACHE_MINUTES),
            health_timeout: Duration::from_secs(cfg.backend.health_timeout_secs),
            transport: TransportConfig {
                tls,
                timeout: Duration::from_secs(cfg.backend.timeout_secs),
            },
        },
        chart_max_points: cfg.chart.max_points,
    })
}
