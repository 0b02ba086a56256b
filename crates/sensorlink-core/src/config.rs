// ── Runtime dashboard configuration ──
//
// These types describe *where* the dashboard connects and how it tunes
// its caches. They never touch disk: the binary loads a profile through
// sensorlink-config and hands a `DashboardConfig` in.

use std::time::Duration;

use sensorlink_api::health::DEFAULT_HEALTH_TIMEOUT;
use sensorlink_api::sensor::DEFAULT_SENSOR_PATH;
use sensorlink_api::{BrokerOptions, TransportConfig};

/// Default backend used when no integration endpoint is enabled.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:4000";

/// Default broker address (public Mosquitto test broker over WSS).
pub const DEFAULT_BROKER_URL: &str = "wss://test.mosquitto.org:8081/mqtt";

/// Default topic prefix; device topics are `<prefix>/<location>`.
pub const DEFAULT_TOPIC_PREFIX: &str = "sensors";

/// Default credential cache lifetime in minutes.
pub const DEFAULT_TOKEN_CACHE_MINUTES: u64 = 5;

/// Default number of points kept by the temperature chart.
pub const DEFAULT_CHART_POINTS: usize = 20;

/// Realtime broker settings.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub url: String,
    pub topic_prefix: String,
    pub options: BrokerOptions,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_BROKER_URL.into(),
            topic_prefix: DEFAULT_TOPIC_PREFIX.into(),
            options: BrokerOptions::default(),
        }
    }
}

/// Sensor backend settings.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Base URL restored whenever the integration is disabled.
    pub base_url: String,
    pub sensor_path: String,
    pub token_cache_minutes: u64,
    pub health_timeout: Duration,
    pub transport: TransportConfig,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.into(),
            sensor_path: DEFAULT_SENSOR_PATH.into(),
            token_cache_minutes: DEFAULT_TOKEN_CACHE_MINUTES,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
            transport: TransportConfig::default(),
        }
    }
}

/// Everything the [`App`](crate::App) needs to assemble its services.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub broker: BrokerSettings,
    pub backend: BackendSettings,
    pub chart_max_points: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            backend: BackendSettings::default(),
            chart_max_points: DEFAULT_CHART_POINTS,
        }
    }
}
