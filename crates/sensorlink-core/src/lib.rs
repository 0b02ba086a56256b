// sensorlink-core: Dashboard orchestration between sensorlink-api and front ends.

pub mod app;
pub mod config;
pub mod credentials;
pub mod devices;
pub mod error;
pub mod identity;
pub mod integration;
pub mod navigator;
pub mod pipeline;
pub mod realtime;
pub mod settings;
pub mod telemetry;
pub mod view;
pub mod views;

// ── Primary re-exports ──────────────────────────────────────────────
pub use app::{App, AppServices};
pub use config::{BackendSettings, BrokerSettings, DashboardConfig};
pub use credentials::{BearerToken, CredentialCache};
pub use devices::{
    Device, DeviceDirectory, DeviceFilter, DeviceStatus, NewDevice, StaticDeviceDirectory,
};
pub use error::CoreError;
pub use identity::{Identity, IdentitySignal, StaticTokenSource, TokenSource};
pub use integration::{ChangeSubscription, IntegrationCoordinator, IntegrationSnapshot};
pub use navigator::{NavRequest, NavigatorHandle, ViewNavigator};
pub use pipeline::{ForwardingPipeline, PipelineOutcome};
pub use realtime::{
    BrokerConnector, BrokerLink, ConnectionManager, ConnectionState, MqttConnector,
    RealtimeMessage,
};
pub use settings::{
    FileSettingsStore, IntegrationSettings, MemorySettingsStore, SettingsStore, SettingsUpdate,
};
pub use telemetry::{TelemetrySink, TemperaturePoint, TemperatureSeries};
pub use view::{DisplayRegion, View, ViewBase, ViewData, ViewLifecycle};
pub use views::{AuthView, DeviceDetailView, DeviceListView, IntegrationChange};
