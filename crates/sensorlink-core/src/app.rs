// ── Application shell ──
//
// Builds the shared services once, registers the three views, and owns
// the loop that turns identity changes and view navigation requests into
// serialized navigator transitions.

use std::sync::Arc;

use sensorlink_api::SensorApiClient;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::credentials::CredentialCache;
use crate::devices::{Device, DeviceDirectory};
use crate::error::CoreError;
use crate::identity::{Identity, IdentitySignal};
use crate::integration::IntegrationCoordinator;
use crate::navigator::{NavRequest, ViewNavigator};
use crate::pipeline::ForwardingPipeline;
use crate::realtime::BrokerConnector;
use crate::settings::SettingsStore;
use crate::telemetry::TemperatureSeries;
use crate::view::ViewData;
use crate::views::{
    AuthView, DeviceDetailView, DeviceListView, IntegrationChange, AUTH_VIEW, DEVICE_DETAIL_VIEW,
    DEVICE_LIST_VIEW,
};

/// External collaborators the app does not build itself.
pub struct AppServices {
    pub settings: Arc<dyn SettingsStore>,
    pub devices: Arc<dyn DeviceDirectory>,
    pub connector: Arc<dyn BrokerConnector>,
}

pub struct App {
    identity: IdentitySignal,
    identity_rx: watch::Receiver<Option<Identity>>,
    credentials: CredentialCache,
    sensor_api: SensorApiClient,
    integration: IntegrationCoordinator,
    chart: TemperatureSeries,
    navigator: ViewNavigator,
    nav_requests: Option<mpsc::UnboundedReceiver<NavRequest>>,
}

impl App {
    pub fn new(
        config: &DashboardConfig,
        identity: IdentitySignal,
        services: AppServices,
    ) -> Result<Self, CoreError> {
        let backend = &config.backend;
        let http = backend.transport.build_client()?;
        let sensor_api =
            SensorApiClient::new(http, Some(&backend.base_url), &backend.sensor_path);
        let credentials = CredentialCache::new(identity.clone(), backend.token_cache_minutes);
        let integration = IntegrationCoordinator::new(
            services.settings,
            sensor_api.clone(),
            backend.base_url.clone(),
            backend.health_timeout,
        );
        let chart = TemperatureSeries::new(config.chart_max_points);
        let pipeline = ForwardingPipeline::new(
            integration.clone(),
            credentials.clone(),
            sensor_api.clone(),
            Arc::new(chart.clone()),
        );

        let mut navigator = ViewNavigator::new();
        navigator.register_view(Box::new(AuthView::new(identity.clone())))?;
        navigator.register_view(Box::new(DeviceListView::new(
            services.devices,
            integration.clone(),
            identity.clone(),
            backend.base_url.clone(),
        )))?;
        navigator.register_view(Box::new(DeviceDetailView::new(
            services.connector,
            config.broker.clone(),
            pipeline,
            chart.clone(),
        )))?;
        let nav_requests = navigator.take_requests();

        Ok(Self {
            identity_rx: identity.subscribe(),
            identity,
            credentials,
            sensor_api,
            integration,
            chart,
            navigator,
            nav_requests,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn identity(&self) -> &IdentitySignal {
        &self.identity
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    pub fn sensor_api(&self) -> &SensorApiClient {
        &self.sensor_api
    }

    pub fn integration(&self) -> &IntegrationCoordinator {
        &self.integration
    }

    pub fn chart(&self) -> &TemperatureSeries {
        &self.chart
    }

    pub fn navigator(&self) -> &ViewNavigator {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut ViewNavigator {
        &mut self.navigator
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Show the auth view, then apply whatever identity is already signed in.
    pub async fn start(&mut self) -> Result<(), CoreError> {
        self.navigator.navigate_to(AUTH_VIEW, ViewData::Empty).await?;
        let identity = self.identity_rx.borrow_and_update().clone();
        self.handle_identity_change(identity).await;
        Ok(())
    }

    /// Fan an identity change out to the cache, the coordinator, and the
    /// navigator, in that order.
    pub async fn handle_identity_change(&mut self, identity: Option<Identity>) {
        self.credentials.clear();

        if let Err(e) = self.integration.handle_identity_change(identity.as_ref()).await {
            warn!(error = %e, "integration settings unavailable; forwarding disabled");
        }

        let (target, data) = match identity {
            Some(identity) => {
                info!(uid = %identity.uid, "signed in");
                (DEVICE_LIST_VIEW, ViewData::SignedIn(identity))
            }
            None => {
                info!("signed out");
                (AUTH_VIEW, ViewData::Empty)
            }
        };

        if target == AUTH_VIEW && self.navigator.current() == Some(AUTH_VIEW) {
            debug!("already on auth view");
            return;
        }
        if let Err(e) = self.navigator.navigate_to(target, data).await {
            warn!(error = %e, "navigation after identity change failed");
        }
    }

    /// Drive the app until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), CoreError> {
        let mut requests = self
            .nav_requests
            .take()
            .ok_or_else(|| CoreError::Internal("app loop already running".into()))?;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = self.identity_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let identity = self.identity_rx.borrow_and_update().clone();
                    self.handle_identity_change(identity).await;
                }
                Some(request) = requests.recv() => {
                    if let Err(e) = self.navigator.process(request).await {
                        warn!(error = %e, "view navigation request failed");
                    }
                }
            }
        }

        self.nav_requests = Some(requests);
        Ok(())
    }

    /// Apply any queued view navigation requests without blocking.
    pub async fn drain_navigation(&mut self) {
        let Some(mut requests) = self.nav_requests.take() else {
            return;
        };
        while let Ok(request) = requests.try_recv() {
            if let Err(e) = self.navigator.process(request).await {
                warn!(error = %e, "view navigation request failed");
            }
        }
        self.nav_requests = Some(requests);
    }

    // ── Operator actions ─────────────────────────────────────────────

    pub async fn open_device(&mut self, device: Device) -> Result<(), CoreError> {
        self.navigator
            .navigate_to(DEVICE_DETAIL_VIEW, ViewData::Device(device))
            .await
    }

    pub async fn go_back(&mut self) -> Result<(), CoreError> {
        self.navigator.go_back().await
    }

    /// Route an integration change through the device list view.
    pub async fn configure_integration(&mut self, input: &str) -> Result<IntegrationChange, CoreError> {
        let view = self
            .navigator
            .view_mut::<DeviceListView>(DEVICE_LIST_VIEW)
            .ok_or_else(|| CoreError::ViewNotFound {
                name: DEVICE_LIST_VIEW.into(),
            })?;
        view.configure_integration(input).await
    }

    /// Tear down every view and abort any pending verification.
    pub async fn shutdown(&mut self) {
        self.integration.cancel_verification();
        self.navigator.cleanup().await;
        info!("dashboard shut down");
    }
}
