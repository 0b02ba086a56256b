// Device list screen: the signed-in identity's devices, a status filter,
// and the backend integration controls.

use std::any::Any;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::devices::{
    sort_newest_first, Device, DeviceDirectory, DeviceFilter, DeviceStatus, NewDevice,
};
use crate::error::CoreError;
use crate::identity::IdentitySignal;
use crate::integration::{ChangeSubscription, IntegrationCoordinator, IntegrationSnapshot};
use crate::view::{DisplayRegion, View, ViewBase, ViewData};

use super::{DEVICE_DETAIL_VIEW, DEVICE_LIST_VIEW};

/// Result of an operator's integration change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationChange {
    Enabled { endpoint: String },
    Disabled,
}

pub struct DeviceListView {
    base: ViewBase,
    directory: Arc<dyn DeviceDirectory>,
    integration: IntegrationCoordinator,
    identity: IdentitySignal,
    default_endpoint: String,
    current_uid: Option<String>,
    devices: Vec<Device>,
    filter: DeviceFilter,
    integration_status: Arc<Mutex<IntegrationSnapshot>>,
    subscription: Option<ChangeSubscription>,
    configuring: bool,
}

impl DeviceListView {
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        integration: IntegrationCoordinator,
        identity: IdentitySignal,
        default_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            base: ViewBase::new(DEVICE_LIST_VIEW, DisplayRegion::new("device-list-screen")),
            directory,
            integration,
            identity,
            default_endpoint: default_endpoint.into(),
            current_uid: None,
            devices: Vec::new(),
            filter: DeviceFilter::All,
            integration_status: Arc::new(Mutex::new(IntegrationSnapshot::default())),
            subscription: None,
            configuring: false,
        }
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Devices passing the current filter.
    pub fn visible_devices(&self) -> Vec<&Device> {
        self.devices
            .iter()
            .filter(|d| self.filter.matches(d))
            .collect()
    }

    pub fn filter(&self) -> DeviceFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: DeviceFilter) {
        debug!(%filter, "device filter changed");
        self.filter = filter;
    }

    /// `(total, online)` counts.
    pub fn device_counts(&self) -> (usize, usize) {
        let online = self.devices.iter().filter(|d| d.is_online()).count();
        (self.devices.len(), online)
    }

    /// Fetch the device list again.
    pub async fn reload(&mut self) -> Result<(), CoreError> {
        let uid = self.require_uid()?;
        let mut devices = self.directory.list_devices(&uid).await?;
        sort_newest_first(&mut devices);
        debug!(uid = %uid, count = devices.len(), "devices loaded");
        self.devices = devices;
        Ok(())
    }

    fn require_uid(&self) -> Result<String, CoreError> {
        self.current_uid
            .clone()
            .ok_or(CoreError::NoAuthenticatedIdentity)
    }

    /// Register a device for the signed-in identity and refresh the list.
    pub async fn add_device(&mut self, device: NewDevice) -> Result<Device, CoreError> {
        let uid = self.require_uid()?;
        let added = self.directory.add_device(&uid, device).await?;
        info!(device = %added.id, name = %added.name, "device added");
        self.reload().await?;
        Ok(added)
    }

    /// Flip a device between online and offline.
    pub async fn toggle_status(&mut self, device_id: &str) -> Result<DeviceStatus, CoreError> {
        let uid = self.require_uid()?;
        let current = self
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .map(|d| d.status)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: device_id.to_owned(),
            })?;
        let next = match current {
            DeviceStatus::Online => DeviceStatus::Offline,
            DeviceStatus::Offline => DeviceStatus::Online,
        };
        self.directory.set_status(&uid, device_id, next).await?;
        debug!(device = %device_id, status = %next, "device status changed");
        self.reload().await?;
        Ok(next)
    }

    pub async fn remove_device(&mut self, device_id: &str) -> Result<(), CoreError> {
        let uid = self.require_uid()?;
        self.directory.remove_device(&uid, device_id).await?;
        info!(device = %device_id, "device removed");
        self.reload().await
    }

    /// Remove every offline device. Returns how many were removed; the
    /// first failure stops the sweep.
    pub async fn clear_offline(&mut self) -> Result<usize, CoreError> {
        let uid = self.require_uid()?;
        let offline: Vec<String> = self
            .devices
            .iter()
            .filter(|d| !d.is_online())
            .map(|d| d.id.clone())
            .collect();

        let mut removed = 0;
        let mut outcome = Ok(());
        for id in &offline {
            if let Err(e) = self.directory.remove_device(&uid, id).await {
                warn!(device = %id, error = %e, "failed to remove offline device");
                outcome = Err(e);
                break;
            }
            removed += 1;
        }
        info!(removed, "offline devices cleared");
        self.reload().await?;
        outcome.map(|()| removed)
    }

    /// Sign the current identity out; the app returns to the auth view.
    pub fn sign_out(&self) {
        info!("sign out requested from device list");
        self.identity.publish(None);
    }

    /// Ask the navigator to open the detail view for `device_id`.
    pub fn open_device(&self, device_id: &str) -> Result<(), CoreError> {
        let device = self
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: device_id.to_owned(),
            })?;
        if !self
            .base
            .navigate_to(DEVICE_DETAIL_VIEW, ViewData::Device(device.clone()))
        {
            return Err(CoreError::Internal("navigator unavailable".into()));
        }
        Ok(())
    }

    // ── Integration controls ─────────────────────────────────────────

    /// Integration state as last seen by this view.
    pub fn integration_status(&self) -> IntegrationSnapshot {
        self.integration_status
            .lock()
            .expect("integration mirror lock poisoned")
            .clone()
    }

    /// Prefill for the endpoint prompt.
    pub fn endpoint_suggestion(&self) -> String {
        self.integration_status()
            .endpoint
            .unwrap_or_else(|| self.default_endpoint.clone())
    }

    pub fn is_configuring(&self) -> bool {
        self.configuring
    }

    /// Apply operator input: blank disables forwarding, anything else is
    /// verified and enabled.
    pub async fn configure_integration(&mut self, input: &str) -> Result<IntegrationChange, CoreError> {
        let uid = self
            .current_uid
            .clone()
            .or_else(|| self.identity.current().map(|identity| identity.uid))
            .ok_or(CoreError::NoAuthenticatedIdentity)?;

        self.configuring = true;
        let trimmed = input.trim();
        let result = if trimmed.is_empty() {
            self.integration
                .disable(Some(&uid))
                .await
                .map(|()| IntegrationChange::Disabled)
        } else {
            self.integration
                .verify_and_enable(&uid, trimmed)
                .await
                .map(|endpoint| IntegrationChange::Enabled { endpoint })
        };
        self.configuring = false;

        match &result {
            Ok(change) => info!(?change, "integration updated"),
            Err(e) => warn!(error = %e, "integration change failed"),
        }
        result
    }
}

#[async_trait]
impl View for DeviceListView {
    fn base(&self) -> &ViewBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ViewBase {
        &mut self.base
    }

    async fn initialize(&mut self, data: ViewData) {
        let identity = match data {
            ViewData::SignedIn(identity) => Some(identity),
            _ => self.identity.current(),
        };
        let Some(identity) = identity else {
            error!("device list entered without a signed-in identity");
            return;
        };
        self.current_uid = Some(identity.uid.clone());

        if let Err(e) = self.reload().await {
            warn!(uid = %identity.uid, error = %e, "failed to load devices");
            self.devices.clear();
        }

        let mirror = Arc::clone(&self.integration_status);
        *mirror.lock().expect("integration mirror lock poisoned") = self.integration.snapshot();
        self.subscription = Some(self.integration.on_change(move |snapshot| {
            *mirror.lock().expect("integration mirror lock poisoned") = snapshot.clone();
            Ok(())
        }));
    }

    async fn cleanup(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.configuring = false;
        self.devices.clear();
        self.current_uid = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
