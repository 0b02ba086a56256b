//! Device records and the directory that owns them.
//!
//! Device persistence is external. A [`DeviceDirectory`] lists, registers,
//! updates and removes the devices owned by an identity; the list view
//! filters and orders them for display.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::CoreError;

/// Reported device status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    #[default]
    Offline,
}

/// A monitored device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    /// Last path segment of the device's realtime topic.
    pub location: String,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location: location.into(),
            status: DeviceStatus::default(),
            device_type: None,
            battery_level: None,
            last_seen: None,
            created_at: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == DeviceStatus::Online
    }
}

/// Operator input for registering a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDevice {
    pub name: String,
    /// Defaults to `sensor`.
    pub device_type: Option<String>,
    /// Defaults to `unassigned`.
    pub location: Option<String>,
}

const DEFAULT_DEVICE_TYPE: &str = "sensor";
const DEFAULT_LOCATION: &str = "unassigned";
const FULL_BATTERY: u8 = 100;

impl NewDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Build the stored record: trimmed fields, defaults filled in, offline,
    /// full battery, stamped with `now`.
    pub fn into_device(self, id: impl Into<String>, now: DateTime<Utc>) -> Result<Device, CoreError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidDevice {
                reason: "device name is empty".into(),
            });
        }
        let non_blank = |value: Option<String>, fallback: &str| {
            value
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| fallback.to_owned())
        };

        Ok(Device {
            id: id.into(),
            name: name.to_owned(),
            location: non_blank(self.location, DEFAULT_LOCATION),
            status: DeviceStatus::Offline,
            device_type: Some(non_blank(self.device_type, DEFAULT_DEVICE_TYPE)),
            battery_level: Some(FULL_BATTERY),
            last_seen: Some(now),
            created_at: Some(now),
        })
    }
}

/// Status filter applied by the device list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DeviceFilter {
    #[default]
    All,
    Online,
    Offline,
}

impl DeviceFilter {
    pub fn matches(self, device: &Device) -> bool {
        match self {
            Self::All => true,
            Self::Online => device.status == DeviceStatus::Online,
            Self::Offline => device.status == DeviceStatus::Offline,
        }
    }
}

/// Newest first; devices without a creation time go last.
pub fn sort_newest_first(devices: &mut [Device]) {
    devices.sort_by_key(|d| std::cmp::Reverse(d.created_at));
}

/// Store of device records, scoped by owner.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn list_devices(&self, uid: &str) -> Result<Vec<Device>, CoreError>;

    /// Register a device and return the stored record.
    async fn add_device(&self, uid: &str, device: NewDevice) -> Result<Device, CoreError>;

    /// Set a device's status and refresh its `last_seen`.
    async fn set_status(
        &self,
        uid: &str,
        device_id: &str,
        status: DeviceStatus,
    ) -> Result<(), CoreError>;

    async fn remove_device(&self, uid: &str, device_id: &str) -> Result<(), CoreError>;
}

/// In-memory directory keyed by owner uid.
#[derive(Debug, Default)]
pub struct StaticDeviceDirectory {
    by_owner: RwLock<HashMap<String, Vec<Device>>>,
}

impl StaticDeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uid: impl Into<String>, device: Device) {
        self.by_owner
            .write()
            .expect("device directory lock poisoned")
            .entry(uid.into())
            .or_default()
            .push(device);
    }
}

#[async_trait]
impl DeviceDirectory for StaticDeviceDirectory {
    async fn list_devices(&self, uid: &str) -> Result<Vec<Device>, CoreError> {
        Ok(self
            .by_owner
            .read()
            .expect("device directory lock poisoned")
            .get(uid)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_device(&self, uid: &str, device: NewDevice) -> Result<Device, CoreError> {
        let device = device.into_device(uuid::Uuid::new_v4().to_string(), Utc::now())?;
        self.insert(uid, device.clone());
        Ok(device)
    }

    async fn set_status(
        &self,
        uid: &str,
        device_id: &str,
        status: DeviceStatus,
    ) -> Result<(), CoreError> {
        let mut owners = self.by_owner.write().expect("device directory lock poisoned");
        let device = owners
            .get_mut(uid)
            .and_then(|devices| devices.iter_mut().find(|d| d.id == device_id))
            .ok_or_else(|| CoreError::DeviceNotFound {
                identifier: device_id.to_owned(),
            })?;
        device.status = status;
        device.last_seen = Some(Utc::now());
        Ok(())
    }

    async fn remove_device(&self, uid: &str, device_id: &str) -> Result<(), CoreError> {
        let mut owners = self.by_owner.write().expect("device directory lock poisoned");
        let devices = owners.get_mut(uid).ok_or_else(|| CoreError::DeviceNotFound {
            identifier: device_id.to_owned(),
        })?;
        let before = devices.len();
        devices.retain(|d| d.id != device_id);
        if devices.len() == before {
            return Err(CoreError::DeviceNotFound {
                identifier: device_id.to_owned(),
            });
        }
        Ok(())
    }
}
