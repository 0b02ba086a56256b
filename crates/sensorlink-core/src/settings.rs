//! Per-identity integration settings.
//!
//! The record is a small JSON document keyed by identity uid:
//!
//! ```json
//! { "backendEnabled": true, "backendEndpoint": "https://api.example.com",
//!   "backendVerifiedAt": "2024-06-15T10:30:00Z" }
//! ```
//!
//! Enabling stamps `backendVerifiedAt`; disabling removes the endpoint and
//! the verification stamp and records `updatedAt`. Timestamps are assigned
//! by the store, never by the caller.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Stored integration settings for one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSettings {
    #[serde(default)]
    pub backend_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A change to apply to a settings record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsUpdate {
    /// Endpoint verified healthy; turn forwarding on.
    Enable { endpoint: String },
    /// Turn forwarding off and forget the endpoint.
    Disable,
}

impl IntegrationSettings {
    /// Merge `update` into this record, stamping times with `now`.
    pub fn apply(&mut self, update: &SettingsUpdate, now: DateTime<Utc>) {
        match update {
            SettingsUpdate::Enable { endpoint } => {
                self.backend_enabled = true;
                self.backend_endpoint = Some(endpoint.clone());
                self.backend_verified_at = Some(now);
            }
            SettingsUpdate::Disable => {
                self.backend_enabled = false;
                self.backend_endpoint = None;
                self.backend_verified_at = None;
                self.updated_at = Some(now);
            }
        }
    }

    /// The endpoint to activate, if the record says forwarding is on.
    pub fn active_endpoint(&self) -> Option<&str> {
        if self.backend_enabled {
            self.backend_endpoint.as_deref().filter(|e| !e.is_empty())
        } else {
            None
        }
    }
}

/// Persistence for per-identity integration settings.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the record for `uid`; a missing record is `Ok(None)`.
    async fn load(&self, uid: &str) -> Result<Option<IntegrationSettings>, CoreError>;

    /// Merge `update` into the stored record (creating it if absent).
    async fn apply(&self, uid: &str, update: SettingsUpdate) -> Result<(), CoreError>;
}

// ── In-memory store ─────────────────────────────────────────────────

/// Process-local store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    records: Mutex<HashMap<String, IntegrationSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly.
    pub fn insert(&self, uid: impl Into<String>, settings: IntegrationSettings) {
        self.lock().insert(uid.into(), settings);
    }

    pub fn get(&self, uid: &str) -> Option<IntegrationSettings> {
        self.lock().get(uid).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, IntegrationSettings>> {
        self.records.lock().expect("settings store lock poisoned")
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self, uid: &str) -> Result<Option<IntegrationSettings>, CoreError> {
        Ok(self.get(uid))
    }

    async fn apply(&self, uid: &str, update: SettingsUpdate) -> Result<(), CoreError> {
        self.lock()
            .entry(uid.to_owned())
            .or_default()
            .apply(&update, Utc::now());
        Ok(())
    }
}

// ── File store ──────────────────────────────────────────────────────

/// One JSON file per identity under a directory.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    dir: PathBuf,
}

impl FileSettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, uid: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_uid(uid)))
    }
}

/// Keep uids usable as file names.
fn sanitize_uid(uid: &str) -> String {
    uid.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn settings_err(context: &str, err: impl std::fmt::Display) -> CoreError {
    CoreError::Settings {
        message: format!("{context}: {err}"),
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self, uid: &str) -> Result<Option<IntegrationSettings>, CoreError> {
        let path = self.path_for(uid);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| settings_err(&format!("corrupt settings file {}", path.display()), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(settings_err(&format!("cannot read {}", path.display()), e)),
        }
    }

    async fn apply(&self, uid: &str, update: SettingsUpdate) -> Result<(), CoreError> {
        let mut record = self.load(uid).await?.unwrap_or_default();
        record.apply(&update, Utc::now());

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| settings_err("cannot create settings directory", e))?;
        let body = serde_json::to_vec_pretty(&record)
            .map_err(|e| settings_err("cannot encode settings", e))?;

        let path = self.path_for(uid);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| settings_err(&format!("cannot write {}", path.display()), e))?;
        tracing::debug!(uid, path = %path.display(), "integration settings saved");
        Ok(())
    }
}
