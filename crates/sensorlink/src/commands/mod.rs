//! Command handlers and the context they share.

pub mod config_cmd;
pub mod integration;
pub mod monitor;

use std::path::PathBuf;

use sensorlink_config::Config;
use sensorlink_core::{DashboardConfig, FileSettingsStore};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Loaded configuration plus the paths global flags resolved to.
pub struct Context {
    pub config: Config,
    pub config_path: PathBuf,
    pub settings_dir: PathBuf,
    pub quiet: bool,
}

impl Context {
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let config_path = global
            .config
            .clone()
            .unwrap_or_else(sensorlink_config::config_path);
        let config = sensorlink_config::load_config_from(&config_path)?;
        let settings_dir = global
            .data_dir
            .clone()
            .unwrap_or_else(sensorlink_config::settings_dir);

        tracing::debug!(
            config = %config_path.display(),
            settings = %settings_dir.display(),
            "configuration loaded"
        );

        Ok(Self {
            config,
            config_path,
            settings_dir,
            quiet: global.quiet,
        })
    }

    pub fn dashboard(&self) -> Result<DashboardConfig, CliError> {
        Ok(sensorlink_config::to_dashboard_config(&self.config)?)
    }

    pub fn settings_store(&self) -> FileSettingsStore {
        FileSettingsStore::new(&self.settings_dir)
    }

    /// The configured identity uid, required by every integration command.
    pub fn require_uid(&self) -> Result<String, CliError> {
        self.config
            .identity
            .uid
            .clone()
            .filter(|uid| !uid.trim().is_empty())
            .ok_or_else(|| self.no_identity())
    }

    pub fn no_identity(&self) -> CliError {
        CliError::NoIdentity {
            path: self.config_path.display().to_string(),
        }
    }
}
