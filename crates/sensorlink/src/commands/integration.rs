//! Integration subcommand handlers.

use std::sync::Arc;

use owo_colors::OwoColorize;
use sensorlink_api::SensorApiClient;
use sensorlink_core::{
    CoreError, DashboardConfig, IntegrationCoordinator, SettingsStore,
};

use crate::cli::{IntegrationArgs, IntegrationCommand};
use crate::commands::Context;
use crate::error::CliError;

fn coordinator(
    dashboard: &DashboardConfig,
    store: Arc<dyn SettingsStore>,
) -> Result<IntegrationCoordinator, CliError> {
    let backend = &dashboard.backend;
    let http = backend
        .transport
        .build_client()
        .map_err(CoreError::from)?;
    let api = SensorApiClient::new(http, Some(&backend.base_url), &backend.sensor_path);
    Ok(IntegrationCoordinator::new(
        store,
        api,
        backend.base_url.clone(),
        backend.health_timeout,
    ))
}

pub async fn handle(args: IntegrationArgs, ctx: &Context) -> Result<(), CliError> {
    let uid = ctx.require_uid()?;
    let store: Arc<dyn SettingsStore> = Arc::new(ctx.settings_store());

    match args.command {
        IntegrationCommand::Enable { endpoint } => {
            let coordinator = coordinator(&ctx.dashboard()?, Arc::clone(&store))?;
            if !ctx.quiet {
                eprintln!("Checking {} ...", endpoint.trim());
            }
            let endpoint = coordinator.verify_and_enable(&uid, &endpoint).await?;
            if !ctx.quiet {
                println!("{} forwarding to {endpoint}", "enabled".green());
            }
            Ok(())
        }

        IntegrationCommand::Disable => {
            let coordinator = coordinator(&ctx.dashboard()?, Arc::clone(&store))?;
            coordinator.disable(Some(&uid)).await?;
            if !ctx.quiet {
                println!("{} forwarding", "disabled".yellow());
            }
            Ok(())
        }

        IntegrationCommand::Status => {
            let settings = store.load(&uid).await?.unwrap_or_default();
            let state = if settings.active_endpoint().is_some() {
                "enabled".green().to_string()
            } else {
                "disabled".dimmed().to_string()
            };
            let dash = || "-".to_owned();

            println!("identity:   {uid}");
            println!("forwarding: {state}");
            println!(
                "endpoint:   {}",
                settings.backend_endpoint.clone().unwrap_or_else(dash)
            );
            println!(
                "verified:   {}",
                settings
                    .backend_verified_at
                    .map_or_else(dash, |at| at.to_rfc3339())
            );
            println!(
                "updated:    {}",
                settings.updated_at.map_or_else(dash, |at| at.to_rfc3339())
            );
            Ok(())
        }
    }
}
