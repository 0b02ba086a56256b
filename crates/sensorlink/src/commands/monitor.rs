//! Headless device detail session.
//!
//! Signs in the configured identity, opens the device, and reports
//! connection changes and the latest message until interrupted.

use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;
use sensorlink_core::views::DEVICE_DETAIL_VIEW;
use sensorlink_core::{
    App, AppServices, ConnectionState, Device, DeviceDetailView, DeviceStatus, IdentitySignal,
    MqttConnector, StaticDeviceDirectory,
};

use crate::cli::MonitorArgs;
use crate::commands::Context;
use crate::error::CliError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn detail(app: &mut App) -> Result<&mut DeviceDetailView, CliError> {
    app.navigator_mut()
        .view_mut::<DeviceDetailView>(DEVICE_DETAIL_VIEW)
        .ok_or_else(|| CliError::Internal("device detail view is not registered".into()))
}

pub async fn handle(args: MonitorArgs, ctx: &Context) -> Result<(), CliError> {
    let dashboard = ctx.dashboard()?;
    let identity = sensorlink_config::resolve_identity(&ctx.config)?
        .ok_or_else(|| ctx.no_identity())?;

    let device = Device {
        status: DeviceStatus::Online,
        ..Device::new(
            args.device_id.clone(),
            args.name.unwrap_or_else(|| args.device_id.clone()),
            args.location,
        )
    };
    let directory = StaticDeviceDirectory::new();
    directory.insert(identity.uid.clone(), device.clone());

    let signal = IdentitySignal::new();
    signal.publish(Some(identity));

    let services = AppServices {
        settings: Arc::new(ctx.settings_store()),
        devices: Arc::new(directory),
        connector: Arc::new(MqttConnector),
    };
    let mut app = App::new(&dashboard, signal, services)?;
    app.start().await?;
    app.open_device(device).await?;

    let forwarding = app.integration().snapshot();
    let (mut state, topic) = {
        let view = detail(&mut app)?;
        let state = view
            .watch_connection()
            .ok_or_else(|| CliError::Internal("no realtime session was opened".into()))?;
        (state, view.topic().unwrap_or_default().to_owned())
    };

    if !ctx.quiet {
        let target = forwarding
            .endpoint
            .filter(|_| forwarding.enabled)
            .map_or_else(|| "off".dimmed().to_string(), |e| e.green().to_string());
        eprintln!("Monitoring {} (forwarding: {target})", topic.bold());
    }

    let result = watch(&mut app, &mut state, args.duration.map(Duration::from_secs)).await;
    app.shutdown().await;
    result
}

async fn watch(
    app: &mut App,
    state: &mut tokio::sync::watch::Receiver<ConnectionState>,
    duration: Option<Duration>,
) -> Result<(), CliError> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut last_printed = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                return Ok(());
            }
            () = &mut deadline => return Ok(()),
            changed = state.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let current = *state.borrow_and_update();
                eprintln!("connection: {current}");
                if current == ConnectionState::Error {
                    return Err(CliError::ConnectionFailed {
                        reason: "the broker session failed; rerun with -v for details".into(),
                    });
                }
            }
            _ = ticker.tick() => {
                let Some(message) = detail(app)?.last_message() else {
                    continue;
                };
                if last_printed != Some(message.received_at) {
                    last_printed = Some(message.received_at);
                    println!(
                        "{} {} {}",
                        message.received_at.format("%H:%M:%S").dimmed(),
                        message.topic.cyan(),
                        message.payload
                    );
                }
            }
        }
    }
}
