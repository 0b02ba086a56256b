//! Clap derive structures for the `sensorlink` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sensorlink -- live sensor telemetry with optional backend forwarding
#[derive(Debug, Parser)]
#[command(
    name = "sensorlink",
    version,
    about = "Watch live sensor telemetry and forward it to a backend",
    long_about = "Subscribes to a device's MQTT topic over WebSocket, charts its\n\
        temperature readings, and forwards every JSON reading to a verified\n\
        sensor backend while the integration is enabled.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file to use instead of the platform default
    #[arg(long, env = "SENSORLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for per-identity integration settings
    #[arg(long, env = "SENSORLINK_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream a device's telemetry until interrupted
    #[command(alias = "m")]
    Monitor(MonitorArgs),

    /// Manage backend forwarding for the configured identity
    #[command(alias = "int")]
    Integration(IntegrationArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct MonitorArgs {
    /// Device identifier attached to forwarded readings
    #[arg(long)]
    pub device_id: String,

    /// Human-readable device name (defaults to the id)
    #[arg(long)]
    pub name: Option<String>,

    /// Location segment of the device topic (`<prefix>/<location>`)
    #[arg(long)]
    pub location: String,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration: Option<u64>,
}

#[derive(Debug, Args)]
pub struct IntegrationArgs {
    #[command(subcommand)]
    pub command: IntegrationCommand,
}

#[derive(Debug, Subcommand)]
pub enum IntegrationCommand {
    /// Verify a backend's /health and enable forwarding to it
    Enable {
        /// Backend URL or host:port (http:// is assumed)
        endpoint: String,
    },

    /// Stop forwarding and forget the endpoint
    Disable,

    /// Show the stored integration settings
    Status,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a config file with defaults and the given identity
    Init {
        /// Identity uid used by headless commands
        #[arg(long)]
        uid: Option<String>,

        /// Identity email
        #[arg(long)]
        email: Option<String>,

        /// Environment variable holding the identity token
        #[arg(long)]
        token_env: Option<String>,

        /// Default backend base URL
        #[arg(long)]
        backend: Option<String>,

        /// Broker WebSocket URL
        #[arg(long)]
        broker: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display the resolved configuration with secrets redacted
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
