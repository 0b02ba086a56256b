//! Config subcommand handlers.

use sensorlink_config::Config;

use crate::cli::ConfigCommand;
use crate::commands::Context;
use crate::error::CliError;

const REDACTED: &str = "********";

/// Replace stored secrets before printing.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    if cfg.identity.token.is_some() {
        cfg.identity.token = Some(REDACTED.into());
    }
    if cfg.broker.password.is_some() {
        cfg.broker.password = Some(REDACTED.into());
    }
    cfg
}

fn to_toml(cfg: &Config) -> Result<String, CliError> {
    toml::to_string_pretty(cfg).map_err(|e| CliError::Validation {
        field: "config".into(),
        reason: format!("failed to serialize config: {e}"),
    })
}

pub fn handle(command: ConfigCommand, ctx: &Context) -> Result<(), CliError> {
    match command {
        ConfigCommand::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }

        ConfigCommand::Show => {
            print!("{}", to_toml(&redacted(&ctx.config))?);
            Ok(())
        }

        ConfigCommand::Init {
            uid,
            email,
            token_env,
            backend,
            broker,
            force,
        } => {
            let path = &ctx.config_path;
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            let mut cfg = Config::default();
            cfg.identity.uid = uid;
            cfg.identity.email = email;
            cfg.identity.token_env = token_env;
            if let Some(backend) = backend {
                cfg.backend.base_url = backend;
            }
            if let Some(broker) = broker {
                cfg.broker.url = broker;
            }
            // Reject URLs now rather than on the next command.
            sensorlink_config::to_dashboard_config(&cfg)?;

            sensorlink_config::save_config_to(path, &cfg)?;
            if !ctx.quiet {
                eprintln!("Wrote {}", path.display());
                if cfg.identity.uid.is_some() && cfg.identity.token_env.is_none() {
                    eprintln!(
                        "Store the identity token in the system keyring or set token_env."
                    );
                }
            }
            Ok(())
        }
    }
}
