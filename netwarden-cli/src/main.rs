//! netwarden -- network intrusion detection CLI
//!
//! # Exit codes
//!
//! | Code | Meaning                         |
//! |------|---------------------------------|
//! | 0    | Success or graceful stop        |
//! | 1    | Any other failure               |
//! | 2    | Configuration invalid           |
//! | 3    | Event source unavailable        |
//! | 4    | Detection or alert sink failure |

mod cli;
mod commands;
mod error;
mod logging;
mod metrics_server;
mod output;

use clap::Parser;
use colored::Colorize;

use netwarden_core::config::{GeneralConfig, NetwardenConfig};
use netwarden_core::error::NetwardenError;

use crate::cli::{Cli, Commands, SiemAction};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, exit_code = err.exit_code(), "command failed");
            eprintln!("{} {}", "error:".red().bold(), err);
            err.exit_code()
        }
    };
    // a pending stdin read on the blocking pool would hold up runtime shutdown
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let (config_path, explicit) = cli.config_path();
    let config_path = config_path.to_path_buf();

    let config = commands::config::load_effective(&config_path, explicit)
        .await
        .and_then(|mut config| {
            if let Some(level) = &cli.log_level {
                config.general.log_level = level.clone();
                config.validate()?;
            }
            Ok(config)
        });

    // `config validate` still needs logging when the file is broken
    let mut general = match &config {
        Ok(config) => config.general.clone(),
        Err(_) => GeneralConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    logging::init_tracing(&general)?;

    match cli.command {
        Commands::Config(args) => {
            commands::config::execute(args, &config_path, explicit, &writer).await
        }
        Commands::Capture(args) => {
            let config = ready(config, true)?;
            commands::capture::execute(args, &config, &writer).await
        }
        Commands::Live(args) => {
            let config = ready(config, true)?;
            commands::live::execute(args, &config, &writer).await
        }
        Commands::Siem(args) => {
            let correlating = matches!(args.action, SiemAction::Correlate { .. });
            let config = ready(config, correlating)?;
            commands::siem::execute(args, &config, &writer).await
        }
    }
}

/// Require a valid configuration and start the Prometheus exporter when
/// `with_metrics` is set and `[metrics] enabled = true`.
fn ready(
    config: Result<NetwardenConfig, NetwardenError>,
    with_metrics: bool,
) -> Result<NetwardenConfig, CliError> {
    let config = config?;
    if with_metrics && config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }
    Ok(config)
}
