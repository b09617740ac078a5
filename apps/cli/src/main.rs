//! `logpipe`: generate synthetic log events onto a message bus, consume
//! them, administer topics and check bus health.

#![forbid(unsafe_code)]

mod commands;
mod config;
mod output;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use logpipe_log::{Format, LoggerBuilder};
use logpipe_telemetry::MetricsRegistry;

use crate::commands::Commands;
use crate::config::CliConfig;

#[derive(Debug, Parser)]
#[command(name = "logpipe", version, about = "Log event pipeline over a message bus")]
struct Cli {
    /// Log filter directive, e.g. `debug` or `info,rdkafka=warn`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format: pretty, compact or json
    #[arg(long, global = true)]
    log_format: Option<Format>,

    /// Configuration file (defaults to ./logpipe.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CliConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(1);
        }
    };

    let mut log = config.log.clone();
    if let Some(level) = cli.log_level {
        log = log.with_level(level);
    }
    if let Some(format) = cli.log_format {
        log = log.with_format(format);
    }
    let _guard = match LoggerBuilder::from_config(log).build() {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e}");
            None
        }
    };

    let registry = MetricsRegistry::shared();
    match commands::run(cli.command, &config, registry).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}
