//! Subcommands. Each returns the process exit code on success.

mod consume;
mod generate;
mod health;
mod metrics;
mod topic;

use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;
use logpipe_bus::{BusSettings, MessageBus};
use logpipe_telemetry::MetricsRegistry;

use crate::config::CliConfig;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Publish synthetic log events
    Generate(generate::GenerateArgs),
    /// Print events from a topic until Ctrl-C
    Consume(consume::ConsumeArgs),
    /// Create, list, describe or delete topics
    Topic(topic::TopicArgs),
    /// Check bus, topics, producer and consumer
    Health(health::HealthArgs),
    /// Show pipeline metrics of this process
    Metrics(metrics::MetricsArgs),
}

pub async fn run(
    command: Commands,
    config: &CliConfig,
    registry: Arc<MetricsRegistry>,
) -> anyhow::Result<u8> {
    match command {
        Commands::Generate(args) => generate::run(args, config, registry).await,
        Commands::Consume(args) => consume::run(args, config, registry).await,
        Commands::Topic(args) => topic::run(args, config).await,
        Commands::Health(args) => health::run(args, config).await,
        Commands::Metrics(args) => metrics::run(args, &registry).await,
    }
}

fn connect(settings: &BusSettings) -> anyhow::Result<Arc<dyn MessageBus>> {
    logpipe_bus::connect(settings)
        .with_context(|| format!("cannot connect to {}", settings.bootstrap_servers))
}
