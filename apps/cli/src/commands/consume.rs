use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use logpipe_pipeline::{ConsoleSink, ConsumerError, ConsumerOptions, MessageConsumer};
use logpipe_telemetry::MetricsRegistry;
use tokio_util::sync::CancellationToken;

use crate::config::CliConfig;
use crate::{output, shutdown};

#[derive(Debug, Args)]
pub struct ConsumeArgs {
    /// Bus address, or memory://<name> for the in-process bus
    #[arg(short, long)]
    bootstrap_servers: Option<String>,

    #[arg(short, long, default_value = "my-logs")]
    topic: String,

    #[arg(short, long, default_value = "we-consumers")]
    group_id: String,

    /// Rewind every assigned partition before reading
    #[arg(long)]
    from_beginning: bool,
}

pub async fn run(
    args: ConsumeArgs,
    config: &CliConfig,
    registry: Arc<MetricsRegistry>,
) -> anyhow::Result<u8> {
    let settings = config.bus_for(args.bootstrap_servers.as_deref());
    let bus = super::connect(&settings)?;

    let token = CancellationToken::new();
    shutdown::cancel_on_ctrl_c(token.clone());

    let options = ConsumerOptions {
        from_beginning: args.from_beginning,
        ..ConsumerOptions::default()
    };
    let mut consumer = MessageConsumer::new(
        bus,
        &args.topic,
        &args.group_id,
        options,
        token,
        Arc::new(ConsoleSink),
        Arc::clone(&registry),
    );

    println!(
        "Consuming '{}' as group '{}' from {} (Ctrl-C to stop)",
        args.topic, args.group_id, settings.bootstrap_servers
    );
    match consumer.consume().await {
        Ok(()) | Err(ConsumerError::Interrupted) => {}
        Err(e) => return Err(e).context("consumer failed"),
    }

    println!(
        "Consumed {} events, {} failed",
        consumer.consumed(),
        consumer.failed()
    );
    println!("{}", output::render_metrics(&registry.snapshot()));
    Ok(0)
}
