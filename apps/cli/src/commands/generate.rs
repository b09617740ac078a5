use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use logpipe_pipeline::{EventGenerator, GeneratePlan, MessageProducer, run_generation};
use logpipe_telemetry::MetricsRegistry;
use tokio_util::sync::CancellationToken;

use crate::config::CliConfig;
use crate::{output, shutdown};

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Bus address, or memory://<name> for the in-process bus
    #[arg(short, long)]
    bootstrap_servers: Option<String>,

    #[arg(short, long, default_value = "my-logs")]
    topic: String,

    /// Pause between events in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    interval: u64,

    /// Events to publish, 0 runs until Ctrl-C
    #[arg(short, long, default_value_t = 0)]
    count: u64,

    /// Events per second, overrides --interval
    #[arg(short, long)]
    rate: Option<u32>,

    /// Wait for each acknowledgment
    #[arg(short, long)]
    sync: bool,
}

pub async fn run(
    args: GenerateArgs,
    config: &CliConfig,
    registry: Arc<MetricsRegistry>,
) -> anyhow::Result<u8> {
    let settings = config.bus_for(args.bootstrap_servers.as_deref());
    let bus = super::connect(&settings)?;
    let plan = GeneratePlan::new(args.interval, args.count, args.rate, args.sync);

    println!("Bus:      {}", settings.bootstrap_servers);
    println!("Topic:    {}", args.topic);
    println!("Interval: {}ms", plan.interval.as_millis());
    if plan.count == 0 {
        println!("Count:    unlimited (Ctrl-C to stop)");
    } else {
        println!("Count:    {}", plan.count);
    }
    println!("Mode:     {}", if plan.sync { "sync" } else { "async" });

    let token = CancellationToken::new();
    shutdown::cancel_on_ctrl_c(token.clone());

    let mut producer =
        MessageProducer::new(bus.as_ref(), &args.topic, &settings, Arc::clone(&registry))
            .context("cannot create producer")?
            .with_shutdown(token.clone());
    let mut generator = EventGenerator::new();

    let summary = run_generation(&producer, &mut generator, &plan, &token).await;
    let stats = producer.close().await;
    token.cancel();

    println!(
        "Generated {} events, {} rejected{}",
        summary.generated,
        summary.rejected,
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    println!("{}", output::render_producer_stats(&stats));
    println!("{}", output::render_metrics(&registry.snapshot()));
    Ok(0)
}
