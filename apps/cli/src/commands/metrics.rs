use std::time::Duration;

use clap::Args;
use logpipe_telemetry::MetricsRegistry;
use tokio_util::sync::CancellationToken;

use crate::{output, shutdown};

#[derive(Debug, Args)]
pub struct MetricsArgs {
    /// Print the snapshot as JSON
    #[arg(long)]
    json: bool,

    /// Repeat every N seconds until Ctrl-C
    #[arg(short, long, value_name = "SECONDS")]
    watch: Option<u64>,
}

pub async fn run(args: MetricsArgs, registry: &MetricsRegistry) -> anyhow::Result<u8> {
    print_snapshot(registry, args.json)?;

    let Some(period) = args.watch.filter(|s| *s > 0).map(Duration::from_secs) else {
        return Ok(0);
    };

    let token = CancellationToken::new();
    shutdown::cancel_on_ctrl_c(token.clone());
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            () = tokio::time::sleep(period) => print_snapshot(registry, args.json)?,
        }
    }
    Ok(0)
}

fn print_snapshot(registry: &MetricsRegistry, json: bool) -> anyhow::Result<()> {
    let snapshot = registry.snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", output::render_metrics(&snapshot));
    }
    Ok(())
}
