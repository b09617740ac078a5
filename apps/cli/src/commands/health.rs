use std::time::Duration;

use clap::Args;
use logpipe_health::standard_aggregator;

use crate::config::CliConfig;
use crate::output;

/// Exit code when no verdict could be reached.
const INDETERMINATE: u8 = 3;

#[derive(Debug, Args)]
pub struct HealthArgs {
    /// Bus address, or memory://<name> for the in-process bus
    #[arg(short, long)]
    bootstrap_servers: Option<String>,

    /// Required topics, comma-separated
    #[arg(short, long, value_delimiter = ',', default_value = "logs")]
    topics: Vec<String>,

    /// Consumer group used by the consumer check
    #[arg(short, long, default_value = "loggers")]
    group: String,

    /// Per-check timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: HealthArgs, config: &CliConfig) -> anyhow::Result<u8> {
    let settings = config.bus_for(args.bootstrap_servers.as_deref());
    let bus = match super::connect(&settings) {
        Ok(bus) => bus,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return Ok(INDETERMINATE);
        }
    };

    let report = standard_aggregator(
        &bus,
        &args.topics,
        &args.group,
        Duration::from_secs(args.timeout),
    )
    .run()
    .await;

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: cannot encode health report: {e}");
                return Ok(INDETERMINATE);
            }
        }
    } else {
        println!("{}", output::render_health(&report));
    }

    Ok(u8::try_from(report.exit_code()).unwrap_or(INDETERMINATE))
}
