use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use logpipe_bus::TopicSpec;

use crate::config::CliConfig;
use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TopicAction {
    Create,
    List,
    Describe,
    Delete,
}

#[derive(Debug, Args)]
pub struct TopicArgs {
    #[arg(value_enum)]
    action: TopicAction,

    /// Bus address, or memory://<name> for the in-process bus
    #[arg(short, long)]
    bootstrap_servers: Option<String>,

    #[arg(short, long, default_value = "my-topic")]
    name: String,

    #[arg(short, long, default_value_t = 1)]
    partitions: u32,

    /// Replication factor
    #[arg(short, long, default_value_t = 1)]
    replications: u16,

    /// Seconds to wait for the bus
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

pub async fn run(args: TopicArgs, config: &CliConfig) -> anyhow::Result<u8> {
    let settings = config.bus_for(args.bootstrap_servers.as_deref());
    let bus = super::connect(&settings)?;
    let timeout = Duration::from_secs(args.timeout);

    match args.action {
        TopicAction::Create => {
            let spec = TopicSpec::new(&args.name, args.partitions, args.replications);
            bus.create_topic(&spec, timeout)
                .await
                .with_context(|| format!("cannot create topic '{}'", args.name))?;
            println!(
                "Topic '{}' created: {} partition(s), replication factor {}",
                spec.name, spec.partitions, spec.replication
            );
        }
        TopicAction::List => {
            let mut topics = bus.list_topics(timeout).await.context("cannot list topics")?;
            topics.sort();
            println!("{}", output::render_topic_list(&topics));
        }
        TopicAction::Describe => {
            let description = bus
                .describe_topic(&args.name, timeout)
                .await
                .with_context(|| format!("cannot describe topic '{}'", args.name))?;
            println!("{}", output::render_topic(&description));
        }
        TopicAction::Delete => {
            bus.delete_topic(&args.name, timeout)
                .await
                .with_context(|| format!("cannot delete topic '{}'", args.name))?;
            println!("Topic '{}' deleted", args.name);
        }
    }
    Ok(0)
}
