//! Table rendering for command output, using comfy-table

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use logpipe_bus::TopicDescription;
use logpipe_health::{HealthReport, HealthStatus};
use logpipe_pipeline::ProducerStats;
use logpipe_telemetry::MetricsSnapshot;

fn create_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(headers);
    table
}

/// Fixed-width status marker used in the health table.
pub fn health_icon(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "✓ OK  ",
        HealthStatus::Degraded => "⚠ WARN",
        HealthStatus::Unhealthy => "✗ FAIL",
    }
}

// ============================================================================
// Health
// ============================================================================

/// One row per check, detail lines prefixed with `↳`, then the overall status.
pub fn render_health(report: &HealthReport) -> String {
    let mut table = create_table(&["STATUS", "CHECK", "MESSAGE"]);
    for result in &report.results {
        let message = match &result.detail {
            Some(detail) => format!("{}\n↳ {detail}", result.message),
            None => result.message.clone(),
        };
        table.add_row(vec![
            health_icon(result.status).to_string(),
            result.name.clone(),
            message,
        ]);
    }

    format!(
        "MESSAGE BUS HEALTH CHECK\n{table}\nOverall: {} {}",
        health_icon(report.status).trim_end(),
        report.status
    )
}

// ============================================================================
// Metrics
// ============================================================================

pub fn render_metrics(snapshot: &MetricsSnapshot) -> String {
    let mut table = create_table(&["METRIC", "VALUE"]);
    let rows = [
        ("Uptime", snapshot.format_uptime()),
        ("Messages produced", snapshot.produced_messages().to_string()),
        ("Messages consumed", snapshot.consumed_messages().to_string()),
        ("Produced/sec", format!("{:.2}", snapshot.produced_per_second())),
        ("Consumed/sec", format!("{:.2}", snapshot.consumed_per_second())),
        ("Avg latency (ms)", format!("{:.2}", snapshot.average_latency_ms())),
        ("Max latency (ms)", snapshot.max_latency_ms().to_string()),
        ("Errors", snapshot.error_count().to_string()),
        ("Retries", snapshot.retry_count().to_string()),
    ];
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value]);
    }
    table.to_string()
}

pub fn render_producer_stats(stats: &ProducerStats) -> String {
    let mut table = create_table(&["SENT", "FAILED", "SUCCESS RATE"]);
    let rate = stats
        .success_rate()
        .map_or_else(|| "no data".to_string(), |rate| format!("{rate:.2}%"));
    table.add_row(vec![stats.sent.to_string(), stats.failed.to_string(), rate]);
    table.to_string()
}

// ============================================================================
// Topics
// ============================================================================

pub fn render_topic_list(topics: &[String]) -> String {
    if topics.is_empty() {
        return "No topics found".to_string();
    }
    let mut table = create_table(&["TOPIC"]);
    for topic in topics {
        table.add_row(vec![topic.as_str()]);
    }
    format!("{table}\nTotal: {}", topics.len())
}

pub fn render_topic(description: &TopicDescription) -> String {
    let mut table = create_table(&["PARTITION", "LEADER", "REPLICAS"]);
    for partition in &description.partitions {
        let replicas = partition
            .replicas
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        table.add_row(vec![
            partition.id.to_string(),
            partition.leader.to_string(),
            replicas,
        ]);
    }
    format!(
        "Topic: {}\nPartitions: {}\n{table}",
        description.name,
        description.partitions.len()
    )
}

#[cfg(test)]
mod tests {
    use logpipe_bus::PartitionInfo;
    use logpipe_health::HealthCheckResult;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn icons_have_equal_width() {
        let widths: Vec<usize> = [
            HealthStatus::Healthy,
            HealthStatus::Degraded,
            HealthStatus::Unhealthy,
        ]
        .into_iter()
        .map(|s| health_icon(s).chars().count())
        .collect();
        assert_eq!(widths, [6, 6, 6]);
    }

    #[test]
    fn health_table_lists_checks_and_overall() {
        let report = HealthReport::from_results(vec![
            HealthCheckResult::healthy("Bus Connection", "Connected"),
            HealthCheckResult::degraded("Topic Availability", "Missing topics: [\"x\"]")
                .with_detail("Required: [\"x\"] | Found: []"),
        ]);
        let out = render_health(&report);
        assert!(out.starts_with("MESSAGE BUS HEALTH CHECK"));
        assert!(out.contains("Bus Connection"));
        assert!(out.contains("↳ Required"));
        assert!(out.ends_with("Overall: ⚠ WARN DEGRADED"));
    }

    #[test]
    fn empty_topic_list() {
        assert_eq!(render_topic_list(&[]), "No topics found");
        assert!(render_topic_list(&["a".into(), "b".into()]).ends_with("Total: 2"));
    }

    #[test]
    fn topic_description_shows_partitions() {
        let description = TopicDescription {
            name: "logs".into(),
            partitions: vec![PartitionInfo {
                id: 0,
                leader: 1,
                replicas: vec![1, 2],
            }],
        };
        let out = render_topic(&description);
        assert!(out.starts_with("Topic: logs\nPartitions: 1"));
        assert!(out.contains("1,2"));
    }

    #[test]
    fn producer_stats_without_data() {
        let out = render_producer_stats(&ProducerStats::default());
        assert!(out.contains("no data"));
    }
}
