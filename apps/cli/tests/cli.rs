//! End-to-end runs of the `logpipe` binary against the in-process bus.

use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;

fn logpipe() -> Command {
    let mut cmd = Command::cargo_bin("logpipe").unwrap();
    // no logpipe.toml in the working directory
    cmd.current_dir(std::env::temp_dir());
    cmd.env_remove("LOGPIPE_LOG").env("RUST_LOG", "warn");
    cmd
}

fn json_stdout(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

// ============================================================================
// health
// ============================================================================

#[test]
fn health_on_empty_bus_is_degraded() {
    let output = logpipe()
        .args(["health", "-b", "memory://health", "--json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let report = json_stdout(&output);
    assert_eq!(report["status"], "DEGRADED");
    let names: Vec<&str> = report["checks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        [
            "Bus Connection",
            "Topic Availability",
            "Producer Check",
            "Consumer Check"
        ]
    );
    assert_eq!(report["checks"][0]["status"], "HEALTHY");
    assert!(report["checks"][0].get("detail").is_none());
}

#[test]
fn health_table_output() {
    logpipe()
        .args(["health", "-b", "memory://health", "-t", "logs,audit"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("HEALTH CHECK"))
        .stdout(predicate::str::contains("Missing topics"))
        .stdout(predicate::str::contains("Overall: ⚠ WARN DEGRADED"));
}

#[cfg(not(feature = "kafka"))]
#[test]
fn health_without_bus_client_is_indeterminate() {
    logpipe()
        .args(["health", "-b", "broker.invalid:9092", "--json"])
        .assert()
        .code(3)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("kafka feature"));
}

// ============================================================================
// metrics
// ============================================================================

#[test]
fn metrics_json_layout() {
    let output = logpipe().args(["metrics", "--json"]).output().unwrap();
    assert!(output.status.success());

    let snapshot = json_stdout(&output);
    assert!(snapshot["uptime_seconds"].is_u64());
    assert_eq!(snapshot["throughput"]["messages_produced"], 0);
    assert_eq!(snapshot["throughput"]["messages_consumed"], 0);
    assert_eq!(snapshot["latency"]["avg_ms"], 0.0);
    assert_eq!(snapshot["reliability"]["error_count"], 0);
}

#[test]
fn metrics_table() {
    logpipe()
        .arg("metrics")
        .assert()
        .success()
        .stdout(predicate::str::contains("Messages produced"));
}

// ============================================================================
// generate / topic
// ============================================================================

#[test]
fn generate_bounded_count() {
    logpipe()
        .args(["generate", "-b", "memory://gen", "-c", "3", "-i", "0", "--sync"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated 3 events, 0 rejected"))
        .stdout(predicate::str::contains("100.00%"));
}

#[test]
fn generate_rate_overrides_interval() {
    logpipe()
        .args(["generate", "-b", "memory://gen", "-c", "2", "-i", "5000", "-r", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Interval: 10ms"));
}

#[cfg(not(feature = "kafka"))]
#[test]
fn generate_without_bus_client_fails() {
    logpipe()
        .args(["generate", "-b", "broker.invalid:9092", "-c", "1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error: cannot connect to broker.invalid:9092"));
}

#[test]
fn topic_create_and_list_in_memory() {
    logpipe()
        .args(["topic", "create", "-b", "memory://t", "-n", "orders", "-p", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Topic 'orders' created: 3 partition(s)"));

    logpipe()
        .args(["topic", "list", "-b", "memory://t"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No topics found"));
}

#[test]
fn topic_describe_unknown_fails() {
    logpipe()
        .args(["topic", "describe", "-b", "memory://t", "-n", "nope"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot describe topic 'nope'"));
}

#[test]
fn config_file_supplies_bus_address() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[bus]\nbootstrap_servers = \"memory://from-config\"\n").unwrap();

    logpipe()
        .args(["--config", path.to_str().unwrap(), "generate", "-c", "1", "-i", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bus:      memory://from-config"));
}

#[test]
fn missing_config_file_is_an_error() {
    logpipe()
        .args(["--config", "/nonexistent/logpipe.toml", "metrics"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}
