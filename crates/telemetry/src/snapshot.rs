//! Immutable point-in-time view of the registry.

use serde::{Serialize, Serializer};

/// Counter values and derived rates captured by
/// [`MetricsRegistry::snapshot`](crate::MetricsRegistry::snapshot).
///
/// Serializes to the grouped JSON layout used by the `metrics` command:
///
/// ```json
/// {
///   "uptime_seconds": 12,
///   "throughput": { "messages_produced": 0, "messages_consumed": 0,
///                   "produced_per_second": 0.0, "consumed_per_second": 0.0 },
///   "latency": { "avg_ms": 0.0, "max_ms": 0 },
///   "reliability": { "error_count": 0, "retry_count": 0 }
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsSnapshot {
    produced_messages: u64,
    consumed_messages: u64,
    produced_per_second: f64,
    consumed_per_second: f64,
    error_count: u64,
    retry_count: u64,
    average_latency_ms: f64,
    max_latency_ms: u64,
    uptime_seconds: u64,
}

impl MetricsSnapshot {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        produced_messages: u64,
        consumed_messages: u64,
        produced_per_second: f64,
        consumed_per_second: f64,
        error_count: u64,
        retry_count: u64,
        average_latency_ms: f64,
        max_latency_ms: u64,
        uptime_seconds: u64,
    ) -> Self {
        Self {
            produced_messages,
            consumed_messages,
            produced_per_second,
            consumed_per_second,
            error_count,
            retry_count,
            average_latency_ms,
            max_latency_ms,
            uptime_seconds,
        }
    }

    /// Total messages produced.
    #[must_use]
    pub fn produced_messages(&self) -> u64 {
        self.produced_messages
    }

    /// Total messages consumed.
    #[must_use]
    pub fn consumed_messages(&self) -> u64 {
        self.consumed_messages
    }

    /// Produced messages divided by uptime in seconds.
    #[must_use]
    pub fn produced_per_second(&self) -> f64 {
        self.produced_per_second
    }

    /// Consumed messages divided by uptime in seconds.
    #[must_use]
    pub fn consumed_per_second(&self) -> f64 {
        self.consumed_per_second
    }

    /// Total errors recorded.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Total retries recorded.
    #[must_use]
    pub fn retry_count(&self) -> u64 {
        self.retry_count
    }

    /// Mean latency over all samples, `0.0` without samples.
    #[must_use]
    pub fn average_latency_ms(&self) -> f64 {
        self.average_latency_ms
    }

    /// Largest latency sample.
    #[must_use]
    pub fn max_latency_ms(&self) -> u64 {
        self.max_latency_ms
    }

    /// Whole seconds since the registry was created, at least 1.
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.uptime_seconds
    }

    /// Uptime rendered as `"{h}h {mm}m {ss}s"`.
    #[must_use]
    pub fn format_uptime(&self) -> String {
        let h = self.uptime_seconds / 3600;
        let m = (self.uptime_seconds % 3600) / 60;
        let s = self.uptime_seconds % 60;
        format!("{h}h {m:02}m {s:02}s")
    }
}

#[derive(Serialize)]
struct SnapshotDocument {
    uptime_seconds: u64,
    throughput: Throughput,
    latency: Latency,
    reliability: Reliability,
}

#[derive(Serialize)]
struct Throughput {
    messages_produced: u64,
    messages_consumed: u64,
    produced_per_second: f64,
    consumed_per_second: f64,
}

#[derive(Serialize)]
struct Latency {
    avg_ms: f64,
    max_ms: u64,
}

#[derive(Serialize)]
struct Reliability {
    error_count: u64,
    retry_count: u64,
}

impl Serialize for MetricsSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SnapshotDocument {
            uptime_seconds: self.uptime_seconds,
            throughput: Throughput {
                messages_produced: self.produced_messages,
                messages_consumed: self.consumed_messages,
                produced_per_second: self.produced_per_second,
                consumed_per_second: self.consumed_per_second,
            },
            latency: Latency {
                avg_ms: self.average_latency_ms,
                max_ms: self.max_latency_ms,
            },
            reliability: Reliability {
                error_count: self.error_count,
                retry_count: self.retry_count,
            },
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn sample() -> MetricsSnapshot {
        MetricsSnapshot::new(120, 80, 12.0, 8.0, 3, 1, 4.5, 19, 3_725)
    }

    #[test]
    fn serializes_grouped_layout() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(
            value,
            json!({
                "uptime_seconds": 3725,
                "throughput": {
                    "messages_produced": 120,
                    "messages_consumed": 80,
                    "produced_per_second": 12.0,
                    "consumed_per_second": 8.0
                },
                "latency": { "avg_ms": 4.5, "max_ms": 19 },
                "reliability": { "error_count": 3, "retry_count": 1 }
            })
        );
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(sample().format_uptime(), "1h 02m 05s");
        let short = MetricsSnapshot::new(0, 0, 0.0, 0.0, 0, 0, 0.0, 0, 9);
        assert_eq!(short.format_uptime(), "0h 00m 09s");
    }
}
