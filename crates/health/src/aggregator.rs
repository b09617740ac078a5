//! The probe capability and the aggregator running a set of probes.

use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;

use crate::status::{HealthCheckResult, HealthStatus};

/// One independent health check.
///
/// Probes never fail: a check that cannot be carried out reports
/// [`HealthStatus::Unhealthy`] with the cause as detail.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Display name, also used as the result name.
    fn name(&self) -> &str;

    /// Run the check.
    async fn check(&self) -> HealthCheckResult;
}

/// Merged outcome of every registered probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Worst status among the results, `Healthy` when there are none
    pub status: HealthStatus,
    /// Results in registration order
    #[serde(rename = "checks")]
    pub results: Vec<HealthCheckResult>,
}

impl HealthReport {
    /// Merge results: any unhealthy wins, then any degraded, else healthy.
    pub fn from_results(results: Vec<HealthCheckResult>) -> Self {
        let status = results
            .iter()
            .map(|r| r.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        Self { status, results }
    }

    /// Whether every check passed.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    /// Process exit code for the overall status.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

/// Runs registered probes one after another.
#[derive(Default)]
pub struct HealthCheckAggregator {
    probes: Vec<Box<dyn HealthProbe>>,
}

impl HealthCheckAggregator {
    /// An aggregator without probes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a probe.
    #[must_use]
    pub fn register(mut self, probe: impl HealthProbe + 'static) -> Self {
        self.probes.push(Box::new(probe));
        self
    }

    /// Append an already boxed probe.
    #[must_use]
    pub fn register_boxed(mut self, probe: Box<dyn HealthProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Number of registered probes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    /// Whether no probe is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Run every probe in registration order and merge the results.
    pub async fn run(&self) -> HealthReport {
        let mut results = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            let started = Instant::now();
            let result = probe.check().await;
            tracing::debug!(
                probe = probe.name(),
                status = %result.status,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "health probe finished"
            );
            results.push(result);
        }

        let report = HealthReport::from_results(results);
        tracing::info!(status = %report.status, checks = report.results.len(), "health check complete");
        report
    }
}

impl fmt::Debug for HealthCheckAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthCheckAggregator")
            .field(
                "probes",
                &self.probes.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_report_is_healthy() {
        let report = HealthReport::from_results(Vec::new());
        assert!(report.is_healthy());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn report_serializes_checks() {
        let report = HealthReport::from_results(vec![
            HealthCheckResult::healthy("A", "ok"),
            HealthCheckResult::unhealthy("B", "down").with_detail("refused"),
        ]);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "status": "UNHEALTHY",
                "checks": [
                    {"name": "A", "status": "HEALTHY", "message": "ok"},
                    {"name": "B", "status": "UNHEALTHY", "message": "down", "detail": "refused"}
                ]
            })
        );
    }
}
