use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logpipe_bus::MessageBus;

use super::bounded;
use crate::aggregator::HealthProbe;
use crate::status::HealthCheckResult;

/// Cluster metadata can be fetched and lists at least one broker.
pub struct BusReachableProbe {
    bus: Arc<dyn MessageBus>,
    timeout: Duration,
}

impl BusReachableProbe {
    /// Probe bounded by `timeout`.
    pub fn new(bus: Arc<dyn MessageBus>, timeout: Duration) -> Self {
        Self { bus, timeout }
    }
}

#[async_trait]
impl HealthProbe for BusReachableProbe {
    fn name(&self) -> &str {
        "Bus Connection"
    }

    async fn check(&self) -> HealthCheckResult {
        let info = match bounded("cluster_info", self.timeout, self.bus.cluster_info(self.timeout)).await {
            Ok(info) => info,
            Err(error) => {
                return HealthCheckResult::unhealthy(
                    self.name(),
                    format!("Cannot reach message bus at {}", self.bus.endpoint()),
                )
                .with_detail(error.to_string());
            }
        };

        let cluster_id = info.cluster_id.as_deref().unwrap_or("unknown");
        if info.brokers.is_empty() {
            return HealthCheckResult::unhealthy(self.name(), "No brokers available")
                .with_detail(format!("Cluster ID: {cluster_id} | broker list is empty"));
        }
        HealthCheckResult::healthy(
            self.name(),
            format!(
                "Connected, cluster ID: {cluster_id}, brokers: {}",
                info.brokers.len()
            ),
        )
    }
}
