use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logpipe_bus::MessageBus;

use super::bounded;
use crate::aggregator::HealthProbe;
use crate::status::HealthCheckResult;

/// A publisher can be created and sees partitions of the target topic.
pub struct ProducerProbe {
    bus: Arc<dyn MessageBus>,
    topic: String,
    timeout: Duration,
}

impl ProducerProbe {
    /// Probe checking `topic` as seen by a publisher.
    pub fn new(bus: Arc<dyn MessageBus>, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bus,
            topic: topic.into(),
            timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for ProducerProbe {
    fn name(&self) -> &str {
        "Producer Check"
    }

    async fn check(&self) -> HealthCheckResult {
        let partitions = match self.bus.publisher() {
            Ok(publisher) => {
                bounded(
                    "partition_count",
                    self.timeout,
                    publisher.partition_count(&self.topic, self.timeout),
                )
                .await
            }
            Err(error) => Err(error),
        };

        match partitions {
            Ok(0) => HealthCheckResult::degraded(
                self.name(),
                format!("Producer initialized but topic has no partitions: {}", self.topic),
            ),
            Ok(n) => HealthCheckResult::healthy(
                self.name(),
                format!("Producer connected, topic '{}' has {n} partition(s)", self.topic),
            ),
            Err(error) => HealthCheckResult::unhealthy(
                self.name(),
                format!("Producer failed to connect to {}", self.bus.endpoint()),
            )
            .with_detail(error.to_string()),
        }
    }
}
