use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logpipe_bus::MessageBus;

use super::bounded;
use crate::aggregator::HealthProbe;
use crate::status::HealthCheckResult;

/// A subscriber in the given group sees partitions of the target topic.
pub struct ConsumerProbe {
    bus: Arc<dyn MessageBus>,
    group_id: String,
    topic: String,
    timeout: Duration,
}

impl ConsumerProbe {
    /// Probe checking `topic` as seen by `group_id`.
    pub fn new(
        bus: Arc<dyn MessageBus>,
        group_id: impl Into<String>,
        topic: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            bus,
            group_id: group_id.into(),
            topic: topic.into(),
            timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for ConsumerProbe {
    fn name(&self) -> &str {
        "Consumer Check"
    }

    async fn check(&self) -> HealthCheckResult {
        let partitions = match self.bus.subscriber(&self.group_id) {
            Ok(mut subscriber) => {
                let count = bounded(
                    "partition_count",
                    self.timeout,
                    subscriber.partition_count(&self.topic, self.timeout),
                )
                .await;
                if let Err(error) = subscriber.close().await {
                    tracing::debug!(%error, "closing probe subscriber failed");
                }
                count
            }
            Err(error) => Err(error),
        };

        match partitions {
            Ok(0) => HealthCheckResult::degraded(
                self.name(),
                format!("Consumer initialized, topic {} has no partitions", self.topic),
            )
            .with_detail(format!("Group: {}", self.group_id)),
            Ok(n) => HealthCheckResult::healthy(
                self.name(),
                format!(
                    "Connected, group: {}, topic: '{}', partitions visible: {n}",
                    self.group_id, self.topic
                ),
            ),
            Err(error) => HealthCheckResult::unhealthy(
                self.name(),
                format!("Consumer could not connect (group: {})", self.group_id),
            )
            .with_detail(error.to_string()),
        }
    }
}
