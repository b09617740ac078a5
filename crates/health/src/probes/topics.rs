use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use logpipe_bus::MessageBus;

use super::bounded;
use crate::aggregator::HealthProbe;
use crate::status::HealthCheckResult;

/// Every required topic exists.
///
/// Missing topics degrade the result; failing to list or describe them makes
/// it unhealthy.
pub struct TopicAvailabilityProbe {
    bus: Arc<dyn MessageBus>,
    required: Vec<String>,
    timeout: Duration,
}

impl TopicAvailabilityProbe {
    /// Probe requiring every topic in `required`.
    pub fn new(bus: Arc<dyn MessageBus>, required: Vec<String>, timeout: Duration) -> Self {
        Self {
            bus,
            required,
            timeout,
        }
    }

    fn failed(&self, error: impl ToString) -> HealthCheckResult {
        HealthCheckResult::unhealthy(self.name(), "Failed to verify topic availability")
            .with_detail(error.to_string())
    }
}

#[async_trait]
impl HealthProbe for TopicAvailabilityProbe {
    fn name(&self) -> &str {
        "Topic Availability"
    }

    async fn check(&self) -> HealthCheckResult {
        let existing = match bounded("list_topics", self.timeout, self.bus.list_topics(self.timeout)).await {
            Ok(topics) => topics,
            Err(error) => return self.failed(error),
        };

        let missing: Vec<&String> = self
            .required
            .iter()
            .filter(|t| !existing.contains(*t))
            .collect();
        if !missing.is_empty() {
            return HealthCheckResult::degraded(self.name(), format!("Missing topics: {missing:?}"))
                .with_detail(format!(
                    "Required: {:?} | Found: {existing:?}",
                    self.required
                ));
        }

        let mut layouts = Vec::with_capacity(self.required.len());
        for topic in &self.required {
            let description = match bounded(
                "describe_topic",
                self.timeout,
                self.bus.describe_topic(topic, self.timeout),
            )
            .await
            {
                Ok(description) => description,
                Err(error) => return self.failed(error),
            };
            layouts.push(format!(
                "{topic}: partitions {}, min-replicas {}",
                description.partitions.len(),
                description.min_replicas()
            ));
        }

        let result = HealthCheckResult::healthy(self.name(), "All required topics exist");
        if layouts.is_empty() {
            result
        } else {
            result.with_detail(layouts.join("; "))
        }
    }
}
