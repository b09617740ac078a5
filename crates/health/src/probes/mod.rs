//! Probes against a [`MessageBus`].
//!
//! Each probe bounds every bus call with its own timeout and maps failures
//! to an unhealthy result instead of an error.

mod bus;
mod consumer;
mod producer;
mod topics;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use logpipe_bus::{BusError, BusResult, MessageBus};

pub use bus::BusReachableProbe;
pub use consumer::ConsumerProbe;
pub use producer::ProducerProbe;
pub use topics::TopicAvailabilityProbe;

use crate::aggregator::HealthCheckAggregator;

/// The four standard probes: bus reachable, every topic in `topics` present,
/// and publisher and `group` subscriber able to see the first topic.
pub fn standard_aggregator(
    bus: &Arc<dyn MessageBus>,
    topics: &[String],
    group_id: &str,
    timeout: Duration,
) -> HealthCheckAggregator {
    let mut aggregator = HealthCheckAggregator::new()
        .register(BusReachableProbe::new(Arc::clone(bus), timeout))
        .register(TopicAvailabilityProbe::new(
            Arc::clone(bus),
            topics.to_vec(),
            timeout,
        ));
    if let Some(target) = topics.first() {
        aggregator = aggregator
            .register(ProducerProbe::new(Arc::clone(bus), target.clone(), timeout))
            .register(ConsumerProbe::new(
                Arc::clone(bus),
                group_id,
                target.clone(),
                timeout,
            ));
    }
    aggregator
}

async fn bounded<T>(
    operation: &str,
    timeout: Duration,
    call: impl Future<Output = BusResult<T>>,
) -> BusResult<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| BusError::timeout(operation, timeout))?
}
