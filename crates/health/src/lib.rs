//! # logpipe-health
//!
//! Independent health probes merged into one severity.
//!
//! A [`HealthCheckAggregator`] runs its registered [`HealthProbe`]s one after
//! another, in registration order, and folds their results into a
//! [`HealthReport`]: any unhealthy result makes the report unhealthy, else any
//! degraded result makes it degraded, else it is healthy.
//!
//! ```
//! use async_trait::async_trait;
//! use logpipe_health::{HealthCheckAggregator, HealthCheckResult, HealthProbe, HealthStatus};
//!
//! struct Disk;
//!
//! #[async_trait]
//! impl HealthProbe for Disk {
//!     fn name(&self) -> &str {
//!         "Disk"
//!     }
//!
//!     async fn check(&self) -> HealthCheckResult {
//!         HealthCheckResult::degraded(self.name(), "92% used")
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let report = HealthCheckAggregator::new().register(Disk).run().await;
//! assert_eq!(report.status, HealthStatus::Degraded);
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod aggregator;
/// The four standard probes.
pub mod probes;
mod status;

pub use aggregator::{HealthCheckAggregator, HealthProbe, HealthReport};
pub use probes::{
    BusReachableProbe, ConsumerProbe, ProducerProbe, TopicAvailabilityProbe, standard_aggregator,
};
pub use status::{HealthCheckResult, HealthStatus};
