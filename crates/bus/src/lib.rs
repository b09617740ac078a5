//! # logpipe-bus
//!
//! The message bus as seen by logpipe: a [`MessageBus`] capability handing
//! out [`Publisher`] and [`Subscriber`] handles plus topic administration.
//!
//! Two implementations exist:
//!
//! - [`MemoryBus`], an in-process partitioned log used by tests and by the
//!   CLI for `memory://` addresses;
//! - `KafkaBus` (feature `kafka`), a librdkafka client.
//!
//! [`connect`] picks one from [`BusSettings::bootstrap_servers`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
#[cfg(feature = "kafka")]
mod kafka;
mod memory;
mod settings;
mod traits;
mod types;

use std::sync::Arc;

pub use error::{BusError, BusResult};
#[cfg(feature = "kafka")]
pub use kafka::KafkaBus;
pub use memory::MemoryBus;
pub use settings::{AckPolicy, BusSettings, CompressionType, MEMORY_SCHEME, OffsetReset};
pub use traits::{MessageBus, Publisher, Subscriber};
pub use types::{
    BrokerInfo, BusRecord, ClusterInfo, Delivery, PartitionInfo, TopicDescription, TopicSpec,
};

/// Build the bus selected by `settings.bootstrap_servers`.
///
/// `memory://...` yields a fresh [`MemoryBus`]. Anything else needs the
/// `kafka` feature and fails with [`BusError::Unsupported`] without it.
pub fn connect(settings: &BusSettings) -> BusResult<Arc<dyn MessageBus>> {
    if settings.is_memory() {
        tracing::debug!(endpoint = %settings.bootstrap_servers, "using in-memory bus");
        return Ok(Arc::new(MemoryBus::from_settings(settings)));
    }
    connect_remote(settings)
}

#[cfg(feature = "kafka")]
fn connect_remote(settings: &BusSettings) -> BusResult<Arc<dyn MessageBus>> {
    tracing::debug!(endpoint = %settings.bootstrap_servers, "using kafka bus");
    Ok(Arc::new(KafkaBus::new(settings.clone())?))
}

#[cfg(not(feature = "kafka"))]
fn connect_remote(settings: &BusSettings) -> BusResult<Arc<dyn MessageBus>> {
    Err(BusError::Unsupported(format!(
        "'{}' needs the kafka feature; use {MEMORY_SCHEME}<name> for the in-process bus",
        settings.bootstrap_servers
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_address_selects_memory_bus() {
        let bus = connect(&BusSettings::new("memory://test")).unwrap();
        assert_eq!(bus.kind(), "memory");
        assert_eq!(bus.endpoint(), "memory://test");
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn remote_address_without_kafka_is_unsupported() {
        let err = connect(&BusSettings::default()).err().unwrap();
        assert!(matches!(err, BusError::Unsupported(_)));
    }
}
