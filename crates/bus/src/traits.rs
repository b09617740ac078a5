//! The bus capability as seen by producers, consumers and probes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BusResult;
use crate::types::{BusRecord, ClusterInfo, Delivery, TopicDescription, TopicSpec};

/// Client-side view of a partitioned, offset-addressed message bus.
///
/// Implementations hand out exclusive [`Publisher`] and [`Subscriber`]
/// handles and answer administrative queries. Every administrative call is
/// bounded by the timeout it is given.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Short label for logs ("memory", "kafka").
    fn kind(&self) -> &'static str;

    /// Bootstrap address this bus was built from.
    fn endpoint(&self) -> &str;

    /// Create a publishing handle.
    fn publisher(&self) -> BusResult<Arc<dyn Publisher>>;

    /// Create a subscribing handle for a consumer group.
    fn subscriber(&self, group_id: &str) -> BusResult<Box<dyn Subscriber>>;

    /// Cluster identity and brokers.
    async fn cluster_info(&self, timeout: Duration) -> BusResult<ClusterInfo>;

    /// Names of all topics.
    async fn list_topics(&self, timeout: Duration) -> BusResult<Vec<String>>;

    /// Partition layout of one topic.
    async fn describe_topic(&self, name: &str, timeout: Duration) -> BusResult<TopicDescription>;

    /// Create a topic.
    async fn create_topic(&self, spec: &TopicSpec, timeout: Duration) -> BusResult<()>;

    /// Delete a topic.
    async fn delete_topic(&self, name: &str, timeout: Duration) -> BusResult<()>;

    /// Whether a topic exists.
    async fn topic_exists(&self, name: &str, timeout: Duration) -> BusResult<bool> {
        let topics = self.list_topics(timeout).await?;
        Ok(topics.iter().any(|t| t == name))
    }
}

/// Publishing handle.
///
/// Shared as `Arc` so in-flight asynchronous publishes can hold it while the
/// owner keeps submitting.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one record and wait for the bus acknowledgment.
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>)
    -> BusResult<Delivery>;

    /// Drain client-side buffers.
    async fn flush(&self, timeout: Duration) -> BusResult<()>;

    /// Partitions of `topic` visible to this publisher, 0 for an unknown topic.
    async fn partition_count(&self, topic: &str, timeout: Duration) -> BusResult<usize>;
}

/// Subscribing handle bound to one consumer group.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Subscribe to a topic. Partitions are assigned on a later poll.
    fn subscribe(&mut self, topic: &str) -> BusResult<()>;

    /// Fetch available records, waiting at most `timeout` when there are none.
    async fn poll(&mut self, timeout: Duration) -> BusResult<Vec<BusRecord>>;

    /// Partitions currently assigned to this handle.
    fn assignment(&self) -> BusResult<Vec<i32>>;

    /// Move the read position of assigned partitions to their earliest offset.
    async fn seek_to_beginning(&mut self, partitions: &[i32], timeout: Duration)
    -> BusResult<()>;

    /// Partitions of `topic` visible to this group.
    async fn partition_count(&self, topic: &str, timeout: Duration) -> BusResult<usize>;

    /// Commit positions and release the handle. Safe to call repeatedly.
    async fn close(&mut self) -> BusResult<()>;
}
