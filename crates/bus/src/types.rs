//! Value types exchanged with the bus.

/// Acknowledgment for a published record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Topic the record landed on
    pub topic: String,
    /// Partition the record landed on
    pub partition: i32,
    /// Offset assigned by the bus
    pub offset: i64,
}

/// A record fetched by a [`Subscriber`](crate::Subscriber).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Record key, if any
    pub key: Option<Vec<u8>>,
    /// Raw payload (empty for tombstones)
    pub payload: Vec<u8>,
}

/// A broker as reported by cluster metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerInfo {
    /// Broker id
    pub id: i32,
    /// Advertised host
    pub host: String,
    /// Advertised port
    pub port: i32,
}

/// Cluster identity and broker list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Cluster id, when the bus reports one
    pub cluster_id: Option<String>,
    /// Known brokers
    pub brokers: Vec<BrokerInfo>,
}

/// One partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Partition id
    pub id: i32,
    /// Leader broker id
    pub leader: i32,
    /// Replica broker ids
    pub replicas: Vec<i32>,
}

/// Topic metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescription {
    /// Topic name
    pub name: String,
    /// Partitions, ordered by id
    pub partitions: Vec<PartitionInfo>,
}

impl TopicDescription {
    /// Smallest replica count over all partitions, 0 without partitions.
    #[must_use]
    pub fn min_replicas(&self) -> usize {
        self.partitions
            .iter()
            .map(|p| p.replicas.len())
            .min()
            .unwrap_or(0)
    }
}

/// Parameters for topic creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    /// Topic name
    pub name: String,
    /// Number of partitions
    pub partitions: u32,
    /// Replication factor
    pub replication: u16,
}

impl TopicSpec {
    /// Topic with the given layout.
    pub fn new(name: impl Into<String>, partitions: u32, replication: u16) -> Self {
        Self {
            name: name.into(),
            partitions,
            replication,
        }
    }
}
