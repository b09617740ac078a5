//! In-process message bus.
//!
//! Topics are split into partitions; every partition is an append-only log
//! addressed by offset. Consumer groups keep committed positions that are
//! advanced on every poll, which plays the role of auto-commit. Nothing is
//! persisted.
//!
//! The bus also exposes a couple of fault switches
//! ([`set_reachable`](MemoryBus::set_reachable),
//! [`fail_next_publishes`](MemoryBus::fail_next_publishes)) so failure paths
//! can be driven without a broker.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{BusError, BusResult};
use crate::settings::{BusSettings, OffsetReset};
use crate::traits::{MessageBus, Publisher, Subscriber};
use crate::types::{
    BrokerInfo, BusRecord, ClusterInfo, Delivery, PartitionInfo, TopicDescription, TopicSpec,
};

const BROKER_ID: i32 = 0;
const BROKER_COUNT: u16 = 1;

/// In-process [`MessageBus`].
///
/// Cloning shares the same topics.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: String,
    cluster_id: String,
    offset_reset: OffsetReset,
    max_poll_records: usize,
    default_partitions: u32,
    state: Mutex<State>,
    appended: Notify,
    reachable: AtomicBool,
    auto_create_topics: AtomicBool,
    failing_publishes: AtomicU64,
}

#[derive(Default)]
struct State {
    topics: BTreeMap<String, TopicLog>,
    /// (group, topic, partition) -> next offset to read
    committed: HashMap<(String, String, i32), i64>,
}

struct TopicLog {
    partitions: Vec<Vec<StoredRecord>>,
    replication: u16,
    round_robin: usize,
}

struct StoredRecord {
    key: Option<Vec<u8>>,
    payload: Vec<u8>,
}

impl TopicLog {
    fn new(partitions: u32, replication: u16) -> Self {
        Self {
            partitions: (0..partitions).map(|_| Vec::new()).collect(),
            replication,
            round_robin: 0,
        }
    }

    fn pick_partition(&mut self, key: Option<&str>) -> usize {
        let count = self.partitions.len();
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % count as u64) as usize
            }
            None => {
                let partition = self.round_robin % count;
                self.round_robin = self.round_robin.wrapping_add(1);
                partition
            }
        }
    }
}

impl MemoryBus {
    /// A bus at `memory://local` that auto-creates single-partition topics.
    #[must_use]
    pub fn new() -> Self {
        Self::from_settings(&BusSettings::new("memory://local"))
    }

    /// A bus configured from client settings.
    #[must_use]
    pub fn from_settings(settings: &BusSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint: settings.bootstrap_servers.clone(),
                cluster_id: uuid::Uuid::new_v4().simple().to_string(),
                offset_reset: settings.offset_reset,
                max_poll_records: settings.max_poll_records.max(1),
                default_partitions: 1,
                state: Mutex::new(State::default()),
                appended: Notify::new(),
                reachable: AtomicBool::new(true),
                auto_create_topics: AtomicBool::new(true),
                failing_publishes: AtomicU64::new(0),
            }),
        }
    }

    /// Create `name` with the given partition count unless it exists.
    pub fn ensure_topic(&self, name: &str, partitions: u32) -> BusResult<()> {
        match self.inner.create(&TopicSpec::new(name, partitions, 1)) {
            Ok(()) | Err(BusError::TopicExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Make the bus unreachable (or reachable again).
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Toggle topic auto-creation on first publish.
    pub fn set_auto_create_topics(&self, enabled: bool) {
        self.inner
            .auto_create_topics
            .store(enabled, Ordering::SeqCst);
    }

    /// Reject the next `n` publishes.
    pub fn fail_next_publishes(&self, n: u64) {
        self.inner.failing_publishes.store(n, Ordering::SeqCst);
    }

    /// Every record of `topic`, partition by partition.
    #[must_use]
    pub fn records(&self, topic: &str) -> Vec<BusRecord> {
        let state = self.inner.state.lock();
        let Some(log) = state.topics.get(topic) else {
            return Vec::new();
        };
        log.partitions
            .iter()
            .enumerate()
            .flat_map(|(partition, records)| {
                records
                    .iter()
                    .enumerate()
                    .map(move |(offset, r)| BusRecord {
                        topic: topic.to_string(),
                        partition: partition as i32,
                        offset: offset as i64,
                        key: r.key.clone(),
                        payload: r.payload.clone(),
                    })
            })
            .collect()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBus")
            .field("endpoint", &self.inner.endpoint)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn ensure_reachable(&self) -> BusResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BusError::Connectivity {
                endpoint: self.endpoint.clone(),
                reason: "bus is unreachable".to_string(),
            })
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn append(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> BusResult<Delivery> {
        self.ensure_reachable()?;
        if self.take_injected_failure() {
            return Err(BusError::Rejected {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let auto_create = self.auto_create_topics.load(Ordering::SeqCst);
        let mut state = self.state.lock();
        let log = match state.topics.entry(topic.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) if auto_create => {
                tracing::debug!(topic, "auto-creating topic");
                e.insert(TopicLog::new(self.default_partitions, 1))
            }
            Entry::Vacant(_) => return Err(BusError::UnknownTopic(topic.to_string())),
        };

        let partition = log.pick_partition(key);
        let records = &mut log.partitions[partition];
        records.push(StoredRecord {
            key: key.map(|k| k.as_bytes().to_vec()),
            payload,
        });
        let offset = records.len() as i64 - 1;
        drop(state);

        self.appended.notify_waiters();
        Ok(Delivery {
            topic: topic.to_string(),
            partition: partition as i32,
            offset,
        })
    }

    fn create(&self, spec: &TopicSpec) -> BusResult<()> {
        self.ensure_reachable()?;
        if spec.name.trim().is_empty() {
            return Err(BusError::InvalidTopic {
                name: spec.name.clone(),
                reason: "name is empty".to_string(),
            });
        }
        if spec.partitions == 0 {
            return Err(BusError::InvalidTopic {
                name: spec.name.clone(),
                reason: "partition count must be positive".to_string(),
            });
        }
        if spec.replication == 0 || spec.replication > BROKER_COUNT {
            return Err(BusError::InvalidTopic {
                name: spec.name.clone(),
                reason: format!(
                    "replication factor {} outside 1..={BROKER_COUNT} available brokers",
                    spec.replication
                ),
            });
        }

        let mut state = self.state.lock();
        match state.topics.entry(spec.name.clone()) {
            Entry::Occupied(_) => Err(BusError::TopicExists(spec.name.clone())),
            Entry::Vacant(e) => {
                e.insert(TopicLog::new(spec.partitions, spec.replication));
                Ok(())
            }
        }
    }

    fn partition_count(&self, topic: &str) -> BusResult<usize> {
        self.ensure_reachable()?;
        let state = self.state.lock();
        Ok(state.topics.get(topic).map_or(0, |log| log.partitions.len()))
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    fn publisher(&self) -> BusResult<Arc<dyn Publisher>> {
        Ok(Arc::new(MemoryPublisher {
            bus: Arc::clone(&self.inner),
        }))
    }

    fn subscriber(&self, group_id: &str) -> BusResult<Box<dyn Subscriber>> {
        Ok(Box::new(MemorySubscriber {
            bus: Arc::clone(&self.inner),
            group_id: group_id.to_string(),
            topic: None,
            positions: BTreeMap::new(),
            closed: false,
        }))
    }

    async fn cluster_info(&self, _timeout: Duration) -> BusResult<ClusterInfo> {
        self.inner.ensure_reachable()?;
        Ok(ClusterInfo {
            cluster_id: Some(self.inner.cluster_id.clone()),
            brokers: vec![BrokerInfo {
                id: BROKER_ID,
                host: "localhost".to_string(),
                port: 0,
            }],
        })
    }

    async fn list_topics(&self, _timeout: Duration) -> BusResult<Vec<String>> {
        self.inner.ensure_reachable()?;
        Ok(self.inner.state.lock().topics.keys().cloned().collect())
    }

    async fn describe_topic(&self, name: &str, _timeout: Duration) -> BusResult<TopicDescription> {
        self.inner.ensure_reachable()?;
        let state = self.inner.state.lock();
        let log = state
            .topics
            .get(name)
            .ok_or_else(|| BusError::UnknownTopic(name.to_string()))?;
        let replicas: Vec<i32> = (0..i32::from(log.replication)).collect();
        Ok(TopicDescription {
            name: name.to_string(),
            partitions: (0..log.partitions.len())
                .map(|id| PartitionInfo {
                    id: id as i32,
                    leader: BROKER_ID,
                    replicas: replicas.clone(),
                })
                .collect(),
        })
    }

    async fn create_topic(&self, spec: &TopicSpec, _timeout: Duration) -> BusResult<()> {
        self.inner.create(spec)
    }

    async fn delete_topic(&self, name: &str, _timeout: Duration) -> BusResult<()> {
        self.inner.ensure_reachable()?;
        let mut state = self.inner.state.lock();
        if state.topics.remove(name).is_none() {
            return Err(BusError::UnknownTopic(name.to_string()));
        }
        state.committed.retain(|(_, topic, _), _| topic != name);
        Ok(())
    }
}

struct MemoryPublisher {
    bus: Arc<Inner>,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> BusResult<Delivery> {
        self.bus.append(topic, key, payload)
    }

    async fn flush(&self, _timeout: Duration) -> BusResult<()> {
        self.bus.ensure_reachable()
    }

    async fn partition_count(&self, topic: &str, _timeout: Duration) -> BusResult<usize> {
        self.bus.partition_count(topic)
    }
}

struct MemorySubscriber {
    bus: Arc<Inner>,
    group_id: String,
    topic: Option<String>,
    /// Assigned partitions and the next offset to read from each.
    positions: BTreeMap<i32, i64>,
    closed: bool,
}

impl MemorySubscriber {
    fn ensure_open(&self) -> BusResult<()> {
        if self.closed {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }

    /// Assign any partitions not yet assigned and read what is available.
    fn fetch(&mut self, topic: &str) -> Vec<BusRecord> {
        let mut guard = self.bus.state.lock();
        let state = &mut *guard;
        let Some(log) = state.topics.get(topic) else {
            return Vec::new();
        };

        for (partition, records) in log.partitions.iter().enumerate() {
            let partition = partition as i32;
            self.positions.entry(partition).or_insert_with(|| {
                let key = (self.group_id.clone(), topic.to_string(), partition);
                state
                    .committed
                    .get(&key)
                    .copied()
                    .unwrap_or(match self.bus.offset_reset {
                        OffsetReset::Earliest => 0,
                        OffsetReset::Latest => records.len() as i64,
                    })
            });
        }

        let mut batch = Vec::new();
        for (&partition, position) in &mut self.positions {
            let Some(records) = log.partitions.get(partition as usize) else {
                continue;
            };
            while batch.len() < self.bus.max_poll_records {
                let Some(record) = records.get(*position as usize) else {
                    break;
                };
                batch.push(BusRecord {
                    topic: topic.to_string(),
                    partition,
                    offset: *position,
                    key: record.key.clone(),
                    payload: record.payload.clone(),
                });
                *position += 1;
            }
            state.committed.insert(
                (self.group_id.clone(), topic.to_string(), partition),
                *position,
            );
        }
        batch
    }
}

#[async_trait]
impl Subscriber for MemorySubscriber {
    fn subscribe(&mut self, topic: &str) -> BusResult<()> {
        self.ensure_open()?;
        self.topic = Some(topic.to_string());
        self.positions.clear();
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> BusResult<Vec<BusRecord>> {
        self.ensure_open()?;
        let topic = self.topic.clone().ok_or(BusError::NotSubscribed)?;
        let bus = Arc::clone(&self.bus);
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before reading so an append between the read
            // and the wait still wakes us.
            let mut appended = std::pin::pin!(bus.appended.notified());
            appended.as_mut().enable();

            bus.ensure_reachable()?;
            let batch = self.fetch(&topic);
            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            if tokio::time::timeout(deadline - now, appended).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    fn assignment(&self) -> BusResult<Vec<i32>> {
        self.ensure_open()?;
        Ok(self.positions.keys().copied().collect())
    }

    async fn seek_to_beginning(&mut self, partitions: &[i32], _timeout: Duration) -> BusResult<()> {
        self.ensure_open()?;
        for partition in partitions {
            let position = self
                .positions
                .get_mut(partition)
                .ok_or(BusError::NotAssigned(*partition))?;
            *position = 0;
        }
        Ok(())
    }

    async fn partition_count(&self, topic: &str, _timeout: Duration) -> BusResult<usize> {
        self.ensure_open()?;
        self.bus.partition_count(topic)
    }

    async fn close(&mut self) -> BusResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(topic) = self.topic.take() {
            let mut state = self.bus.state.lock();
            for (&partition, &position) in &self.positions {
                state
                    .committed
                    .insert((self.group_id.clone(), topic.clone(), partition), position);
            }
        }
        self.positions.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn publish_auto_creates_and_assigns_offsets() {
        let bus = MemoryBus::new();
        let publisher = bus.publisher().unwrap();

        let first = publisher.publish("logs", None, b"a".to_vec()).await.unwrap();
        let second = publisher.publish("logs", None, b"b".to_vec()).await.unwrap();

        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 1);
        assert_eq!(bus.list_topics(WAIT).await.unwrap(), vec!["logs".to_string()]);
    }

    #[tokio::test]
    async fn same_key_lands_on_same_partition() {
        let bus = MemoryBus::new();
        bus.ensure_topic("logs", 4).unwrap();
        let publisher = bus.publisher().unwrap();

        let a = publisher.publish("logs", Some("k"), b"1".to_vec()).await.unwrap();
        let b = publisher.publish("logs", Some("k"), b"2".to_vec()).await.unwrap();
        assert_eq!(a.partition, b.partition);
        assert_eq!(b.offset, a.offset + 1);
    }

    #[tokio::test]
    async fn unknown_topic_without_auto_create() {
        let bus = MemoryBus::new();
        bus.set_auto_create_topics(false);
        let publisher = bus.publisher().unwrap();

        let err = publisher.publish("nope", None, Vec::new()).await.unwrap_err();
        assert_eq!(err, BusError::UnknownTopic("nope".into()));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let bus = MemoryBus::new();
        bus.fail_next_publishes(1);
        let publisher = bus.publisher().unwrap();

        assert!(matches!(
            publisher.publish("logs", None, Vec::new()).await,
            Err(BusError::Rejected { .. })
        ));
        assert!(publisher.publish("logs", None, Vec::new()).await.is_ok());
    }

    #[tokio::test]
    async fn poll_requires_subscription() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscriber("g").unwrap();
        assert_eq!(sub.poll(WAIT).await.unwrap_err(), BusError::NotSubscribed);
    }

    #[tokio::test]
    async fn group_resumes_from_committed_offset() {
        let bus = MemoryBus::new();
        let publisher = bus.publisher().unwrap();
        for payload in [b"1", b"2"] {
            publisher.publish("logs", None, payload.to_vec()).await.unwrap();
        }

        let mut first = bus.subscriber("g").unwrap();
        first.subscribe("logs").unwrap();
        assert_eq!(first.poll(WAIT).await.unwrap().len(), 2);
        first.close().await.unwrap();

        publisher.publish("logs", None, b"3".to_vec()).await.unwrap();

        let mut second = bus.subscriber("g").unwrap();
        second.subscribe("logs").unwrap();
        let batch = second.poll(WAIT).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, b"3".to_vec());
    }

    #[tokio::test]
    async fn seek_requires_assignment_then_rewinds() {
        let bus = MemoryBus::new();
        let publisher = bus.publisher().unwrap();
        publisher.publish("logs", None, b"1".to_vec()).await.unwrap();

        let mut sub = bus.subscriber("g").unwrap();
        sub.subscribe("logs").unwrap();
        assert_eq!(
            sub.seek_to_beginning(&[0], WAIT).await.unwrap_err(),
            BusError::NotAssigned(0)
        );

        assert_eq!(sub.poll(WAIT).await.unwrap().len(), 1);
        assert_eq!(sub.assignment().unwrap(), vec![0]);
        sub.seek_to_beginning(&[0], WAIT).await.unwrap();
        assert_eq!(sub.poll(WAIT).await.unwrap()[0].offset, 0);
    }

    #[tokio::test]
    async fn poll_wakes_on_append() {
        let bus = MemoryBus::new();
        bus.ensure_topic("logs", 1).unwrap();
        let mut sub = bus.subscriber("g").unwrap();
        sub.subscribe("logs").unwrap();

        let publisher = bus.publisher().unwrap();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("logs", None, b"late".to_vec()).await
        });

        let batch = sub.poll(Duration::from_secs(5)).await.unwrap();
        assert_eq!(batch.len(), 1);
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_further_polls() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscriber("g").unwrap();
        sub.close().await.unwrap();
        sub.close().await.unwrap();
        assert_eq!(sub.poll(WAIT).await.unwrap_err(), BusError::Closed);
    }

    #[tokio::test]
    async fn admin_round_trip() {
        let bus = MemoryBus::new();
        bus.create_topic(&TopicSpec::new("orders", 3, 1), WAIT)
            .await
            .unwrap();
        assert_eq!(
            bus.create_topic(&TopicSpec::new("orders", 3, 1), WAIT).await,
            Err(BusError::TopicExists("orders".into()))
        );

        let description = bus.describe_topic("orders", WAIT).await.unwrap();
        assert_eq!(description.partitions.len(), 3);
        assert_eq!(description.min_replicas(), 1);
        assert!(bus.topic_exists("orders", WAIT).await.unwrap());

        bus.delete_topic("orders", WAIT).await.unwrap();
        assert!(!bus.topic_exists("orders", WAIT).await.unwrap());
    }

    #[tokio::test]
    async fn replication_beyond_broker_count_is_invalid() {
        let bus = MemoryBus::new();
        let err = bus
            .create_topic(&TopicSpec::new("orders", 1, 3), WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::InvalidTopic { .. }));
    }

    #[tokio::test]
    async fn unreachable_bus_reports_connectivity() {
        let bus = MemoryBus::new();
        bus.set_reachable(false);
        let err = bus.cluster_info(WAIT).await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
