//! Kafka-backed bus over `rdkafka`.
//!
//! The `rdkafka` crate requires the native `librdkafka` C library, which is
//! why this module sits behind the `kafka` feature.
//!
//! Metadata and flush calls in librdkafka block the calling thread, so they
//! run on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::metadata::Metadata;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Offset, TopicPartitionList};

use crate::error::{BusError, BusResult};
use crate::settings::BusSettings;
use crate::traits::{MessageBus, Publisher, Subscriber};
use crate::types::{
    BrokerInfo, BusRecord, ClusterInfo, Delivery, PartitionInfo, TopicDescription, TopicSpec,
};

/// Wait used to drain records that are already buffered after the first one.
const DRAIN_WAIT: Duration = Duration::from_millis(1);

/// [`MessageBus`] backed by a Kafka cluster.
pub struct KafkaBus {
    settings: BusSettings,
    admin: Arc<AdminClient<DefaultClientContext>>,
}

impl KafkaBus {
    /// Build the admin client. No network traffic happens until first use.
    pub fn new(settings: BusSettings) -> BusResult<Self> {
        let admin: AdminClient<DefaultClientContext> = base_config(&settings)
            .create()
            .map_err(|e| client_error(&settings, &e))?;
        Ok(Self {
            settings,
            admin: Arc::new(admin),
        })
    }

    fn producer_config(&self) -> ClientConfig {
        let s = &self.settings;
        let mut config = base_config(s);
        config
            .set("compression.type", s.compression.as_str())
            .set("acks", s.acks.as_str())
            .set("delivery.timeout.ms", s.delivery_timeout_ms.to_string())
            .set("batch.size", s.batch_size.to_string())
            .set("linger.ms", s.linger_ms.to_string());
        config
    }

    fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let s = &self.settings;
        let mut config = base_config(s);
        config
            .set("group.id", group_id)
            .set("auto.offset.reset", s.offset_reset.as_str())
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                s.auto_commit_interval_ms.to_string(),
            )
            .set("session.timeout.ms", s.session_timeout_ms.to_string());
        config
    }

    async fn metadata(&self, topic: Option<&str>, timeout: Duration) -> BusResult<Snapshot> {
        let admin = Arc::clone(&self.admin);
        let topic = topic.map(str::to_string);
        let endpoint = self.settings.bootstrap_servers.clone();
        run_blocking(&self.settings, move || {
            let metadata = admin
                .inner()
                .fetch_metadata(topic.as_deref(), timeout)
                .map_err(|e| map_error(&endpoint, &e))?;
            let cluster_id = admin.inner().fetch_cluster_id(timeout);
            Ok(Snapshot::from_metadata(&metadata, cluster_id))
        })
        .await
    }
}

impl std::fmt::Debug for KafkaBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaBus")
            .field("bootstrap_servers", &self.settings.bootstrap_servers)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MessageBus for KafkaBus {
    fn kind(&self) -> &'static str {
        "kafka"
    }

    fn endpoint(&self) -> &str {
        &self.settings.bootstrap_servers
    }

    fn publisher(&self) -> BusResult<Arc<dyn Publisher>> {
        let producer: FutureProducer = self
            .producer_config()
            .create()
            .map_err(|e| client_error(&self.settings, &e))?;
        Ok(Arc::new(KafkaPublisher {
            settings: self.settings.clone(),
            producer,
        }))
    }

    fn subscriber(&self, group_id: &str) -> BusResult<Box<dyn Subscriber>> {
        let consumer: StreamConsumer = self
            .consumer_config(group_id)
            .create()
            .map_err(|e| client_error(&self.settings, &e))?;
        Ok(Box::new(KafkaSubscriber {
            settings: self.settings.clone(),
            consumer: Some(Arc::new(consumer)),
        }))
    }

    async fn cluster_info(&self, timeout: Duration) -> BusResult<ClusterInfo> {
        Ok(self.metadata(None, timeout).await?.cluster)
    }

    async fn list_topics(&self, timeout: Duration) -> BusResult<Vec<String>> {
        Ok(self
            .metadata(None, timeout)
            .await?
            .topics
            .into_iter()
            .filter(|t| t.error.is_none())
            .map(|t| t.description.name)
            .collect())
    }

    async fn describe_topic(&self, name: &str, timeout: Duration) -> BusResult<TopicDescription> {
        self.metadata(Some(name), timeout)
            .await?
            .topics
            .into_iter()
            .find(|t| t.description.name == name && t.error.is_none())
            .map(|t| t.description)
            .ok_or_else(|| BusError::UnknownTopic(name.to_string()))
    }

    async fn create_topic(&self, spec: &TopicSpec, timeout: Duration) -> BusResult<()> {
        let partitions = i32::try_from(spec.partitions).map_err(|_| BusError::InvalidTopic {
            name: spec.name.clone(),
            reason: format!("partition count {} out of range", spec.partitions),
        })?;
        let topic = NewTopic::new(
            &spec.name,
            partitions,
            TopicReplication::Fixed(i32::from(spec.replication)),
        );
        let options = AdminOptions::new().operation_timeout(Some(timeout));

        let results = self
            .admin
            .create_topics(&[topic], &options)
            .await
            .map_err(|e| map_error(&self.settings.bootstrap_servers, &e))?;

        for result in results {
            if let Err((name, code)) = result {
                return Err(match code {
                    RDKafkaErrorCode::TopicAlreadyExists => BusError::TopicExists(name),
                    RDKafkaErrorCode::InvalidPartitions
                    | RDKafkaErrorCode::InvalidReplicationFactor
                    | RDKafkaErrorCode::InvalidTopic => BusError::InvalidTopic {
                        name,
                        reason: code.to_string(),
                    },
                    other => BusError::Client(format!("create topic '{name}': {other}")),
                });
            }
        }
        Ok(())
    }

    async fn delete_topic(&self, name: &str, timeout: Duration) -> BusResult<()> {
        let options = AdminOptions::new().operation_timeout(Some(timeout));
        let results = self
            .admin
            .delete_topics(&[name], &options)
            .await
            .map_err(|e| map_error(&self.settings.bootstrap_servers, &e))?;

        for result in results {
            if let Err((name, code)) = result {
                return Err(match code {
                    RDKafkaErrorCode::UnknownTopicOrPartition => BusError::UnknownTopic(name),
                    other => BusError::Client(format!("delete topic '{name}': {other}")),
                });
            }
        }
        Ok(())
    }
}

struct KafkaPublisher {
    settings: BusSettings,
    producer: FutureProducer,
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
    ) -> BusResult<Delivery> {
        let mut record = FutureRecord::<str, [u8]>::to(topic).payload(&payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        let (partition, offset) = self
            .producer
            .send(record, self.settings.delivery_timeout())
            .await
            .map_err(|(e, _)| match &e {
                KafkaError::MessageProduction(code) => BusError::Rejected {
                    topic: topic.to_string(),
                    reason: code.to_string(),
                },
                _ => map_error(&self.settings.bootstrap_servers, &e),
            })?;

        Ok(Delivery {
            topic: topic.to_string(),
            partition,
            offset,
        })
    }

    async fn flush(&self, timeout: Duration) -> BusResult<()> {
        let producer = self.producer.clone();
        let endpoint = self.settings.bootstrap_servers.clone();
        run_blocking(&self.settings, move || {
            producer.flush(timeout).map_err(|e| map_error(&endpoint, &e))
        })
        .await
    }

    async fn partition_count(&self, topic: &str, timeout: Duration) -> BusResult<usize> {
        let producer = self.producer.clone();
        let topic = topic.to_string();
        let endpoint = self.settings.bootstrap_servers.clone();
        run_blocking(&self.settings, move || {
            let metadata = producer
                .client()
                .fetch_metadata(Some(&topic), timeout)
                .map_err(|e| map_error(&endpoint, &e))?;
            Ok(partitions_of(&metadata, &topic))
        })
        .await
    }
}

struct KafkaSubscriber {
    settings: BusSettings,
    consumer: Option<Arc<StreamConsumer>>,
}

impl KafkaSubscriber {
    fn consumer(&self) -> BusResult<&Arc<StreamConsumer>> {
        self.consumer.as_ref().ok_or(BusError::Closed)
    }
}

#[async_trait]
impl Subscriber for KafkaSubscriber {
    fn subscribe(&mut self, topic: &str) -> BusResult<()> {
        self.consumer()?
            .subscribe(&[topic])
            .map_err(|e| map_error(&self.settings.bootstrap_servers, &e))
    }

    async fn poll(&mut self, timeout: Duration) -> BusResult<Vec<BusRecord>> {
        let consumer = Arc::clone(self.consumer()?);
        let mut batch = Vec::new();
        let mut wait = timeout;

        while batch.len() < self.settings.max_poll_records {
            let Ok(received) = tokio::time::timeout(wait, consumer.recv()).await else {
                break;
            };
            let message =
                received.map_err(|e| map_error(&self.settings.bootstrap_servers, &e))?;
            batch.push(BusRecord {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
                key: message.key().map(<[u8]>::to_vec),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            });
            wait = DRAIN_WAIT;
        }
        Ok(batch)
    }

    fn assignment(&self) -> BusResult<Vec<i32>> {
        let list: TopicPartitionList = self
            .consumer()?
            .assignment()
            .map_err(|e| map_error(&self.settings.bootstrap_servers, &e))?;
        Ok(list.elements().iter().map(|e| e.partition()).collect())
    }

    async fn seek_to_beginning(&mut self, partitions: &[i32], timeout: Duration) -> BusResult<()> {
        let consumer = self.consumer()?;
        let list = consumer
            .assignment()
            .map_err(|e| map_error(&self.settings.bootstrap_servers, &e))?;
        for &partition in partitions {
            let element = list
                .elements()
                .into_iter()
                .find(|e| e.partition() == partition)
                .ok_or(BusError::NotAssigned(partition))?;
            consumer
                .seek(element.topic(), partition, Offset::Beginning, timeout)
                .map_err(|e| map_error(&self.settings.bootstrap_servers, &e))?;
        }
        Ok(())
    }

    async fn partition_count(&self, topic: &str, timeout: Duration) -> BusResult<usize> {
        let consumer = Arc::clone(self.consumer()?);
        let topic = topic.to_string();
        let endpoint = self.settings.bootstrap_servers.clone();
        run_blocking(&self.settings, move || {
            let metadata = consumer
                .fetch_metadata(Some(&topic), timeout)
                .map_err(|e| map_error(&endpoint, &e))?;
            Ok(partitions_of(&metadata, &topic))
        })
        .await
    }

    async fn close(&mut self) -> BusResult<()> {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
        }
        Ok(())
    }
}

/// Owned copy of the metadata fields the bus exposes.
struct Snapshot {
    cluster: ClusterInfo,
    topics: Vec<TopicEntry>,
}

struct TopicEntry {
    description: TopicDescription,
    error: Option<String>,
}

impl Snapshot {
    fn from_metadata(metadata: &Metadata, cluster_id: Option<String>) -> Self {
        let brokers = metadata
            .brokers()
            .iter()
            .map(|b| BrokerInfo {
                id: b.id(),
                host: b.host().to_string(),
                port: b.port(),
            })
            .collect();
        let topics = metadata
            .topics()
            .iter()
            .map(|t| TopicEntry {
                description: TopicDescription {
                    name: t.name().to_string(),
                    partitions: t
                        .partitions()
                        .iter()
                        .map(|p| PartitionInfo {
                            id: p.id(),
                            leader: p.leader(),
                            replicas: p.replicas().to_vec(),
                        })
                        .collect(),
                },
                error: t.error().map(|e| format!("{e:?}")),
            })
            .collect();
        Self {
            cluster: ClusterInfo {
                cluster_id,
                brokers,
            },
            topics,
        }
    }
}

fn base_config(settings: &BusSettings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &settings.bootstrap_servers)
        .set("client.id", &settings.client_id);
    config
}

fn partitions_of(metadata: &Metadata, topic: &str) -> usize {
    metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic && t.error().is_none())
        .map_or(0, |t| t.partitions().len())
}

async fn run_blocking<T, F>(settings: &BusSettings, f: F) -> BusResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> BusResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| client_error(settings, &e))?
}

fn map_error(endpoint: &str, error: &KafkaError) -> BusError {
    match error.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::Resolve
            | RDKafkaErrorCode::BrokerNotAvailable,
        ) => BusError::Connectivity {
            endpoint: endpoint.to_string(),
            reason: error.to_string(),
        },
        Some(RDKafkaErrorCode::OperationTimedOut | RDKafkaErrorCode::RequestTimedOut) => {
            BusError::Timeout {
                operation: "kafka request".to_string(),
                timeout_ms: 0,
            }
        }
        _ => BusError::Client(error.to_string()),
    }
}

fn client_error(settings: &BusSettings, error: &dyn std::fmt::Display) -> BusError {
    BusError::Client(format!(
        "kafka client for '{}': {error}",
        settings.bootstrap_servers
    ))
}
