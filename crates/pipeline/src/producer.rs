//! Publishing [`LogEvent`]s with synchronous or fire-and-forget delivery.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use logpipe_bus::{BusError, BusSettings, Delivery, MessageBus, Publisher};
use logpipe_telemetry::{Counter, MetricsRegistry};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{ProducerError, ProducerResult};
use crate::event::LogEvent;

/// Successful synchronous sends between two progress log lines.
const PROGRESS_EVERY: u64 = 100;

/// Final totals of a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProducerStats {
    /// Acknowledged sends
    pub sent: u64,
    /// Rejected or timed-out sends
    pub failed: u64,
}

impl ProducerStats {
    /// Percentage of acknowledged sends, `None` before any send finished.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.sent + self.failed;
        (total > 0).then(|| self.sent as f64 * 100.0 / total as f64)
    }
}

impl fmt::Display for ProducerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sent: {}, failed: {}, success rate: ", self.sent, self.failed)?;
        match self.success_rate() {
            Some(rate) => write!(f, "{rate:.2}%"),
            None => f.write_str("no data"),
        }
    }
}

/// Publishes events to one topic.
///
/// Every event is keyed by its id. [`send_sync`](Self::send_sync) waits for
/// the acknowledgment; [`send_async`](Self::send_async) hands the publish to
/// a tracked background task and only the counters learn its outcome.
pub struct MessageProducer {
    topic: String,
    publisher: Option<Arc<dyn Publisher>>,
    delivery_timeout: Duration,
    registry: Arc<MetricsRegistry>,
    sent: Counter,
    failed: Counter,
    in_flight: TaskTracker,
    flush_lock: Mutex<()>,
    shutdown: CancellationToken,
    closed: Option<ProducerStats>,
}

impl MessageProducer {
    /// Create a producer for `topic`. No bus traffic happens here.
    pub fn new(
        bus: &dyn MessageBus,
        topic: impl Into<String>,
        settings: &BusSettings,
        registry: Arc<MetricsRegistry>,
    ) -> ProducerResult<Self> {
        let topic = topic.into();
        let publisher = bus.publisher().map_err(ProducerError::Client)?;
        tracing::debug!(topic = %topic, bus = bus.kind(), "producer created");

        Ok(Self {
            topic,
            publisher: Some(publisher),
            delivery_timeout: settings.delivery_timeout(),
            registry,
            sent: Counter::new(),
            failed: Counter::new(),
            in_flight: TaskTracker::new(),
            flush_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
            closed: None,
        })
    }

    /// Abandon synchronous sends with [`ProducerError::Interrupted`] once
    /// `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Destination topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Acknowledged sends so far, async ones included once they completed.
    pub fn sent(&self) -> u64 {
        self.sent.get()
    }

    /// Rejected or timed-out sends so far.
    pub fn failed(&self) -> u64 {
        self.failed.get()
    }

    /// Current totals.
    pub fn stats(&self) -> ProducerStats {
        ProducerStats {
            sent: self.sent.get(),
            failed: self.failed.get(),
        }
    }

    fn publisher(&self) -> ProducerResult<Arc<dyn Publisher>> {
        self.publisher.clone().ok_or(ProducerError::Closed)
    }

    /// Publish and wait for the acknowledgment, bounded by the delivery
    /// timeout.
    pub async fn send_sync(&self, event: &LogEvent) -> ProducerResult<Delivery> {
        let publisher = self.publisher()?;
        let payload = event.encode()?;
        let started = Instant::now();

        let outcome = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(ProducerError::Interrupted),
            outcome = publish(publisher.as_ref(), &self.topic, event.id(), payload, self.delivery_timeout) => outcome,
        };

        match outcome {
            Ok(delivery) => {
                let sent = record_success(&self.sent, &self.registry, started);
                if sent % PROGRESS_EVERY == 0 {
                    tracing::info!(
                        sent,
                        topic = %delivery.topic,
                        partition = delivery.partition,
                        offset = delivery.offset,
                        "sync sends acknowledged"
                    );
                }
                Ok(delivery)
            }
            Err(source) => {
                record_failure(&self.failed, &self.registry);
                Err(ProducerError::Delivery {
                    topic: self.topic.clone(),
                    source,
                })
            }
        }
    }

    /// Submit the publish on a background task and return immediately.
    ///
    /// Only encoding errors reach the caller. Delivery failures are counted
    /// and logged by the task. Must be called from within a tokio runtime.
    pub fn send_async(&self, event: &LogEvent) -> ProducerResult<()> {
        let publisher = self.publisher()?;
        let payload = event.encode()?;
        let topic = self.topic.clone();
        let key = event.id().to_string();
        let timeout = self.delivery_timeout;
        let sent = self.sent.clone();
        let failed = self.failed.clone();
        let registry = Arc::clone(&self.registry);

        self.in_flight.spawn(async move {
            let started = Instant::now();
            match publish(publisher.as_ref(), &topic, &key, payload, timeout).await {
                Ok(delivery) => {
                    record_success(&sent, &registry, started);
                    tracing::debug!(
                        topic = %delivery.topic,
                        partition = delivery.partition,
                        offset = delivery.offset,
                        "async send acknowledged"
                    );
                }
                Err(error) => {
                    record_failure(&failed, &registry);
                    tracing::warn!(topic = %topic, key = %key, %error, "async send failed");
                }
            }
        });
        Ok(())
    }

    /// Wait for every pending async send, then flush the client buffers.
    ///
    /// Concurrent calls are serialised: the tracker is closed, drained and
    /// reopened by one caller at a time.
    pub async fn flush(&self) -> ProducerResult<()> {
        let publisher = self.publisher()?;
        {
            let _draining = self.flush_lock.lock().await;
            self.in_flight.close();
            self.in_flight.wait().await;
            self.in_flight.reopen();
        }

        publisher
            .flush(self.delivery_timeout)
            .await
            .map_err(ProducerError::Flush)
    }

    /// Flush, release the publisher and return the final totals.
    ///
    /// Calling it again returns the same totals without touching the bus.
    pub async fn close(&mut self) -> ProducerStats {
        if let Some(stats) = self.closed {
            return stats;
        }
        if let Err(error) = self.flush().await {
            tracing::warn!(topic = %self.topic, %error, "flush on close failed");
        }
        self.publisher = None;

        let stats = self.stats();
        tracing::info!(topic = %self.topic, sent = stats.sent, failed = stats.failed, "producer closed: {stats}");
        self.closed = Some(stats);
        stats
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }
}

impl fmt::Debug for MessageProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageProducer")
            .field("topic", &self.topic)
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn publish(
    publisher: &dyn Publisher,
    topic: &str,
    key: &str,
    payload: Vec<u8>,
    timeout: Duration,
) -> Result<Delivery, BusError> {
    tokio::time::timeout(timeout, publisher.publish(topic, Some(key), payload))
        .await
        .map_err(|_| BusError::timeout(format!("publish to '{topic}'"), timeout))?
}

fn record_success(sent: &Counter, registry: &MetricsRegistry, started: Instant) -> u64 {
    sent.inc();
    registry.record_produced();
    registry.record_latency_duration(started.elapsed());
    sent.get()
}

fn record_failure(failed: &Counter, registry: &MetricsRegistry) {
    failed.inc();
    registry.record_error();
}
