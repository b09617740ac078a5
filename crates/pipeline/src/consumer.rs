//! Cooperative poll loop turning bus records back into [`LogEvent`]s.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use logpipe_bus::{BusError, BusRecord, MessageBus, Subscriber};
use logpipe_telemetry::{Counter, MetricsRegistry};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{ConsumerError, ConsumerResult};
use crate::event::LogEvent;
use crate::sink::EventSink;

/// Lifecycle of a [`MessageConsumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Built, no bus traffic yet
    Created,
    /// Subscribed, partitions not necessarily assigned
    Subscribed,
    /// Inside the poll loop
    Polling,
    /// Loop left, subscription not yet released
    Stopping,
    /// Subscription released
    Closed,
}

/// Tuning knobs for the poll loop.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Rewind every assigned partition before the loop starts
    pub from_beginning: bool,
    /// Bound for one poll
    pub poll_timeout: Duration,
    /// Bound for the assignment poll issued when rewinding
    pub assignment_timeout: Duration,
    /// Consumed events between two statistics reports
    pub stats_every: u64,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            from_beginning: false,
            poll_timeout: Duration::from_millis(100),
            assignment_timeout: Duration::from_secs(1),
            stats_every: 100,
        }
    }
}

/// Live view of a consumer that can be held while the loop runs elsewhere.
#[derive(Clone)]
pub struct ConsumerHandle {
    token: CancellationToken,
    consumed: Counter,
    failed: Counter,
    state: Arc<Mutex<ConsumerState>>,
}

impl ConsumerHandle {
    /// Ask the loop to finish after its current iteration.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Events handed to the sink so far.
    pub fn consumed(&self) -> u64 {
        self.consumed.get()
    }

    /// Records that failed to decode so far.
    pub fn failed(&self) -> u64 {
        self.failed.get()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        *self.state.lock()
    }
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("state", &self.state())
            .field("consumed", &self.consumed())
            .field("failed", &self.failed())
            .finish()
    }
}

/// Reads one topic as a member of a consumer group.
///
/// The loop checks the cancellation token once per iteration, so a stop
/// request takes effect at most one poll timeout later. Records that fail to
/// decode are counted and skipped.
pub struct MessageConsumer {
    bus: Arc<dyn MessageBus>,
    topic: String,
    group_id: String,
    options: ConsumerOptions,
    sink: Arc<dyn EventSink>,
    registry: Arc<MetricsRegistry>,
    subscriber: Option<Box<dyn Subscriber>>,
    handle: ConsumerHandle,
}

impl MessageConsumer {
    /// Fix topic, group, options, stop token and sink. No bus traffic.
    pub fn new(
        bus: Arc<dyn MessageBus>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
        options: ConsumerOptions,
        token: CancellationToken,
        sink: Arc<dyn EventSink>,
        registry: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            bus,
            topic: topic.into(),
            group_id: group_id.into(),
            options,
            sink,
            registry,
            subscriber: None,
            handle: ConsumerHandle {
                token,
                consumed: Counter::new(),
                failed: Counter::new(),
                state: Arc::new(Mutex::new(ConsumerState::Created)),
            },
        }
    }

    /// Subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Consumer group.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConsumerState {
        self.handle.state()
    }

    /// Events handed to the sink so far.
    pub fn consumed(&self) -> u64 {
        self.handle.consumed()
    }

    /// Records that failed to decode so far.
    pub fn failed(&self) -> u64 {
        self.handle.failed()
    }

    /// Handle for stopping and observing the consumer from another task.
    pub fn handle(&self) -> ConsumerHandle {
        self.handle.clone()
    }

    /// The token [`stop`](Self::stop) cancels.
    pub fn stop_token(&self) -> CancellationToken {
        self.handle.token.clone()
    }

    /// Request the loop to finish. Repeated calls keep it stopped.
    pub fn stop(&self) {
        self.handle.stop();
    }

    fn set_state(&self, state: ConsumerState) {
        *self.handle.state.lock() = state;
    }

    /// Subscribe and run the poll loop until stopped.
    ///
    /// With `from_beginning` one assignment poll is issued first and its
    /// records are discarded, then every assigned partition is rewound so the
    /// loop reads each record once from the earliest offset.
    /// Returns once the token is cancelled or the subscription is closed
    /// underneath; the subscription is released either way.
    pub async fn consume(&mut self) -> ConsumerResult<()> {
        if self.state() == ConsumerState::Closed {
            return Err(ConsumerError::Closed);
        }

        let mut subscriber = self.bus.subscriber(&self.group_id)?;
        subscriber.subscribe(&self.topic)?;
        self.set_state(ConsumerState::Subscribed);
        tracing::info!(topic = %self.topic, group = %self.group_id, "subscribed");

        if self.options.from_beginning {
            let assigned = tokio::select! {
                biased;
                () = self.handle.token.cancelled() => None,
                polled = self.rewind(subscriber.as_mut()) => Some(polled),
            };
            match assigned {
                Some(Ok(())) => {}
                Some(Err(e)) => {
                    self.subscriber = Some(subscriber);
                    self.close().await;
                    return Err(e);
                }
                None => {
                    self.subscriber = Some(subscriber);
                    self.close().await;
                    return Err(ConsumerError::Interrupted);
                }
            }
        }

        self.set_state(ConsumerState::Polling);
        self.run_loop(subscriber.as_mut()).await;

        self.set_state(ConsumerState::Stopping);
        self.subscriber = Some(subscriber);
        self.close().await;
        Ok(())
    }

    async fn rewind(&self, subscriber: &mut dyn Subscriber) -> ConsumerResult<()> {
        // the rewind below delivers these again
        let discarded = subscriber.poll(self.options.assignment_timeout).await?.len();

        let partitions = subscriber.assignment()?;
        subscriber
            .seek_to_beginning(&partitions, self.options.assignment_timeout)
            .await?;
        tracing::info!(topic = %self.topic, ?partitions, discarded, "rewound to earliest offsets");
        Ok(())
    }

    async fn run_loop(&self, subscriber: &mut dyn Subscriber) {
        let token = &self.handle.token;
        while !token.is_cancelled() {
            match subscriber.poll(self.options.poll_timeout).await {
                Ok(records) => {
                    for record in &records {
                        self.process_record(record);
                    }
                }
                Err(BusError::Closed) => {
                    tracing::warn!(topic = %self.topic, "subscription closed, leaving poll loop");
                    break;
                }
                Err(error) => {
                    self.registry.record_error();
                    tracing::warn!(topic = %self.topic, %error, "poll failed");
                    tokio::select! {
                        () = token.cancelled() => {}
                        () = tokio::time::sleep(self.options.poll_timeout) => {}
                    }
                }
            }
        }
        tracing::info!(
            topic = %self.topic,
            consumed = self.consumed(),
            failed = self.failed(),
            "poll loop finished"
        );
    }

    /// Decode one record and hand it to the sink.
    ///
    /// Returns `false` when the payload could not be decoded; the failure is
    /// counted and logged.
    pub fn process_record(&self, record: &BusRecord) -> bool {
        match LogEvent::decode(&record.payload) {
            Ok(event) => {
                self.handle.consumed.inc();
                self.registry.record_consumed();
                self.sink.on_event(&event, record.partition, record.offset);

                let consumed = self.handle.consumed.get();
                if self.options.stats_every > 0 && consumed % self.options.stats_every == 0 {
                    let failed = self.handle.failed.get();
                    tracing::info!(consumed, failed, "consumer statistics");
                    self.sink.on_stats(consumed, failed);
                }
                true
            }
            Err(error) => {
                self.handle.failed.inc();
                self.registry.record_error();
                tracing::warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    %error,
                    "skipping undecodable record"
                );
                false
            }
        }
    }

    /// Stop the loop and release the subscription.
    ///
    /// Safe to call repeatedly and without a prior [`consume`](Self::consume).
    pub async fn close(&mut self) {
        self.stop();
        if let Some(mut subscriber) = self.subscriber.take() {
            if let Err(error) = subscriber.close().await {
                tracing::warn!(topic = %self.topic, %error, "closing subscription failed");
            }
        }
        if self.state() != ConsumerState::Closed {
            self.set_state(ConsumerState::Closed);
            tracing::info!(
                topic = %self.topic,
                consumed = self.consumed(),
                failed = self.failed(),
                "consumer closed"
            );
        }
    }
}

impl fmt::Debug for MessageConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageConsumer")
            .field("topic", &self.topic)
            .field("group_id", &self.group_id)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use logpipe_bus::MemoryBus;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sink::CollectingSink;

    fn consumer(bus: &MemoryBus, sink: Arc<CollectingSink>, options: ConsumerOptions) -> MessageConsumer {
        MessageConsumer::new(
            Arc::new(bus.clone()),
            "logs",
            "testers",
            options,
            CancellationToken::new(),
            sink,
            MetricsRegistry::shared(),
        )
    }

    fn record(offset: i64, payload: &[u8]) -> BusRecord {
        BusRecord {
            topic: "logs".into(),
            partition: 0,
            offset,
            key: None,
            payload: payload.to_vec(),
        }
    }

    fn valid_payload(id: &str) -> Vec<u8> {
        LogEvent::new(id, Utc::now(), "INFO", "svc", "m").encode().unwrap()
    }

    #[test]
    fn process_record_counts_both_outcomes() {
        let sink = Arc::new(CollectingSink::new());
        let consumer = consumer(&MemoryBus::new(), Arc::clone(&sink), ConsumerOptions::default());

        assert!(!consumer.process_record(&record(0, b"{broken")));
        assert!(consumer.process_record(&record(1, &valid_payload("ok"))));

        assert_eq!(consumer.failed(), 1);
        assert_eq!(consumer.consumed(), 1);
        assert_eq!(sink.events()[0].offset, 1);
    }

    #[test]
    fn stats_reported_every_n_events() {
        let sink = Arc::new(CollectingSink::new());
        let options = ConsumerOptions {
            stats_every: 2,
            ..ConsumerOptions::default()
        };
        let consumer = consumer(&MemoryBus::new(), Arc::clone(&sink), options);

        for offset in 0..5 {
            consumer.process_record(&record(offset, &valid_payload("e")));
        }
        assert_eq!(sink.stats_reports(), vec![(2, 0), (4, 0)]);
    }

    #[tokio::test]
    async fn close_without_consume_is_idempotent() {
        let mut consumer = consumer(&MemoryBus::new(), Arc::new(CollectingSink::new()), ConsumerOptions::default());
        consumer.close().await;
        consumer.close().await;
        assert_eq!(consumer.state(), ConsumerState::Closed);
        assert_eq!(consumer.consume().await, Err(ConsumerError::Closed));
    }

    #[tokio::test]
    async fn stop_before_consume_returns_after_subscribing() {
        let bus = MemoryBus::new();
        let mut consumer = consumer(&bus, Arc::new(CollectingSink::new()), ConsumerOptions::default());
        consumer.stop();
        consumer.stop();

        consumer.consume().await.unwrap();
        assert_eq!(consumer.state(), ConsumerState::Closed);
    }

    #[tokio::test]
    async fn from_beginning_replays_committed_records() {
        let bus = MemoryBus::new();
        let publisher = bus.publisher().unwrap();
        for id in ["a", "b", "c"] {
            publisher.publish("logs", Some(id), valid_payload(id)).await.unwrap();
        }

        let first_sink = Arc::new(CollectingSink::new());
        let mut first = consumer(&bus, Arc::clone(&first_sink), ConsumerOptions::default());
        let handle = first.handle();
        let run = tokio::spawn(async move { first.consume().await });
        while handle.consumed() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.stop();
        run.await.unwrap().unwrap();

        let replay_sink = Arc::new(CollectingSink::new());
        let options = ConsumerOptions {
            from_beginning: true,
            ..ConsumerOptions::default()
        };
        let mut replay = consumer(&bus, Arc::clone(&replay_sink), options);
        let handle = replay.handle();
        let run = tokio::spawn(async move { replay.consume().await });
        while handle.consumed() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.stop();
        run.await.unwrap().unwrap();

        assert_eq!(replay_sink.len(), 3);
    }

    #[tokio::test]
    async fn from_beginning_with_fresh_group_delivers_each_record_once() {
        let bus = MemoryBus::new();
        let publisher = bus.publisher().unwrap();
        for id in ["a", "b", "c"] {
            publisher.publish("logs", None, valid_payload(id)).await.unwrap();
        }

        let sink = Arc::new(CollectingSink::new());
        let registry = MetricsRegistry::shared();
        let options = ConsumerOptions {
            from_beginning: true,
            ..ConsumerOptions::default()
        };
        let mut fresh = MessageConsumer::new(
            Arc::new(bus.clone()),
            "logs",
            "fresh-group",
            options,
            CancellationToken::new(),
            Arc::clone(&sink) as Arc<dyn crate::sink::EventSink>,
            Arc::clone(&registry),
        );
        let handle = fresh.handle();
        let run = tokio::spawn(async move { fresh.consume().await });

        while handle.consumed() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // give a duplicate delivery time to show up
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.stop();
        run.await.unwrap().unwrap();

        let ids: Vec<String> = sink.events().iter().map(|e| e.event.id().to_string()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(handle.consumed(), 3);
        assert_eq!(registry.snapshot().consumed_messages(), 3);
    }
}
