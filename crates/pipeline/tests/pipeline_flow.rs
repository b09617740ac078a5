//! Producer and consumer wired through the in-process bus.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use logpipe_bus::{BusSettings, MemoryBus, MessageBus};
use logpipe_pipeline::{
    CollectingSink, ConsumerOptions, ConsumerState, EventGenerator, GeneratePlan, LogEvent,
    MessageConsumer, MessageProducer, ProducerStats, run_generation,
};
use logpipe_telemetry::MetricsRegistry;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Helpers
// ============================================================================

fn settings() -> BusSettings {
    BusSettings::new("memory://pipeline")
}

fn producer(bus: &MemoryBus, registry: &Arc<MetricsRegistry>) -> MessageProducer {
    MessageProducer::new(bus, "logs", &settings(), Arc::clone(registry)).unwrap()
}

fn consumer(
    bus: &MemoryBus,
    sink: &Arc<CollectingSink>,
    registry: &Arc<MetricsRegistry>,
) -> MessageConsumer {
    MessageConsumer::new(
        Arc::new(bus.clone()),
        "logs",
        "readers",
        ConsumerOptions::default(),
        CancellationToken::new(),
        Arc::clone(sink) as Arc<dyn logpipe_pipeline::EventSink>,
        Arc::clone(registry),
    )
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn payment_event() -> LogEvent {
    LogEvent::new(
        "log-123",
        Utc::now(),
        "WARN",
        "transaction-service",
        "Payment Succeeded",
    )
    .with_user_id("user-123")
    .with_ip_addr("192.168.0.0")
    .with_duration_ms(3600)
}

// ============================================================================
// Producer
// ============================================================================

#[tokio::test]
async fn sync_send_increments_sent_only() {
    let bus = MemoryBus::new();
    let registry = MetricsRegistry::shared();
    let producer = producer(&bus, &registry);

    let delivery = producer.send_sync(&payment_event()).await.unwrap();

    assert_eq!(delivery.topic, "logs");
    assert_eq!(producer.stats(), ProducerStats { sent: 1, failed: 0 });
    assert_eq!(registry.snapshot().produced_messages(), 1);

    let stored = LogEvent::decode(&bus.records("logs")[0].payload).unwrap();
    assert_eq!(stored, payment_event().with_timestamp(stored.timestamp()));
}

#[tokio::test]
async fn async_sends_are_counted_after_flush() {
    let bus = MemoryBus::new();
    let registry = MetricsRegistry::shared();
    let mut producer = producer(&bus, &registry);
    bus.fail_next_publishes(2);

    for i in 0..10 {
        let event = LogEvent::new(format!("e-{i}"), Utc::now(), "INFO", "svc", "m");
        producer.send_async(&event).unwrap();
    }
    producer.flush().await.unwrap();

    assert_eq!(producer.sent() + producer.failed(), 10);
    assert_eq!(producer.failed(), 2);
    assert_eq!(bus.records("logs").len(), 8);

    let stats = producer.close().await;
    assert_eq!(stats.success_rate(), Some(80.0));
    assert_eq!(registry.snapshot().error_count(), 2);
}

#[tokio::test]
async fn close_without_traffic_reports_no_data() {
    let bus = MemoryBus::new();
    let mut producer = producer(&bus, &MetricsRegistry::shared());
    assert_eq!(producer.close().await.success_rate(), None);
}

#[tokio::test]
async fn generation_stops_at_count() {
    let bus = MemoryBus::new();
    let registry = MetricsRegistry::shared();
    let mut producer = producer(&bus, &registry);
    let plan = GeneratePlan::new(0, 25, None, false);

    let summary = run_generation(
        &producer,
        &mut EventGenerator::seeded(1),
        &plan,
        &CancellationToken::new(),
    )
    .await;
    let stats = producer.close().await;

    assert_eq!(summary.generated, 25);
    assert!(!summary.interrupted);
    assert_eq!(stats.sent, 25);
    assert_eq!(bus.records("logs").len(), 25);
}

#[tokio::test]
async fn unbounded_generation_ends_on_cancel() {
    let bus = MemoryBus::new();
    let registry = MetricsRegistry::shared();
    let producer = producer(&bus, &registry);
    let plan = GeneratePlan::new(1, 0, None, true);
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        })
    };
    let summary = run_generation(&producer, &mut EventGenerator::seeded(2), &plan, &token).await;
    canceller.await.unwrap();

    assert!(summary.interrupted);
    assert!(summary.generated > 0);
    assert_eq!(producer.sent(), summary.generated);
}

// ============================================================================
// Consumer
// ============================================================================

#[tokio::test]
async fn malformed_record_is_skipped_and_loop_keeps_running() {
    let bus = MemoryBus::new();
    let registry = MetricsRegistry::shared();
    let sink = Arc::new(CollectingSink::new());
    let mut consumer = consumer(&bus, &sink, &registry);
    let handle = consumer.handle();
    let run = tokio::spawn(async move { consumer.consume().await });

    let publisher = bus.publisher().unwrap();
    publisher
        .publish("logs", None, b"{not json".to_vec())
        .await
        .unwrap();
    publisher
        .publish("logs", Some("log-123"), payment_event().encode().unwrap())
        .await
        .unwrap();

    wait_until(|| handle.consumed() == 1).await;
    assert_eq!(handle.failed(), 1);
    assert_eq!(handle.state(), ConsumerState::Polling);
    assert!(!run.is_finished());

    handle.stop();
    run.await.unwrap().unwrap();

    assert_eq!(handle.state(), ConsumerState::Closed);
    assert_eq!(sink.events()[0].event.id(), "log-123");
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.consumed_messages(), 1);
    assert_eq!(snapshot.error_count(), 1);
}

#[tokio::test]
async fn produced_events_arrive_in_partition_order() {
    let bus = MemoryBus::new();
    let registry = MetricsRegistry::shared();
    let producer = producer(&bus, &registry);
    for i in 0..20 {
        let event = LogEvent::new(format!("e-{i:02}"), Utc::now(), "INFO", "svc", "m");
        producer.send_sync(&event).await.unwrap();
    }

    let sink = Arc::new(CollectingSink::new());
    let mut consumer = consumer(&bus, &sink, &registry);
    let handle = consumer.handle();
    let run = tokio::spawn(async move { consumer.consume().await });
    wait_until(|| handle.consumed() == 20).await;
    handle.stop();
    run.await.unwrap().unwrap();

    let offsets: Vec<i64> = sink.events().iter().map(|c| c.offset).collect();
    assert_eq!(offsets, (0..20).collect::<Vec<_>>());
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.produced_messages(), 20);
    assert_eq!(snapshot.consumed_messages(), 20);
}

#[tokio::test]
async fn stop_is_idempotent_while_running() {
    let bus = MemoryBus::new();
    let sink = Arc::new(CollectingSink::new());
    let mut consumer = consumer(&bus, &sink, &MetricsRegistry::shared());
    let token = consumer.stop_token();
    let run = tokio::spawn(async move { consumer.consume().await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    token.cancel();
    token.cancel();
    run.await.unwrap().unwrap();
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn unreachable_bus_counts_poll_errors_until_stopped() {
    let bus = MemoryBus::new();
    let registry = MetricsRegistry::shared();
    let sink = Arc::new(CollectingSink::new());
    let mut consumer = consumer(&bus, &sink, &registry);
    let handle = consumer.handle();
    bus.set_reachable(false);
    let run = tokio::spawn(async move { consumer.consume().await });

    wait_until(|| registry.snapshot().error_count() >= 2).await;
    handle.stop();
    run.await.unwrap().unwrap();
    assert_eq!(handle.consumed(), 0);
    assert!(sink.is_empty());
}
