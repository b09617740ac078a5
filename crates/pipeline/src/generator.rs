//! Synthetic events and the loop that publishes them at a steady pace.

use std::time::Duration;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ProducerError;
use crate::event::LogEvent;
use crate::producer::MessageProducer;

/// Severity labels drawn by the generator.
pub const LEVELS: &[&str] = &["INFO", "WARN", "ERROR", "DEBUG"];

/// Service names drawn by the generator.
pub const SERVICES: &[&str] = &[
    "payment-service",
    "fraud-service",
    "mail-service",
    "api-gateway",
    "database",
    "auth-service",
    "notification-service",
    "cache-service",
];

/// Log lines drawn by the generator.
pub const MESSAGES: &[&str] = &[
    "Payment success",
    "User logged in successfully",
    "Unauthorized request",
    "Connection pool exhausted",
    "Email sent successfully",
    "User notified",
    "Database query proceeded",
    "High memory usage detected",
];

/// Produces random but plausible [`LogEvent`]s.
#[derive(Debug)]
pub struct EventGenerator<R = StdRng> {
    rng: R,
}

impl EventGenerator<StdRng> {
    /// Generator seeded from the OS.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator, for tests and reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for EventGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> EventGenerator<R> {
    /// Generator over a caller-supplied RNG.
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// A fresh event stamped now with a v4 UUID.
    pub fn next_event(&mut self) -> LogEvent {
        let level = pick(&mut self.rng, LEVELS);
        let service = pick(&mut self.rng, SERVICES);
        let message = pick(&mut self.rng, MESSAGES);
        let user: u32 = self.rng.random_range(0..100);
        let ip = self.random_ip();
        let duration_ms = self.rng.random_range(0..3600);

        LogEvent::new(Uuid::new_v4().to_string(), Utc::now(), level, service, message)
            .with_user_id(format!("user-{user}"))
            .with_ip_addr(ip)
            .with_duration_ms(duration_ms)
    }

    /// Address in `192.168.0.0/16` with both octets below 255.
    pub fn random_ip(&mut self) -> String {
        let a: u8 = self.rng.random_range(0..255);
        let b: u8 = self.rng.random_range(0..255);
        format!("192.168.{a}.{b}")
    }
}

fn pick<R: Rng>(rng: &mut R, items: &[&'static str]) -> &'static str {
    items.choose(rng).copied().unwrap_or_default()
}

/// How many events to publish, how fast and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratePlan {
    /// Pause after each event
    pub interval: Duration,
    /// Events to publish, 0 for unbounded
    pub count: u64,
    /// Wait for each acknowledgment instead of sending in the background
    pub sync: bool,
}

impl GeneratePlan {
    /// A positive `rate` (events per second) replaces `interval_ms` with
    /// `1000 / rate` milliseconds.
    pub fn new(interval_ms: u64, count: u64, rate: Option<u32>, sync: bool) -> Self {
        let interval_ms = match rate {
            Some(rate) if rate > 0 => 1000 / u64::from(rate),
            _ => interval_ms,
        };
        Self {
            interval: Duration::from_millis(interval_ms),
            count,
            sync,
        }
    }

    fn is_done(&self, generated: u64) -> bool {
        self.count != 0 && generated >= self.count
    }
}

/// Outcome of [`run_generation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerateSummary {
    /// Events handed to the producer
    pub generated: u64,
    /// Events that could not be handed over or were rejected synchronously
    pub rejected: u64,
    /// Whether the run ended because of `token`
    pub interrupted: bool,
}

/// Publish generated events according to `plan` until the count is reached
/// or `token` is cancelled.
///
/// Individual send failures are logged and the run continues. A closed
/// producer ends the run. The caller is expected to
/// [`close`](MessageProducer::close) the producer afterwards.
pub async fn run_generation<R: Rng>(
    producer: &MessageProducer,
    generator: &mut EventGenerator<R>,
    plan: &GeneratePlan,
    token: &CancellationToken,
) -> GenerateSummary {
    let mut summary = GenerateSummary::default();

    while !plan.is_done(summary.generated) {
        if token.is_cancelled() {
            summary.interrupted = true;
            break;
        }

        let event = generator.next_event();
        let outcome = if plan.sync {
            producer.send_sync(&event).await.map(|_| ())
        } else {
            producer.send_async(&event)
        };

        match outcome {
            Ok(()) => {
                summary.generated += 1;
                if summary.generated % 10 == 0 {
                    tracing::info!(generated = summary.generated, "generating");
                }
            }
            Err(ProducerError::Interrupted) => {
                summary.interrupted = true;
                break;
            }
            Err(ProducerError::Closed) => {
                summary.rejected += 1;
                tracing::warn!(topic = producer.topic(), "producer closed, stopping generation");
                break;
            }
            Err(error) => {
                summary.rejected += 1;
                tracing::warn!(id = event.id(), %error, "failed to send event");
            }
        }

        if !plan.interval.is_zero() && !plan.is_done(summary.generated) {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(plan.interval) => {}
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1000, None, 1000)]
    #[case(1000, Some(0), 1000)]
    #[case(1000, Some(4), 250)]
    #[case(50, Some(3), 333)]
    #[case(0, Some(2000), 0)]
    fn rate_overrides_interval(#[case] interval_ms: u64, #[case] rate: Option<u32>, #[case] expected_ms: u64) {
        let plan = GeneratePlan::new(interval_ms, 0, rate, false);
        assert_eq!(plan.interval, Duration::from_millis(expected_ms));
    }

    #[test]
    fn events_draw_from_catalogs() {
        let mut generator = EventGenerator::seeded(7);
        for _ in 0..200 {
            let event = generator.next_event();
            assert!(LEVELS.contains(&event.level()));
            assert!(SERVICES.contains(&event.service()));
            assert!(MESSAGES.contains(&event.message()));
            assert!(event.duration_ms() < 3600);

            let user: u32 = event.user_id().unwrap().strip_prefix("user-").unwrap().parse().unwrap();
            assert!(user < 100);

            let ip = event.ip_addr().unwrap();
            let octets: Vec<u8> = ip.split('.').map(|o| o.parse().unwrap()).collect();
            assert_eq!(&octets[..2], &[192, 168]);
            assert!(octets[2] < 255 && octets[3] < 255);
        }
    }

    #[test]
    fn every_service_is_reachable() {
        let mut generator = EventGenerator::seeded(11);
        let seen: std::collections::HashSet<String> =
            (0..2_000).map(|_| generator.next_event().service().to_string()).collect();
        assert_eq!(seen.len(), SERVICES.len());
    }

    #[test]
    fn ids_are_unique() {
        let mut generator = EventGenerator::seeded(3);
        let a = generator.next_event();
        let b = generator.next_event();
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn closed_producer_ends_an_unbounded_run() {
        let bus = logpipe_bus::MemoryBus::new();
        let mut producer = MessageProducer::new(
            &bus,
            "logs",
            &logpipe_bus::BusSettings::new("memory://generator"),
            logpipe_telemetry::MetricsRegistry::shared(),
        )
        .unwrap();
        producer.close().await;

        let plan = GeneratePlan::new(0, 0, None, false);
        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            run_generation(&producer, &mut EventGenerator::seeded(1), &plan, &CancellationToken::new()),
        )
        .await
        .expect("run must end on a closed producer");

        assert_eq!(
            summary,
            GenerateSummary {
                generated: 0,
                rejected: 1,
                interrupted: false,
            }
        );
    }
}
