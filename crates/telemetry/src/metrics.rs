//! Counter primitive and the pipeline metrics registry.
//!
//! Values are kept in-memory with atomics; there is no exporter. Readers
//! never block writers and writers never block each other.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::snapshot::MetricsSnapshot;

/// An incrementing counter.
///
/// Cloning yields another handle to the same value, so a counter can be
/// moved into a background task and still be read by its owner.
#[derive(Debug, Clone)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    /// Create a new counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by a given amount.
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Set back to zero.
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipeline-wide counters.
///
/// One instance is created at process start and shared as
/// `Arc<MetricsRegistry>`; producers, consumers and the reporting commands
/// all record into the same instance.
///
/// # Examples
///
/// ```
/// use logpipe_telemetry::MetricsRegistry;
///
/// let registry = MetricsRegistry::new();
/// registry.record_produced();
/// registry.record_produced_n(4);
/// registry.record_latency(12);
/// registry.record_latency(30);
///
/// let snapshot = registry.snapshot();
/// assert_eq!(snapshot.produced_messages(), 5);
/// assert_eq!(snapshot.max_latency_ms(), 30);
/// assert!((snapshot.average_latency_ms() - 21.0).abs() < f64::EPSILON);
/// ```
#[derive(Debug)]
pub struct MetricsRegistry {
    produced: Counter,
    consumed: Counter,
    errors: Counter,
    retries: Counter,
    latency_sum_ms: Counter,
    latency_count: Counter,
    latency_max_ms: AtomicU64,
    started_at: Instant,
}

impl MetricsRegistry {
    /// Create a registry with every counter at zero. Uptime starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            produced: Counter::new(),
            consumed: Counter::new(),
            errors: Counter::new(),
            retries: Counter::new(),
            latency_sum_ms: Counter::new(),
            latency_count: Counter::new(),
            latency_max_ms: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Create as an `Arc` for sharing across components.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Count one produced message.
    pub fn record_produced(&self) {
        self.produced.inc();
    }

    /// Count `n` produced messages.
    pub fn record_produced_n(&self, n: u64) {
        self.produced.inc_by(n);
    }

    /// Count one consumed message.
    pub fn record_consumed(&self) {
        self.consumed.inc();
    }

    /// Count `n` consumed messages.
    pub fn record_consumed_n(&self, n: u64) {
        self.consumed.inc_by(n);
    }

    /// Count one error.
    pub fn record_error(&self) {
        self.errors.inc();
    }

    /// Count one retry.
    pub fn record_retry(&self) {
        self.retries.inc();
    }

    /// Record one latency sample in milliseconds.
    ///
    /// The running maximum is raised with a compare-exchange loop: the new
    /// value is installed only while it exceeds the currently visible
    /// maximum, and a lost race re-reads and tries again, so the maximum is
    /// never under-reported.
    pub fn record_latency(&self, latency_ms: u64) {
        self.latency_sum_ms.inc_by(latency_ms);
        self.latency_count.inc();

        let mut current = self.latency_max_ms.load(Ordering::Relaxed);
        while latency_ms > current {
            match self.latency_max_ms.compare_exchange_weak(
                current,
                latency_ms,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// Record a latency sample from a [`Duration`], truncated to whole ms.
    pub fn record_latency_duration(&self, latency: Duration) {
        self.record_latency(u64::try_from(latency.as_millis()).unwrap_or(u64::MAX));
    }

    /// Time since the registry was created. Not affected by [`reset`](Self::reset).
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Build a snapshot from the current counter values.
    ///
    /// Uptime is floored to one second so rates are defined immediately
    /// after start. Average latency is `0.0` when no samples were recorded.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime_seconds = self.uptime().as_secs().max(1);

        let produced = self.produced.get();
        let consumed = self.consumed.get();
        let samples = self.latency_count.get();
        let average_latency_ms = if samples == 0 {
            0.0
        } else {
            self.latency_sum_ms.get() as f64 / samples as f64
        };

        MetricsSnapshot::new(
            produced,
            consumed,
            produced as f64 / uptime_seconds as f64,
            consumed as f64 / uptime_seconds as f64,
            self.errors.get(),
            self.retries.get(),
            average_latency_ms,
            self.latency_max_ms.load(Ordering::Relaxed),
            uptime_seconds,
        )
    }

    /// Zero every counter.
    ///
    /// Meant for test isolation and operator-triggered resets. A snapshot
    /// taken concurrently may see some counters already cleared and others
    /// not yet.
    pub fn reset(&self) {
        self.produced.reset();
        self.consumed.reset();
        self.errors.reset();
        self.retries.reset();
        self.latency_sum_ms.reset();
        self.latency_count.reset();
        self.latency_max_ms.store(0, Ordering::Relaxed);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
