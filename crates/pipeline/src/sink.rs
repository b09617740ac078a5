//! Where consumed events end up.

use chrono::Local;
use parking_lot::Mutex;

use crate::event::LogEvent;

/// Receives every decoded event and the periodic statistics of a
/// [`MessageConsumer`](crate::MessageConsumer).
pub trait EventSink: Send + Sync {
    /// One decoded event and its position on the bus.
    fn on_event(&self, event: &LogEvent, partition: i32, offset: i64);

    /// Running totals, reported every N consumed events.
    fn on_stats(&self, consumed: u64, failed: u64) {
        let _ = (consumed, failed);
    }
}

/// Prints one line per event to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl ConsoleSink {
    /// `[10:15:30.123] api-gateway          INFO    request served (p:0, o:42)`
    ///
    /// The time is shown in the local timezone.
    pub fn format_line(event: &LogEvent, partition: i32, offset: i64) -> String {
        format!(
            "[{}] {:<20} {:<7} {} (p:{partition}, o:{offset})",
            event.timestamp().with_timezone(&Local).format("%H:%M:%S%.3f"),
            event.service(),
            event.level(),
            event.message(),
        )
    }
}

impl EventSink for ConsoleSink {
    fn on_event(&self, event: &LogEvent, partition: i32, offset: i64) {
        println!("{}", Self::format_line(event, partition, offset));
    }

    fn on_stats(&self, consumed: u64, failed: u64) {
        println!("Statistics: consumed {consumed}, failed {failed}");
    }
}

/// A consumed event with its bus position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedEvent {
    /// Decoded event
    pub event: LogEvent,
    /// Source partition
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<CollectedEvent>>,
    stats: Mutex<Vec<(u64, u64)>>,
}

impl CollectingSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, in arrival order.
    pub fn events(&self) -> Vec<CollectedEvent> {
        self.events.lock().clone()
    }

    /// Number of collected events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// `(consumed, failed)` pairs passed to [`EventSink::on_stats`].
    pub fn stats_reports(&self) -> Vec<(u64, u64)> {
        self.stats.lock().clone()
    }
}

impl EventSink for CollectingSink {
    fn on_event(&self, event: &LogEvent, partition: i32, offset: i64) {
        self.events.lock().push(CollectedEvent {
            event: event.clone(),
            partition,
            offset,
        });
    }

    fn on_stats(&self, consumed: u64, failed: u64) {
        self.stats.lock().push((consumed, failed));
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn console_line_pads_service_and_level() {
        let event = LogEvent::new("1", Utc::now(), "INFO", "database", "Database query proceeded");
        let line = ConsoleSink::format_line(&event, 2, 41);

        assert!(line.starts_with('['));
        let expected = format!("] {:<20} {:<7} Database query proceeded", "database", "INFO");
        assert!(line.contains(&expected));
        assert!(line.contains(&format!("database{}INFO", " ".repeat(13))));
        assert!(line.ends_with("(p:2, o:41)"));
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let sink = CollectingSink::new();
        let first = LogEvent::new("1", Utc::now(), "INFO", "s", "m");
        let second = LogEvent::new("2", Utc::now(), "WARN", "s", "m");
        sink.on_event(&first, 0, 0);
        sink.on_event(&second, 0, 1);
        sink.on_stats(2, 0);

        let ids: Vec<_> = sink.events().into_iter().map(|c| c.event.id().to_string()).collect();
        assert_eq!(ids, ["1", "2"]);
        assert_eq!(sink.stats_reports(), vec![(2, 0)]);
    }
}
