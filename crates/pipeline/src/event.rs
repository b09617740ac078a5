//! The log event carried over the bus and its JSON wire format.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// A single synthetic log line.
///
/// Timestamps are kept at millisecond precision: every constructor and
/// [`with_timestamp`](Self::with_timestamp) drop anything below a
/// millisecond, so an event survives a JSON round trip unchanged and
/// equality (and hashing) never trips over nanoseconds the wire cannot
/// carry.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use logpipe_pipeline::LogEvent;
///
/// let event = LogEvent::new("log-1", Utc::now(), "INFO", "api-gateway", "request served")
///     .with_user_id("user-7")
///     .with_duration_ms(12);
///
/// let decoded = LogEvent::decode(&event.encode().unwrap()).unwrap();
/// assert_eq!(decoded, event);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogEvent {
    id: String,
    #[serde(with = "wire_timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    level: String,
    #[serde(default)]
    service: String,
    #[serde(default)]
    message: String,
    #[serde(rename = "userID", default)]
    user_id: Option<String>,
    #[serde(rename = "ipAddr", default)]
    ip_addr: Option<String>,
    #[serde(rename = "durationMS", default)]
    duration_ms: u32,
}

impl LogEvent {
    /// Event with the required fields; optional fields start empty.
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        level: impl Into<String>,
        service: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp: timestamp.trunc_subsecs(3),
            level: level.into(),
            service: service.into(),
            message: message.into(),
            user_id: None,
            ip_addr: None,
            duration_ms: 0,
        }
    }

    /// Like [`new`](Self::new) but rejects an empty `id` or `level`.
    pub fn validated(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        level: impl Into<String>,
        service: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self, EventError> {
        let event = Self::new(id, timestamp, level, service, message);
        if event.id.trim().is_empty() {
            return Err(EventError::InvalidField {
                field: "id",
                reason: "must not be empty".to_string(),
            });
        }
        if event.level.trim().is_empty() {
            return Err(EventError::InvalidField {
                field: "level",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(event)
    }

    /// Set the user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the client address.
    pub fn with_ip_addr(mut self, ip_addr: impl Into<String>) -> Self {
        self.ip_addr = Some(ip_addr.into());
        self
    }

    /// Set the request duration.
    pub fn with_duration_ms(mut self, duration_ms: u32) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Replace the timestamp, truncated to milliseconds.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(3);
        self
    }

    /// Unique event id, also the record key.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Event time, millisecond precision.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Severity label.
    pub fn level(&self) -> &str {
        &self.level
    }

    /// Emitting service.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Log line.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// User the event concerns, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Client address, if any.
    pub fn ip_addr(&self) -> Option<&str> {
        self.ip_addr.as_deref()
    }

    /// Request duration in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    /// Encode as a JSON object.
    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a JSON object. Unknown fields are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// `2024-05-01T10:15:30.123Z`
///
/// Years outside `0000..=9999` are written with a sign (`+10000-...`), which
/// RFC 3339 cannot express, so decoding falls back to the encoding format.
mod wire_timestamp {
    use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
    const PARSE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .or_else(|rfc_err| {
                NaiveDateTime::parse_from_str(&raw, PARSE_FORMAT)
                    .map(|naive| naive.and_utc())
                    .map_err(|_| rfc_err)
            })
            .map(|ts| ts.trunc_subsecs(3))
            .map_err(|e| de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
    }
}
