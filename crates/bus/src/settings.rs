//! Client settings shared by every bus implementation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Address prefix selecting the in-process [`MemoryBus`](crate::MemoryBus).
pub const MEMORY_SCHEME: &str = "memory://";

/// Bus client settings.
///
/// Durations are stored in milliseconds so the struct maps directly onto
/// configuration files and environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Bootstrap addresses (comma-separated) or `memory://<name>`
    pub bootstrap_servers: String,
    /// Client ID for identification
    pub client_id: String,
    /// Number of acknowledgments the producer requires
    pub acks: AckPolicy,
    /// Compression codec
    pub compression: CompressionType,
    /// Upper bound for a single acknowledged publish
    pub delivery_timeout_ms: u64,
    /// Time to wait for batching
    pub linger_ms: u64,
    /// Batch size in bytes
    pub batch_size: usize,
    /// Where a group without committed offsets starts reading
    pub offset_reset: OffsetReset,
    /// Auto-commit interval
    pub auto_commit_interval_ms: u64,
    /// Consumer session timeout
    pub session_timeout_ms: u64,
    /// Upper bound on records returned by one poll
    pub max_poll_records: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9095".to_string(),
            client_id: "logpipe".to_string(),
            acks: AckPolicy::All,
            compression: CompressionType::Snappy,
            delivery_timeout_ms: 30_000,
            linger_ms: 10,
            batch_size: 16_384,
            offset_reset: OffsetReset::Earliest,
            auto_commit_interval_ms: 1_000,
            session_timeout_ms: 30_000,
            max_poll_records: 100,
        }
    }
}

impl BusSettings {
    /// Settings pointing at the given bootstrap address.
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            ..Self::default()
        }
    }

    /// Whether the address selects the in-process bus.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.bootstrap_servers.starts_with(MEMORY_SCHEME)
    }

    /// Delivery timeout as a [`Duration`].
    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Auto-commit interval as a [`Duration`].
    #[must_use]
    pub fn auto_commit_interval(&self) -> Duration {
        Duration::from_millis(self.auto_commit_interval_ms)
    }
}

/// Compression type for published records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    /// No compression
    None,
    /// Gzip compression
    Gzip,
    /// Snappy compression
    Snappy,
    /// LZ4 compression
    Lz4,
    /// Zstd compression
    Zstd,
}

impl CompressionType {
    /// Client configuration value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Snappy => "snappy",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }
}

/// Acknowledgment policy for producers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckPolicy {
    /// No acknowledgment required
    None,
    /// Leader acknowledgment only
    Leader,
    /// All in-sync replicas must acknowledge
    All,
}

impl AckPolicy {
    /// Client configuration value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "0",
            Self::Leader => "1",
            Self::All => "all",
        }
    }
}

/// Offset reset strategy for subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// Start from the earliest available offset
    Earliest,
    /// Start from the end of the partition
    Latest,
}

impl OffsetReset {
    /// Client configuration value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earliest => "earliest",
            Self::Latest => "latest",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_scheme_detection() {
        assert!(BusSettings::new("memory://local").is_memory());
        assert!(!BusSettings::default().is_memory());
    }

    #[test]
    fn defaults_match_producer_expectations() {
        let settings = BusSettings::default();
        assert_eq!(settings.acks.as_str(), "all");
        assert_eq!(settings.compression.as_str(), "snappy");
        assert_eq!(settings.auto_commit_interval(), Duration::from_secs(1));
        assert_eq!(settings.max_poll_records, 100);
    }
}
