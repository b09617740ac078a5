//! Error types for bus operations
use std::time::Duration;

use thiserror::Error;

/// Result type for bus operations
pub type BusResult<T> = std::result::Result<T, BusError>;

/// Errors surfaced by a [`MessageBus`](crate::MessageBus) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus cannot be reached at all
    #[error("Cannot reach message bus at '{endpoint}': {reason}")]
    Connectivity {
        /// Bootstrap address that was tried
        endpoint: String,
        /// Underlying failure
        reason: String,
    },

    /// An operation did not complete in time
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out
        operation: String,
        /// The timeout in milliseconds
        timeout_ms: u64,
    },

    /// The bus refused a publish
    #[error("Publish to '{topic}' rejected: {reason}")]
    Rejected {
        /// Destination topic
        topic: String,
        /// Rejection reason
        reason: String,
    },

    /// The topic does not exist
    #[error("Unknown topic '{0}'")]
    UnknownTopic(String),

    /// The topic already exists
    #[error("Topic '{0}' already exists")]
    TopicExists(String),

    /// Topic creation parameters are invalid
    #[error("Invalid topic '{name}': {reason}")]
    InvalidTopic {
        /// Topic name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// The subscriber has not subscribed to a topic yet
    #[error("Subscriber is not subscribed to any topic")]
    NotSubscribed,

    /// Seek requested for a partition that is not assigned
    #[error("Partition {0} is not assigned to this subscriber")]
    NotAssigned(i32),

    /// The handle was closed
    #[error("Bus handle is closed")]
    Closed,

    /// The requested bus kind is not compiled in
    #[error("Unsupported bus: {0}")]
    Unsupported(String),

    /// Any other client-side failure
    #[error("Bus client error: {0}")]
    Client(String),
}

impl BusError {
    /// Build a [`BusError::Timeout`] from a [`Duration`].
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether the bus itself is unreachable, as opposed to an operation
    /// failing on a reachable bus.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_carries_millis() {
        let err = BusError::timeout("list_topics", Duration::from_secs(5));
        assert_eq!(
            err.to_string(),
            "Operation 'list_topics' timed out after 5000ms"
        );
        assert!(err.is_connectivity());
    }

    #[test]
    fn unknown_topic_is_not_connectivity() {
        assert!(!BusError::UnknownTopic("logs".into()).is_connectivity());
    }
}
