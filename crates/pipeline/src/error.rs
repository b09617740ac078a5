//! Error types for the event pipeline

use logpipe_bus::BusError;
use thiserror::Error;

/// Errors building or encoding a [`LogEvent`](crate::LogEvent).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A required field is missing or malformed
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EventError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Errors returned by [`MessageProducer`](crate::MessageProducer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProducerError {
    /// The event could not be encoded; the bus was not contacted
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] EventError),

    /// The bus client could not hand out a publisher; nothing was sent
    #[error("Producer client unavailable: {0}")]
    Client(BusError),

    /// The bus rejected the publish or did not acknowledge it in time
    #[error("Delivery to '{topic}' failed: {source}")]
    Delivery {
        /// Destination topic
        topic: String,
        /// Underlying bus failure
        source: BusError,
    },

    /// Client-side buffers could not be flushed
    #[error("Flush failed: {0}")]
    Flush(BusError),

    /// The send was abandoned because shutdown was requested
    #[error("Send interrupted by shutdown")]
    Interrupted,

    /// The producer was already closed
    #[error("Producer is closed")]
    Closed,
}

/// Errors returned by [`MessageConsumer`](crate::MessageConsumer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// Subscribing or positioning the subscription failed
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Shutdown was requested before the poll loop started
    #[error("Consumption interrupted by shutdown")]
    Interrupted,

    /// The consumer was already closed
    #[error("Consumer is closed")]
    Closed,
}

/// Result type for producer operations
pub type ProducerResult<T> = std::result::Result<T, ProducerError>;

/// Result type for consumer operations
pub type ConsumerResult<T> = std::result::Result<T, ConsumerError>;
