//! Errors raised while installing the subscriber.

use thiserror::Error;

/// Result alias for logger setup.
pub type LogResult<T> = Result<T, LogError>;

/// Logger setup failure.
#[derive(Debug, Error)]
pub enum LogError {
    /// The level directive could not be parsed by `EnvFilter`.
    #[error("Invalid filter '{filter}': {reason}")]
    Filter {
        /// The directive as given
        filter: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber was already installed.
    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(String),
}
