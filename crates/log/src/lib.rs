//! # logpipe Log
//!
//! Logging setup shared by the logpipe binaries.
//!
//! ```no_run
//! use logpipe_log::{Config, LoggerBuilder};
//!
//! let _guard = LoggerBuilder::from_config(Config::from_env()).build()?;
//! tracing::info!(topic = "my-logs", "producer ready");
//! # Ok::<(), logpipe_log::LogError>(())
//! ```
//!
//! Library crates only emit through `tracing`; installing the subscriber is
//! left to the binary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
mod error;
mod format;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format, WriterConfig};
pub use error::{LogError, LogResult};

/// Initialize logging from `LOGPIPE_LOG` / `RUST_LOG` / `LOGPIPE_LOG_FORMAT`.
pub fn init_from_env() -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(Config::from_env()).build()
}
