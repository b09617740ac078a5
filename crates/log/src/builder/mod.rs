//! Logger builder implementation

#[macro_use]
mod format;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format, WriterConfig};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard returned by [`LoggerBuilder::build`].
///
/// Keep it alive for the lifetime of the program; it records the
/// configuration that was installed.
#[derive(Debug)]
pub struct LoggerGuard {
    config: Config,
}

impl LoggerGuard {
    /// The configuration the subscriber was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Install the subscriber for a given fmt layer.
macro_rules! init_subscriber {
    ($filter:expr, $fmt_layer:expr) => {{
        Registry::default()
            .with($filter)
            .with($fmt_layer)
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;
    }};
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Validate the filter directive without installing anything.
    pub fn filter(&self) -> LogResult<EnvFilter> {
        EnvFilter::try_new(&self.config.level).map_err(|e| LogError::Filter {
            filter: self.config.level.clone(),
            reason: e.to_string(),
        })
    }

    /// Build and install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Filter string cannot be parsed
    /// - A global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = self.filter()?;
        let writer = make_writer(self.config.writer);
        let display = &self.config.display;

        match self.config.format {
            Format::Pretty => {
                let fmt_layer = create_fmt_layer!(pretty, display, writer);
                init_subscriber!(filter, fmt_layer);
            }
            Format::Compact => {
                let fmt_layer = create_fmt_layer!(compact, display, writer);
                init_subscriber!(filter, fmt_layer);
            }
            Format::Json => {
                let fmt_layer = create_json_layer!(display, writer);
                init_subscriber!(filter, fmt_layer);
            }
        }

        Ok(LoggerGuard {
            config: self.config,
        })
    }
}

fn make_writer(writer: WriterConfig) -> BoxMakeWriter {
    match writer {
        WriterConfig::Stderr => BoxMakeWriter::new(std::io::stderr),
        WriterConfig::Stdout => BoxMakeWriter::new(std::io::stdout),
    }
}
