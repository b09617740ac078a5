//! # logpipe-pipeline
//!
//! The event side of logpipe:
//!
//! - [`LogEvent`] and its JSON wire format;
//! - [`MessageProducer`], synchronous or background delivery with counters;
//! - [`MessageConsumer`], a cancellable poll loop feeding an [`EventSink`];
//! - [`EventGenerator`] and [`run_generation`] for synthetic traffic.
//!
//! All of them report into a shared
//! [`MetricsRegistry`](logpipe_telemetry::MetricsRegistry).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod consumer;
mod error;
mod event;
mod generator;
mod producer;
mod sink;

pub use consumer::{ConsumerHandle, ConsumerOptions, ConsumerState, MessageConsumer};
pub use error::{ConsumerError, ConsumerResult, EventError, ProducerError, ProducerResult};
pub use event::LogEvent;
pub use generator::{
    EventGenerator, GeneratePlan, GenerateSummary, LEVELS, MESSAGES, SERVICES, run_generation,
};
pub use producer::{MessageProducer, ProducerStats};
pub use sink::{CollectedEvent, CollectingSink, ConsoleSink, EventSink};
