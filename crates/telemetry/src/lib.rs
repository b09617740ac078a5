#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # logpipe Telemetry
//!
//! Process-wide counters for the log pipeline.
//!
//! This crate provides:
//! - [`Counter`] -- a cloneable handle to an atomic counter
//! - [`MetricsRegistry`] -- produced/consumed/error/retry/latency accounting
//! - [`MetricsSnapshot`] -- an immutable read of the registry with derived rates
//!
//! The registry is created once and shared as `Arc<MetricsRegistry>` with
//! every component that reports into it. All writes are single atomic
//! operations, so snapshots are not transactionally consistent across
//! counters.

pub mod metrics;
pub mod snapshot;

pub use metrics::{Counter, MetricsRegistry};
pub use snapshot::MetricsSnapshot;
