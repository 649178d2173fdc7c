//! # Prometheus Concurrency
//!
//! A bounded-concurrency batch scheduler for async work items.
//!
//! Callers push zero-argument async computations onto a [`Scheduler`]. At
//! most `concurrency_limit` of them run at once; the rest wait in a FIFO
//! queue and are admitted as slots free up. Successful values are collected
//! in completion order, failures are contained per job, and every terminal
//! job produces exactly one "data" or "error" notification carrying a
//! [`MetricsSnapshot`].
//!
//! ## Key Features
//!
//! - **Slot-counter admission**: FIFO start order, never more than the limit in flight
//! - **Dual completion detection**: completions wake awaiters directly, and a
//!   poll tick re-runs admission as a safety net
//! - **Error policy**: tolerate failures by default, opt into aborting with
//!   `throw_on_error`, observe every failure through an error handler
//! - **Observability**: callback and channel subscriptions, job-state
//!   introspection, optional audit trail, `tracing` logs
//!
//! ## Scheduler
//!
//! ```rust,ignore
//! use prometheus_concurrency::{Scheduler, SchedulerConfig};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::new().with_concurrency_limit(10))?;
//! scheduler.on_data(|job_id, value: &u32, metrics| {
//!     tracing::info!(job_id, value, running = metrics.running, "job done");
//! });
//! for i in 0..100 {
//!     scheduler.push(move || async move { Ok(i) });
//! }
//! let results = scheduler.await_all().await?;
//! ```
//!
//! ## Convenience helpers
//!
//! ```rust,ignore
//! use prometheus_concurrency::{map_concurrently, SchedulerConfig};
//!
//! let doubled = map_concurrently(
//!     vec![1, 2, 3],
//!     |n, _index| async move { Ok(n * 2) },
//!     SchedulerConfig::new().with_concurrency_limit(2),
//! )
//! .await?;
//! assert_eq!(doubled, vec![2, 4, 6]);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Convenience entry points built on the scheduler.
pub mod batch;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Configuration models for the scheduler.
pub mod config;
/// Core scheduling abstractions and slot accounting.
pub mod core;
/// Runtime adapters for executing job futures.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::batch::{fulfill_all, map_concurrently};
pub use crate::builders::SchedulerBuilder;
pub use crate::config::SchedulerConfig;
pub use crate::core::{
    JobFailure, JobId, JobState, MetricsSnapshot, Scheduler, SchedulerError, SchedulerEvent,
};
pub use crate::runtime::TokioSpawner;
