//! Core scheduling abstractions: jobs, slot accounting, events and errors.

pub mod audit;
pub mod error;
pub mod events;
pub mod job;
pub mod scheduler;
pub mod stats;

pub use audit::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, SharedAuditSink,
};
pub use error::{AppResult, SchedulerError};
pub use events::{SchedulerEvent, SubscriptionId};
pub use job::{JobFailure, JobId, JobState};
pub use scheduler::{ErrorHandler, Scheduler, Spawn};
pub use stats::MetricsSnapshot;
