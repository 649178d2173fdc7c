//! Audit trail of job lifecycle transitions.
//!
//! A sink attached to a scheduler receives one event per transition
//! (`push`, `start`, `finish`, `fail`), recorded under the scheduler lock so
//! the trail order matches the order of state changes.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::job::JobId;
use crate::util::clock::now_ms;

/// Lifecycle transition recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Job appended to the queue.
    Push,
    /// Job admitted into a slot.
    Start,
    /// Job settled with a value.
    Finish,
    /// Job settled with an error.
    Fail,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Push => "push",
            Self::Start => "start",
            Self::Finish => "finish",
            Self::Fail => "fail",
        };
        f.write_str(name)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier, unique within a batch.
    pub event_id: String,
    /// Scheduler instance that owns the job.
    pub batch: String,
    /// Job the transition applies to.
    pub job_id: JobId,
    /// Transition taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context (error text for failures).
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Sink that forwards every event into a shared buffer, so callers can keep
/// reading after handing the sink to a scheduler.
#[derive(Clone, Default)]
pub struct SharedAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl SharedAuditSink {
    /// Create an empty shared sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for SharedAuditSink {
    fn record(&mut self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    batch: impl fmt::Display,
    job_id: JobId,
    action: AuditAction,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        event_id: format!("{batch}-{job_id}-{action}"),
        batch: batch.to_string(),
        job_id,
        action,
        created_at_ms: now_ms(),
        detail,
    }
}
