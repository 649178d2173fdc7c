//! Scheduler counters and the metrics snapshot carried by every event.

use serde::{Deserialize, Serialize};

/// Point-in-time view of the scheduler's counters.
///
/// Always taken under the scheduler lock, so the fields are mutually
/// consistent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Jobs queued and not yet started.
    pub pending: usize,
    /// Jobs currently occupying a slot.
    pub running: usize,
    /// Jobs that reached a terminal state (success or failure).
    pub completed: u64,
    /// Jobs that failed.
    pub errors: u64,
}

impl MetricsSnapshot {
    /// Jobs that settled with a value.
    #[must_use]
    pub const fn succeeded(&self) -> u64 {
        self.completed.saturating_sub(self.errors)
    }

    /// No job is pending or running.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.pending == 0 && self.running == 0
    }
}

/// Counters mutated only under the scheduler lock.
#[derive(Debug, Default)]
pub(crate) struct JobCounters {
    pub running: usize,
    pub completed: u64,
    pub errors: u64,
}

impl JobCounters {
    pub(crate) const fn snapshot(&self, pending: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            pending,
            running: self.running,
            completed: self.completed,
            errors: self.errors,
        }
    }
}
