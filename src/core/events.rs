//! Observer surface for per-job "data" and "error" notifications.
//!
//! Subscribers register callbacks per event kind. Notifications are queued in
//! completion order under the scheduler lock and delivered later, outside the
//! lock, by whichever completing task currently owns the outbox. This gives
//! exactly-once, in-order delivery while letting callbacks call back into the
//! scheduler.

use std::sync::Arc;

use crate::core::job::{JobFailure, JobId};
use crate::core::stats::MetricsSnapshot;

/// Handle returned when registering a callback, used to unsubscribe.
pub type SubscriptionId = u64;

pub(crate) type DataCallback<T> = Arc<dyn Fn(JobId, &T, &MetricsSnapshot) + Send + Sync>;
pub(crate) type ErrorCallback = Arc<dyn Fn(&Arc<JobFailure>, &MetricsSnapshot) + Send + Sync>;

/// Event delivered to channel subscribers.
#[derive(Debug, Clone)]
pub enum SchedulerEvent<T> {
    /// A job settled with a value.
    Data {
        /// The job that produced the value.
        job_id: JobId,
        /// The produced value.
        value: T,
        /// Counters right after the job settled.
        metrics: MetricsSnapshot,
    },
    /// A job failed.
    Error {
        /// The failure, shared with the error handler and other subscribers.
        failure: Arc<JobFailure>,
        /// Counters right after the job settled.
        metrics: MetricsSnapshot,
    },
}

impl<T> SchedulerEvent<T> {
    /// Metrics snapshot attached to the event.
    pub const fn metrics(&self) -> &MetricsSnapshot {
        match self {
            Self::Data { metrics, .. } | Self::Error { metrics, .. } => metrics,
        }
    }
}

/// Queued notification awaiting delivery.
pub(crate) enum Notification<T> {
    Data {
        job_id: JobId,
        value: T,
        metrics: MetricsSnapshot,
    },
    Failure {
        failure: Arc<JobFailure>,
        metrics: MetricsSnapshot,
    },
}

/// Registered callbacks, per event kind, in registration order.
pub(crate) struct Subscribers<T> {
    next_id: SubscriptionId,
    data: Vec<(SubscriptionId, DataCallback<T>)>,
    error: Vec<(SubscriptionId, ErrorCallback)>,
}

impl<T> Subscribers<T> {
    pub(crate) const fn new() -> Self {
        Self {
            next_id: 0,
            data: Vec::new(),
            error: Vec::new(),
        }
    }

    const fn allocate(&mut self) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn add_data(&mut self, callback: DataCallback<T>) -> SubscriptionId {
        let id = self.allocate();
        self.data.push((id, callback));
        id
    }

    pub(crate) fn add_error(&mut self, callback: ErrorCallback) -> SubscriptionId {
        let id = self.allocate();
        self.error.push((id, callback));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.data.len() + self.error.len();
        self.data.retain(|(sub, _)| *sub != id);
        self.error.retain(|(sub, _)| *sub != id);
        before != self.data.len() + self.error.len()
    }

    pub(crate) fn data_callbacks(&self) -> Vec<DataCallback<T>> {
        self.data.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }

    pub(crate) fn error_callbacks(&self) -> Vec<ErrorCallback> {
        self.error.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.data.len() + self.error.len()
    }
}
