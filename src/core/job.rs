//! Job representation and lifecycle state.

use std::any::Any;
use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;

/// Identifier assigned to a job when it is pushed, sequential per scheduler.
pub type JobId = u64;

/// Lifecycle state of a job.
///
/// Used for introspection only. Admission is driven by the scheduler's
/// counters, never by scanning job states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued, waiting for a free slot.
    Pending,
    /// Occupying a slot.
    Running,
    /// Settled with a value.
    Finished,
    /// Settled with an error.
    Failed,
}

impl JobState {
    /// Whether the job has settled and will never transition again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

type Computation<T> = Box<dyn FnOnce() -> BoxFuture<'static, AppResult<T>> + Send>;

/// One queued unit of work. The computation is consumed when the job runs.
pub(crate) struct Job<T> {
    id: JobId,
    computation: Computation<T>,
}

impl<T> Job<T> {
    pub(crate) fn new<F, Fut>(id: JobId, computation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: 'static,
    {
        Self {
            id,
            computation: Box::new(move || computation().boxed()),
        }
    }

    pub(crate) const fn id(&self) -> JobId {
        self.id
    }

    /// Invoke the computation. The closure is dropped once it returns its future.
    pub(crate) async fn run(self) -> AppResult<T> {
        (self.computation)().await
    }
}

impl<T> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish_non_exhaustive()
    }
}

/// A single job's computation failed (or panicked).
///
/// Shared behind an `Arc` between the error handler, error subscribers and
/// channel subscribers.
#[derive(Debug)]
pub struct JobFailure {
    /// The job that failed.
    pub job_id: JobId,
    /// The error the computation produced.
    pub error: anyhow::Error,
}

impl JobFailure {
    pub(crate) const fn new(job_id: JobId, error: anyhow::Error) -> Self {
        Self { job_id, error }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job {} failed: {}", self.job_id, self.error)
    }
}

impl std::error::Error for JobFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let source: &(dyn std::error::Error + 'static) = self.error.as_ref();
        Some(source)
    }
}

/// Best-effort message extraction from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
