//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::job::JobId;

/// Errors produced by the scheduler itself.
///
/// Individual job failures are not errors of the scheduler; they are reported
/// as [`JobFailure`](crate::core::JobFailure) through the error handler and
/// the event surface.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// `throw_on_error` is set and at least one job failed.
    #[error("aborted due to error: {errors} job(s) failed")]
    BatchAborted {
        /// Failures recorded when the batch was aborted.
        errors: u64,
    },
    /// The configured error handler itself failed. Only ever logged.
    #[error("error handler failed for job {job_id}: {reason}")]
    HandlerFailed {
        /// Job whose failure was being handled.
        job_id: JobId,
        /// What the handler returned or panicked with.
        reason: String,
    },
    /// No async runtime available to run jobs on.
    #[error("runtime unavailable: {0}")]
    Runtime(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
