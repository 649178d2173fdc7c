//! Tests for error types

use prometheus_concurrency::core::{JobFailure, SchedulerError};

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("concurrency_limit must be greater than 0".into());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: concurrency_limit must be greater than 0"
    );
}

#[test]
fn test_batch_aborted_error() {
    let err = SchedulerError::BatchAborted { errors: 3 };
    assert_eq!(format!("{}", err), "aborted due to error: 3 job(s) failed");
}

#[test]
fn test_handler_failed_error() {
    let err = SchedulerError::HandlerFailed {
        job_id: 4,
        reason: "sink offline".into(),
    };
    assert_eq!(
        format!("{}", err),
        "error handler failed for job 4: sink offline"
    );
}

#[test]
fn test_runtime_error() {
    let err = SchedulerError::Runtime("no reactor".into());
    assert_eq!(format!("{}", err), "runtime unavailable: no reactor");
}

#[test]
fn test_job_failure_is_std_error() {
    fn assert_error<E: std::error::Error + Send + Sync + 'static>() {}
    assert_error::<JobFailure>();
    assert_error::<SchedulerError>();
}
