//! Tests for audit sinks

use prometheus_concurrency::core::{
    build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, SharedAuditSink,
};
use prometheus_concurrency::{MetricsSnapshot, Scheduler, SchedulerBuilder, SchedulerConfig};
use std::sync::{Arc, OnceLock};

/// Sink that reads the scheduler it is attached to on every event.
struct MetricsReadingSink {
    scheduler: Arc<OnceLock<Scheduler<u8>>>,
    seen: Arc<parking_lot::Mutex<Vec<(AuditAction, MetricsSnapshot)>>>,
}

impl AuditSink for MetricsReadingSink {
    fn record(&mut self, event: AuditEvent) {
        if let Some(scheduler) = self.scheduler.get() {
            self.seen.lock().push((event.action, scheduler.metrics()));
        }
    }
}

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event("batch1", 1, AuditAction::Fail, Some("boom".to_string()));

    sink.record(event);
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].event_id, "batch1-1-fail");
    assert_eq!(events[0].job_id, 1);
    assert_eq!(events[0].action, AuditAction::Fail);
    assert_eq!(events[0].detail.as_deref(), Some("boom"));
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event("b", 1, AuditAction::Push, None));
    sink.record(build_audit_event("b", 2, AuditAction::Push, None));
    sink.record(build_audit_event("b", 3, AuditAction::Push, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].job_id, 2); // First one popped
    assert_eq!(events[1].job_id, 3);
}

#[test]
fn test_build_audit_event() {
    let event = build_audit_event("batch1", 9, AuditAction::Finish, None);

    assert_eq!(event.batch, "batch1");
    assert_eq!(event.job_id, 9);
    assert_eq!(event.action, AuditAction::Finish);
    assert!(event.detail.is_none());
    assert!(event.created_at_ms > 0);
}

#[tokio::test]
async fn test_scheduler_records_lifecycle_in_order() {
    let sink = SharedAuditSink::new();
    let scheduler = SchedulerBuilder::new(SchedulerConfig::new().with_concurrency_limit(1))
        .with_audit(Box::new(sink.clone()))
        .build()
        .unwrap();

    scheduler.push(|| async { Ok(1) });
    scheduler.push(|| async { Err(anyhow::anyhow!("nope")) });
    scheduler.await_all().await.unwrap();

    let trail: Vec<(u64, AuditAction)> = sink
        .events()
        .iter()
        .map(|e| (e.job_id, e.action))
        .collect();
    assert_eq!(
        trail,
        vec![
            (0, AuditAction::Push),
            (0, AuditAction::Start),
            (1, AuditAction::Push),
            (0, AuditAction::Finish),
            (1, AuditAction::Start),
            (1, AuditAction::Fail),
        ]
    );

    let batch = scheduler.batch_id().to_string();
    assert!(sink.events().iter().all(|e| e.batch == batch));
    let failure = sink.events().into_iter().last().unwrap();
    assert_eq!(failure.detail.as_deref(), Some("nope"));
}

#[tokio::test]
async fn test_sink_can_read_scheduler_state() {
    let handle = Arc::new(OnceLock::new());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = MetricsReadingSink {
        scheduler: Arc::clone(&handle),
        seen: Arc::clone(&seen),
    };
    let scheduler: Scheduler<u8> =
        SchedulerBuilder::new(SchedulerConfig::new().with_concurrency_limit(1))
            .with_audit(Box::new(sink))
            .build()
            .unwrap();
    assert!(handle.set(scheduler.clone()).is_ok());

    scheduler.push(|| async { Ok(1) });
    scheduler.push(|| async { Ok(2) });
    assert_eq!(scheduler.await_all().await.unwrap(), vec![1, 2]);

    let seen = seen.lock().clone();
    let actions: Vec<AuditAction> = seen.iter().map(|(action, _)| *action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Push,
            AuditAction::Start,
            AuditAction::Push,
            AuditAction::Finish,
            AuditAction::Start,
            AuditAction::Finish,
        ]
    );
    // The last event is recorded after the batch's final state change.
    assert_eq!(seen.last().map(|(_, m)| m.completed), Some(2));
}
