//! Bounded-concurrency scheduler: admission, completion detection and error
//! policy.
//!
//! All mutable bookkeeping (queue, slot counter, results, job states and the
//! notification outbox) lives behind one `parking_lot::Mutex`. Admission is
//! driven by the slot counter: each call removes at most
//! `concurrency_limit - running` jobs from the front of the queue. It runs
//! after every push (with `auto_start`), after every completion, and on every
//! tick of the poll interval while someone is awaiting the batch.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::builders::SchedulerBuilder;
use crate::config::SchedulerConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditEvent, AuditSink};
use crate::core::events::{Notification, SchedulerEvent, Subscribers, SubscriptionId};
use crate::core::job::{panic_message, Job, JobFailure, JobId, JobState};
use crate::core::stats::{JobCounters, MetricsSnapshot};
use crate::core::error::{AppResult, SchedulerError};
use crate::runtime::TokioSpawner;

/// Abstraction for spawning job execution on a runtime.
pub trait Spawn {
    /// Spawn a future that runs to completion in the background.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Callback invoked with every job failure. Returning `Err` (or panicking) is
/// a handler failure: it is logged and never affects scheduler state.
pub type ErrorHandler = Arc<dyn Fn(&JobFailure) -> AppResult<()> + Send + Sync>;

type SharedAudit = Mutex<Box<dyn AuditSink>>;

struct State<T> {
    queue: VecDeque<Job<T>>,
    /// Indexed by `JobId - first_id`.
    jobs: VecDeque<JobState>,
    /// Id of the oldest job still tracked. Settled jobs are forgotten from
    /// the front once their results have been drained.
    first_id: JobId,
    counters: JobCounters,
    /// Successful values in completion order.
    results: Vec<T>,
    outbox: VecDeque<Notification<T>>,
    dispatching: bool,
    /// Audit events waiting to be handed to the sink outside this lock.
    audit_outbox: VecDeque<AuditEvent>,
    auditing: bool,
}

impl<T: 'static> State<T> {
    const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            jobs: VecDeque::new(),
            first_id: 0,
            counters: JobCounters {
                running: 0,
                completed: 0,
                errors: 0,
            },
            results: Vec::new(),
            outbox: VecDeque::new(),
            dispatching: false,
            audit_outbox: VecDeque::new(),
            auditing: false,
        }
    }

    fn enqueue<F, Fut>(&mut self, computation: F) -> JobId
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let id = self.first_id + self.jobs.len() as JobId;
        self.jobs.push_back(JobState::Pending);
        self.queue.push_back(Job::new(id, computation));
        id
    }

    fn index_of(&self, id: JobId) -> Option<usize> {
        id.checked_sub(self.first_id)
            .and_then(|offset| usize::try_from(offset).ok())
    }

    fn state_of(&self, id: JobId) -> Option<JobState> {
        self.index_of(id).and_then(|i| self.jobs.get(i)).copied()
    }

    fn set_state(&mut self, id: JobId, next: JobState) {
        if let Some(slot) = self.index_of(id).and_then(|i| self.jobs.get_mut(i)) {
            *slot = next;
        }
    }

    /// Drop the leading run of settled jobs. Ids stay sequential; forgotten
    /// ids report no state.
    fn forget_settled(&mut self) {
        while self.jobs.front().is_some_and(|s| s.is_terminal()) {
            self.jobs.pop_front();
            self.first_id += 1;
        }
    }

    fn drain_results(&mut self) -> Vec<T> {
        self.forget_settled();
        std::mem::take(&mut self.results)
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.counters.snapshot(self.queue.len())
    }

    /// Remove up to the number of free slots from the front of the queue and
    /// mark them running. Removal and slot accounting happen in one step.
    fn take_admissible(&mut self, limit: usize) -> Vec<Job<T>> {
        let available = limit.saturating_sub(self.counters.running);
        let count = available.min(self.queue.len());
        let admitted: Vec<Job<T>> = self.queue.drain(..count).collect();
        for job in &admitted {
            self.counters.running += 1;
            self.set_state(job.id(), JobState::Running);
        }
        admitted
    }

    fn is_quiescent(&self) -> bool {
        self.queue.is_empty()
            && self.counters.running == 0
            && self.outbox.is_empty()
            && !self.dispatching
            && self.audit_outbox.is_empty()
            && !self.auditing
    }
}

struct Inner<T, S> {
    batch_id: Uuid,
    config: SchedulerConfig,
    state: Mutex<State<T>>,
    subscribers: Mutex<Subscribers<T>>,
    error_handler: Option<ErrorHandler>,
    audit: Option<SharedAudit>,
    /// Woken on every completion and after every outbox drain.
    settled: Notify,
    /// Set once awaiting found no tokio time driver; waits then rely on
    /// completion wakeups alone.
    timerless: AtomicBool,
    spawner: S,
}

impl<T, S> Inner<T, S>
where
    T: Send + 'static,
    S: Spawn + Send + Sync + 'static,
{
    /// Queue an audit event. Called under the state lock so the trail keeps
    /// the order of state changes; the sink only sees it in `flush_audit`.
    fn audit(
        &self,
        state: &mut State<T>,
        job_id: JobId,
        action: AuditAction,
        detail: Option<String>,
    ) {
        if self.audit.is_some() {
            state
                .audit_outbox
                .push_back(build_audit_event(self.batch_id, job_id, action, detail));
        }
    }

    /// Hand queued audit events to the sink with the state lock released, so
    /// a sink may read the scheduler. Single drainer, like `dispatch`.
    fn flush_audit(&self) {
        let Some(sink) = &self.audit else {
            return;
        };
        {
            let mut state = self.state.lock();
            if state.auditing || state.audit_outbox.is_empty() {
                return;
            }
            state.auditing = true;
        }
        loop {
            let next = {
                let mut state = self.state.lock();
                let next = state.audit_outbox.pop_front();
                if next.is_none() {
                    state.auditing = false;
                }
                next
            };
            let Some(event) = next else {
                break;
            };
            sink.lock().record(event);
        }
        self.settled.notify_waiters();
    }

    fn admit(self: &Arc<Self>) {
        let admitted = {
            let mut state = self.state.lock();
            let admitted = state.take_admissible(self.config.concurrency_limit);
            for job in &admitted {
                self.audit(&mut state, job.id(), AuditAction::Start, None);
            }
            admitted
        };
        self.flush_audit();
        self.launch(admitted);
    }

    /// Poll-interval ticker for the safety net, or `None` when the current
    /// runtime was built without the time driver.
    fn ticker(&self) -> Option<Interval> {
        if self.timerless.load(Ordering::Relaxed) {
            return None;
        }
        let period = self.config.poll_interval();
        match catch_unwind(move || tokio::time::interval(period)) {
            Ok(mut ticker) => {
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(ticker)
            }
            Err(_) => {
                self.timerless.store(true, Ordering::Relaxed);
                warn!(
                    batch = %self.batch_id,
                    "tokio timers are disabled; waiting on completions only"
                );
                None
            }
        }
    }

    fn launch(self: &Arc<Self>, jobs: Vec<Job<T>>) {
        for job in jobs {
            let job_id = job.id();
            debug!(batch = %self.batch_id, job_id, "job admitted");
            let inner = Arc::clone(self);
            self.spawner.spawn(async move {
                let outcome = AssertUnwindSafe(job.run())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(anyhow::anyhow!(
                            "job panicked: {}",
                            panic_message(panic.as_ref())
                        ))
                    });
                inner.complete(job_id, outcome);
            });
        }
    }

    /// Settle a job: release its slot, refill free slots, and queue the
    /// notification, all in one critical section.
    fn complete(self: &Arc<Self>, job_id: JobId, outcome: AppResult<T>) {
        let (admitted, metrics, failure) = {
            let mut state = self.state.lock();
            state.counters.running = state.counters.running.saturating_sub(1);
            state.counters.completed += 1;
            let settled = match outcome {
                Ok(value) => {
                    state.set_state(job_id, JobState::Finished);
                    self.audit(&mut state, job_id, AuditAction::Finish, None);
                    Ok(value)
                }
                Err(err) => {
                    state.counters.errors += 1;
                    state.set_state(job_id, JobState::Failed);
                    self.audit(
                        &mut state,
                        job_id,
                        AuditAction::Fail,
                        Some(format!("{err:#}")),
                    );
                    Err(Arc::new(JobFailure::new(job_id, err)))
                }
            };

            let admitted = state.take_admissible(self.config.concurrency_limit);
            for job in &admitted {
                self.audit(&mut state, job.id(), AuditAction::Start, None);
            }

            let metrics = state.metrics();
            let (notification, failure) = match settled {
                Ok(value) => (
                    Notification::Data {
                        job_id,
                        value,
                        metrics,
                    },
                    None,
                ),
                Err(failure) => (
                    Notification::Failure {
                        failure: Arc::clone(&failure),
                        metrics,
                    },
                    Some(failure),
                ),
            };
            state.outbox.push_back(notification);
            (admitted, metrics, failure)
        };

        match failure {
            Some(failure) => warn!(
                batch = %self.batch_id,
                job_id,
                running = metrics.running,
                errors = metrics.errors,
                "{}",
                failure
            ),
            None => debug!(
                batch = %self.batch_id,
                job_id,
                running = metrics.running,
                completed = metrics.completed,
                "job finished"
            ),
        }

        self.flush_audit();
        self.launch(admitted);
        self.dispatch();
        self.settled.notify_waiters();
    }

    /// Deliver queued notifications in order. Only one caller drains at a
    /// time; the others return immediately and leave their entries to it.
    fn dispatch(&self) {
        {
            let mut state = self.state.lock();
            if state.dispatching || state.outbox.is_empty() {
                return;
            }
            state.dispatching = true;
        }

        let mut delivered: Option<T> = None;
        loop {
            let next = {
                let mut state = self.state.lock();
                if let Some(value) = delivered.take() {
                    state.results.push(value);
                }
                let next = state.outbox.pop_front();
                if next.is_none() {
                    state.dispatching = false;
                }
                next
            };
            let Some(notification) = next else {
                break;
            };
            delivered = self.deliver(notification);
        }
        self.settled.notify_waiters();
    }

    /// Run callbacks for one notification. Returns the value of a data
    /// notification so the caller can append it to the results.
    fn deliver(&self, notification: Notification<T>) -> Option<T> {
        match notification {
            Notification::Data {
                job_id,
                value,
                metrics,
            } => {
                let callbacks = self.subscribers.lock().data_callbacks();
                for callback in callbacks {
                    if catch_unwind(AssertUnwindSafe(|| callback(job_id, &value, &metrics)))
                        .is_err()
                    {
                        error!(batch = %self.batch_id, job_id, "data subscriber panicked");
                    }
                }
                Some(value)
            }
            Notification::Failure { failure, metrics } => {
                self.handle_failure(&failure);
                let callbacks = self.subscribers.lock().error_callbacks();
                for callback in callbacks {
                    if catch_unwind(AssertUnwindSafe(|| callback(&failure, &metrics))).is_err() {
                        error!(
                            batch = %self.batch_id,
                            job_id = failure.job_id,
                            "error subscriber panicked"
                        );
                    }
                }
                None
            }
        }
    }

    fn handle_failure(&self, failure: &JobFailure) {
        let Some(handler) = &self.error_handler else {
            return;
        };
        let reason = match catch_unwind(AssertUnwindSafe(|| handler(failure))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };
        let err = SchedulerError::HandlerFailed {
            job_id: failure.job_id,
            reason,
        };
        error!(batch = %self.batch_id, "{}", err);
    }

    fn check_settled<R>(
        &self,
        collect: &mut impl FnMut(&mut State<T>) -> R,
    ) -> Option<Result<R, SchedulerError>> {
        let mut state = self.state.lock();
        if self.config.throw_on_error && state.counters.errors > 0 {
            return Some(Err(SchedulerError::BatchAborted {
                errors: state.counters.errors,
            }));
        }
        state.is_quiescent().then(|| Ok(collect(&mut *state)))
    }
}

/// Bounded-concurrency scheduler for async jobs.
///
/// Cloning yields another handle to the same scheduler, so jobs can be pushed
/// from anywhere, including from event callbacks and while another task is
/// awaiting the batch.
///
/// ```rust,ignore
/// use prometheus_concurrency::{Scheduler, SchedulerConfig};
///
/// let scheduler = Scheduler::new(SchedulerConfig::new().with_concurrency_limit(10))?;
/// for i in 0..100 {
///     scheduler.push(move || async move { Ok(i * 2) });
/// }
/// let results = scheduler.await_all().await?;
/// assert_eq!(results.len(), 100);
/// ```
pub struct Scheduler<T, S = TokioSpawner> {
    inner: Arc<Inner<T, S>>,
}

impl<T, S> Clone for Scheduler<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, S> fmt::Debug for Scheduler<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("batch_id", &self.inner.batch_id)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<T> Scheduler<T, TokioSpawner>
where
    T: Send + 'static,
{
    /// Create a scheduler that runs jobs on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if validation fails, or `Runtime` when called
    /// outside a tokio runtime.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        SchedulerBuilder::new(config).build()
    }
}

impl<T, S> Scheduler<T, S>
where
    T: Send + 'static,
    S: Spawn + Send + Sync + 'static,
{
    /// Assemble a scheduler from validated parts.
    pub(crate) fn from_parts(
        config: SchedulerConfig,
        spawner: S,
        error_handler: Option<ErrorHandler>,
        audit: Option<Box<dyn AuditSink>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                batch_id: Uuid::new_v4(),
                config,
                state: Mutex::new(State::new()),
                subscribers: Mutex::new(Subscribers::new()),
                error_handler,
                audit: audit.map(Mutex::new),
                settled: Notify::new(),
                timerless: AtomicBool::new(false),
                spawner,
            }),
        }
    }

    /// Enqueue one job. With `auto_start`, admission is attempted right away.
    pub fn push<F, Fut>(&self, computation: F) -> JobId
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let job_id = {
            let mut state = self.inner.state.lock();
            let job_id = state.enqueue(computation);
            self.inner
                .audit(&mut state, job_id, AuditAction::Push, None);
            job_id
        };
        self.inner.flush_audit();
        debug!(batch = %self.inner.batch_id, job_id, "job pushed");
        if self.inner.config.auto_start {
            self.inner.admit();
        }
        job_id
    }

    /// Enqueue each computation in order.
    pub fn push_all<I, F, Fut>(&self, computations: I) -> Vec<JobId>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        computations.into_iter().map(|c| self.push(c)).collect()
    }

    /// Admit queued jobs into free slots. The trigger for schedulers built
    /// with `auto_start` disabled; awaiting the batch also triggers it.
    pub fn start(&self) {
        self.inner.admit();
    }

    /// Wait for quiescence and return every successful value so far, in
    /// completion order.
    ///
    /// Results accumulate across rounds: pushing more jobs after this
    /// resolves and awaiting again yields the old and the new values.
    ///
    /// On a runtime built without the time driver the poll-interval safety
    /// net is skipped and waiting relies on completion wakeups alone.
    ///
    /// # Errors
    ///
    /// `BatchAborted` if `throw_on_error` is set and any job has failed.
    pub async fn await_all(&self) -> Result<Vec<T>, SchedulerError>
    where
        T: Clone,
    {
        self.wait_with(|state| state.results.clone()).await
    }

    /// Like [`Scheduler::await_all`], but moves the values out of the results
    /// buffer instead of cloning them.
    ///
    /// # Errors
    ///
    /// `BatchAborted` if `throw_on_error` is set and any job has failed.
    pub async fn drain_all(&self) -> Result<Vec<T>, SchedulerError> {
        self.wait_with(State::drain_results).await
    }

    /// Wait until no job is pending or running and every notification has
    /// been delivered.
    ///
    /// # Errors
    ///
    /// `BatchAborted` if `throw_on_error` is set and any job has failed.
    pub async fn wait_quiescent(&self) -> Result<(), SchedulerError> {
        self.wait_with(|_| ()).await
    }

    async fn wait_with<R>(
        &self,
        mut collect: impl FnMut(&mut State<T>) -> R,
    ) -> Result<R, SchedulerError> {
        let inner = &self.inner;
        // Awaiting is a start trigger even without a ticker.
        inner.admit();
        let mut ticker = inner.ticker();

        loop {
            let notified = inner.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = inner.check_settled(&mut collect) {
                let metrics = self.metrics();
                match &outcome {
                    Ok(_) => info!(
                        batch = %inner.batch_id,
                        completed = metrics.completed,
                        errors = metrics.errors,
                        "batch settled"
                    ),
                    Err(e) => warn!(batch = %inner.batch_id, "{}", e),
                }
                return outcome;
            }

            let Some(ticker) = ticker.as_mut() else {
                notified.await;
                continue;
            };
            tokio::select! {
                () = &mut notified => {}
                _ = ticker.tick() => {
                    // Safety net: refill slots and flush events even if a
                    // completion-driven pass was missed.
                    inner.admit();
                    inner.dispatch();
                }
            }
        }
    }

    /// Move all successful values out of the results buffer without waiting.
    #[must_use]
    pub fn take_results(&self) -> Vec<T> {
        self.inner.state.lock().drain_results()
    }

    /// Current counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.state.lock().metrics()
    }

    /// Ids of all tracked jobs currently in `wanted`, in submission order.
    ///
    /// Settled jobs stop being tracked once their results are drained with
    /// [`Scheduler::drain_all`] or [`Scheduler::take_results`], so a reused
    /// scheduler does not grow with every job it has ever run.
    #[must_use]
    pub fn jobs_by_state(&self, wanted: JobState) -> Vec<JobId> {
        let state = self.inner.state.lock();
        let first_id = state.first_id;
        state
            .jobs
            .iter()
            .zip(first_id..)
            .filter(|(s, _)| **s == wanted)
            .map(|(_, id)| id)
            .collect()
    }

    /// State of a single job, or `None` for an unknown id or a settled job
    /// whose result has already been drained.
    #[must_use]
    pub fn job_state(&self, job_id: JobId) -> Option<JobState> {
        self.inner.state.lock().state_of(job_id)
    }

    /// No job pending or running, and no notification left to deliver.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.inner.state.lock().is_quiescent()
    }

    /// Configuration fixed at construction.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Identifier of this scheduler instance, used in logs and audit events.
    #[must_use]
    pub fn batch_id(&self) -> Uuid {
        self.inner.batch_id
    }

    /// Register a callback for every successful job, called with the job id,
    /// its value and the counters right after it settled.
    pub fn on_data<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(JobId, &T, &MetricsSnapshot) + Send + Sync + 'static,
    {
        self.inner.subscribers.lock().add_data(Arc::new(callback))
    }

    /// Register a callback for every failed job.
    pub fn on_error<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&JobFailure, &MetricsSnapshot) + Send + Sync + 'static,
    {
        self.inner.subscribers.lock().add_error(Arc::new(
            move |failure: &Arc<JobFailure>, metrics: &MetricsSnapshot| callback(failure, metrics),
        ))
    }

    /// Remove a callback. Returns `false` if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.lock().remove(id)
    }

    /// Receive every data and error event on a channel. Dropping the receiver
    /// silences the subscription.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SchedulerEvent<T>>
    where
        T: Clone,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let data_tx = tx.clone();
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.add_data(Arc::new(
            move |job_id: JobId, value: &T, metrics: &MetricsSnapshot| {
                let _ = data_tx.send(SchedulerEvent::Data {
                    job_id,
                    value: value.clone(),
                    metrics: *metrics,
                });
            },
        ));
        subscribers.add_error(Arc::new(
            move |failure: &Arc<JobFailure>, metrics: &MetricsSnapshot| {
                let _ = tx.send(SchedulerEvent::Error {
                    failure: Arc::clone(failure),
                    metrics: *metrics,
                });
            },
        ));
        rx
    }
}
