//! Convenience entry points built on [`Scheduler`]. They hold no scheduling
//! logic of their own.

use std::future::Future;
use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::{Scheduler, SchedulerError};

/// Run a known list of computations with bounded concurrency and collect the
/// successful values in completion order.
///
/// # Errors
///
/// `InvalidConfig`/`Runtime` from construction, or `BatchAborted` when
/// `throw_on_error` is set and any computation failed.
pub async fn fulfill_all<T, I, F, Fut>(
    computations: I,
    config: SchedulerConfig,
) -> Result<Vec<T>, SchedulerError>
where
    T: Send + 'static,
    I: IntoIterator<Item = F>,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let scheduler = Scheduler::new(config)?;
    scheduler.push_all(computations);
    scheduler.drain_all().await
}

/// Apply `transform(input, index)` to every input with bounded concurrency.
///
/// Values are returned in input order regardless of completion order. Failed
/// items are left out, so with `k` failures (and `throw_on_error` off) the
/// output holds the remaining `n - k` values, still in input order.
///
/// # Errors
///
/// Same as [`fulfill_all`].
pub async fn map_concurrently<In, T, I, F, Fut>(
    inputs: I,
    transform: F,
    config: SchedulerConfig,
) -> Result<Vec<T>, SchedulerError>
where
    In: Send + 'static,
    T: Send + 'static,
    I: IntoIterator<Item = In>,
    F: Fn(In, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let scheduler = Scheduler::<(usize, T)>::new(config)?;
    let transform = Arc::new(transform);
    for (index, input) in inputs.into_iter().enumerate() {
        let transform = Arc::clone(&transform);
        scheduler.push(move || async move {
            let value = transform(input, index).await?;
            Ok::<_, anyhow::Error>((index, value))
        });
    }
    let mut indexed = scheduler.drain_all().await?;
    indexed.sort_unstable_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, value)| value).collect())
}
