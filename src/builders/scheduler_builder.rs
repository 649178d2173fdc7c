//! Builder wiring configuration, error handler, audit sink and spawner into a
//! [`Scheduler`].

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::{AuditSink, ErrorHandler, JobFailure, Scheduler, SchedulerError, Spawn};
use crate::runtime::TokioSpawner;

/// Builder for [`Scheduler`].
///
/// `new` binds the tokio runtime the caller is on, if any; use
/// [`SchedulerBuilder::with_spawner`] to run jobs elsewhere.
pub struct SchedulerBuilder<S = TokioSpawner> {
    config: SchedulerConfig,
    spawner: Option<S>,
    error_handler: Option<ErrorHandler>,
    audit: Option<Box<dyn AuditSink>>,
}

impl SchedulerBuilder<TokioSpawner> {
    /// Start from a configuration, defaulting to the current tokio runtime.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            spawner: TokioSpawner::current().ok(),
            error_handler: None,
            audit: None,
        }
    }
}

impl<S> SchedulerBuilder<S> {
    /// Configuration the scheduler will be built with.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Install the per-failure callback.
    #[must_use]
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&JobFailure) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Run jobs on a different spawner.
    #[must_use]
    pub fn with_spawner<S2>(self, spawner: S2) -> SchedulerBuilder<S2> {
        SchedulerBuilder {
            config: self.config,
            spawner: Some(spawner),
            error_handler: self.error_handler,
            audit: self.audit,
        }
    }

    /// Validate the configuration and build the scheduler.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if validation fails; `Runtime` if no spawner is set
    /// and the builder was created outside a tokio runtime.
    pub fn build<T>(self) -> Result<Scheduler<T, S>, SchedulerError>
    where
        T: Send + 'static,
        S: Spawn + Send + Sync + 'static,
    {
        self.config.validate().map_err(SchedulerError::InvalidConfig)?;
        let spawner = self.spawner.ok_or_else(|| {
            SchedulerError::Runtime("no spawner configured outside a tokio runtime".into())
        })?;
        Ok(Scheduler::from_parts(
            self.config,
            spawner,
            self.error_handler,
            self.audit,
        ))
    }
}
