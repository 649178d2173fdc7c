//! Scheduler configuration.
//!
//! Values come from code (`with_*` builders), JSON, or the environment
//! (`SCHEDULER_*` variables, optionally loaded from a `.env` file).

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable for [`SchedulerConfig::concurrency_limit`].
pub const ENV_CONCURRENCY_LIMIT: &str = "SCHEDULER_CONCURRENCY_LIMIT";
/// Environment variable for [`SchedulerConfig::poll_interval_ms`].
pub const ENV_POLL_INTERVAL_MS: &str = "SCHEDULER_POLL_INTERVAL_MS";
/// Environment variable for [`SchedulerConfig::auto_start`].
pub const ENV_AUTO_START: &str = "SCHEDULER_AUTO_START";
/// Environment variable for [`SchedulerConfig::throw_on_error`].
pub const ENV_THROW_ON_ERROR: &str = "SCHEDULER_THROW_ON_ERROR";

/// Immutable scheduler options, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum simultaneously running jobs.
    pub concurrency_limit: usize,
    /// Tick period of the completion-detection safety net, in milliseconds.
    pub poll_interval_ms: u64,
    /// Whether `push` immediately attempts admission.
    pub auto_start: bool,
    /// Whether any job failure aborts `await_all`.
    pub throw_on_error: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 5,
            poll_interval_ms: 50,
            auto_start: true,
            throw_on_error: false,
        }
    }
}

impl SchedulerConfig {
    /// Defaults: 5 slots, 50ms poll, auto-start on, failures tolerated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the concurrency limit.
    #[must_use]
    pub const fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Set the poll interval in milliseconds.
    #[must_use]
    pub const fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the poll interval, truncated to whole milliseconds.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enable or disable admission on `push`.
    #[must_use]
    pub const fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Enable or disable aborting the batch on the first failure.
    #[must_use]
    pub const fn with_throw_on_error(mut self, throw_on_error: bool) -> Self {
        self.throw_on_error = throw_on_error;
        self
    }

    /// Poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency_limit == 0 {
            return Err("concurrency_limit must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read configuration from the process environment, loading `.env` first
    /// if present. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or a
    /// validation message.
    pub fn from_env() -> Result<Self, String> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!("failed to load .env: {}", e);
            }
        }
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`SchedulerConfig::from_env`].
    pub fn from_env_with<L>(lookup: L) -> Result<Self, String>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(limit) = parse_var(&lookup, ENV_CONCURRENCY_LIMIT)? {
            cfg.concurrency_limit = limit;
        }
        if let Some(ms) = parse_var(&lookup, ENV_POLL_INTERVAL_MS)? {
            cfg.poll_interval_ms = ms;
        }
        if let Some(auto_start) = parse_var(&lookup, ENV_AUTO_START)? {
            cfg.auto_start = auto_start;
        }
        if let Some(throw_on_error) = parse_var(&lookup, ENV_THROW_ON_ERROR)? {
            cfg.throw_on_error = throw_on_error;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<L, V>(lookup: &L, key: &str) -> Result<Option<V>, String>
where
    L: Fn(&str) -> Option<String>,
    V: FromStr,
    V::Err: Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| format!("{key}: cannot parse `{raw}`: {e}"))
        })
        .transpose()
}
