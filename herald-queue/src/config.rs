//! Retry processor configuration.

use crate::backoff::BackoffPolicy;
use crate::error::{QueueError, QueueResult};
use std::env;
use std::time::Duration;

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "HERALD_EVENTS";

/// Default sweep interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Default window for [`pending_count`](crate::RetryProcessor::pending_count).
///
/// Ten years: every execution that could possibly become due is counted.
pub const DEFAULT_PENDING_LOOKAHEAD: Duration = Duration::from_secs(3650 * 24 * 3600);

/// Retry processor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Time between scheduled sweeps
    pub interval: Duration,

    /// Delay between failed attempts
    pub backoff: BackoffPolicy,

    /// Delay before the first attempt of a freshly enqueued execution
    pub initial_delay: Duration,

    /// Window used when counting pending executions
    pub pending_lookahead: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            backoff: BackoffPolicy::default(),
            initial_delay: Duration::ZERO,
            pending_lookahead: DEFAULT_PENDING_LOOKAHEAD,
        }
    }
}

impl ProcessorConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sweep interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the first-attempt delay.
    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Set the pending-count window.
    pub fn with_pending_lookahead(mut self, lookahead: Duration) -> Self {
        self.pending_lookahead = lookahead;
        self
    }

    /// Load from `HERALD_EVENTS_*` environment variables.
    ///
    /// - `HERALD_EVENTS_INTERVAL_MS`
    /// - `HERALD_EVENTS_BASE_DELAY_MS`
    /// - `HERALD_EVENTS_MAX_DELAY_MS`
    /// - `HERALD_EVENTS_RAMP_LIMIT`
    /// - `HERALD_EVENTS_INITIAL_DELAY_MS`
    /// - `HERALD_EVENTS_LOOKAHEAD_SECS`
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> QueueResult<Self> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Load from environment variables with a custom prefix.
    pub fn from_env_with_prefix(prefix: &str) -> QueueResult<Self> {
        Self::from_lookup(prefix, |key| env::var(key).ok())
    }

    fn from_lookup(prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> QueueResult<Self> {
        let read = |name: &str| -> QueueResult<Option<u64>> {
            let key = format!("{}_{}", prefix, name);
            match lookup(&key) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|e| QueueError::Config(format!("{}={:?}: {}", key, raw, e))),
            }
        };

        let mut config = Self::default();
        if let Some(ms) = read("INTERVAL_MS")? {
            config.interval = Duration::from_millis(ms);
        }
        if let Some(ms) = read("BASE_DELAY_MS")? {
            config.backoff.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = read("MAX_DELAY_MS")? {
            config.backoff.max_delay = Duration::from_millis(ms);
        }
        if let Some(limit) = read("RAMP_LIMIT")? {
            config.backoff.ramp_limit = u32::try_from(limit)
                .map_err(|_| QueueError::Config(format!("{}_RAMP_LIMIT out of range", prefix)))?;
        }
        if let Some(ms) = read("INITIAL_DELAY_MS")? {
            config.initial_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = read("LOOKAHEAD_SECS")? {
            config.pending_lookahead = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the processor cannot run with.
    pub fn validate(&self) -> QueueResult<()> {
        if self.interval.is_zero() {
            return Err(QueueError::Config("interval must be positive".to_string()));
        }
        if self.backoff.base_delay.is_zero() {
            return Err(QueueError::Config("base delay must be positive".to_string()));
        }
        if self.backoff.base_delay > self.backoff.max_delay {
            return Err(QueueError::Config(
                "base delay must not exceed max delay".to_string(),
            ));
        }
        if self.backoff.ramp_limit == 0 {
            return Err(QueueError::Config("ramp limit must be positive".to_string()));
        }
        let ramp_end = self
            .backoff
            .base_delay
            .checked_mul(self.backoff.ramp_limit - 1);
        if ramp_end.is_none_or(|delay| delay > self.backoff.max_delay) {
            return Err(QueueError::Config(
                "linear ramp must stay within max delay".to_string(),
            ));
        }
        Ok(())
    }
}
