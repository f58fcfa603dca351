//! Retry delay policy.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default delay unit for the linear ramp.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(60);

/// Default delay once the ramp is exhausted.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(3600);

/// Default number of failures after which the maximum delay applies.
pub const DEFAULT_RAMP_LIMIT: u32 = 10;

/// Linear backoff capped at a maximum.
///
/// For `0 < failures < ramp_limit` the delay is `failures * base_delay`; from
/// `ramp_limit` on it is `max_delay`. The ramp never exceeds `max_delay`;
/// [`ProcessorConfig::validate`](crate::ProcessorConfig::validate) rejects
/// policies whose ramp would need the cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay added per recorded failure
    pub base_delay: Duration,

    /// Upper bound and delay past the ramp
    pub max_delay: Duration,

    /// Failure count at which the ramp ends
    pub ramp_limit: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            ramp_limit: DEFAULT_RAMP_LIMIT,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with the default ramp limit.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            ramp_limit: DEFAULT_RAMP_LIMIT,
        }
    }

    /// Set the ramp limit.
    pub fn with_ramp_limit(mut self, ramp_limit: u32) -> Self {
        self.ramp_limit = ramp_limit;
        self
    }

    /// Delay before the next attempt after `failure_count` failures.
    pub fn delay_for(&self, failure_count: u32) -> Duration {
        if failure_count < self.ramp_limit {
            self.base_delay
                .checked_mul(failure_count)
                .map_or(self.max_delay, |delay| delay.min(self.max_delay))
        } else {
            self.max_delay
        }
    }

    /// Instant of the next attempt.
    pub fn next_attempt(&self, failure_count: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        add_duration(now, self.delay_for(failure_count))
    }
}

/// `instant + duration`, saturating at the latest representable instant.
pub fn add_duration(instant: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| instant.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
