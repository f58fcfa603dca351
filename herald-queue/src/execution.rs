//! Pending execution records and their retry state.

use crate::backoff::BackoffPolicy;
use chrono::{DateTime, Utc};
use herald_events::PersistableEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storage key of a pending execution.
pub type ExecutionId = Uuid;

/// One outstanding reliable delivery of an event to a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingExecution {
    /// Storage key
    pub id: ExecutionId,

    /// Event to deliver
    pub event: PersistableEvent,

    /// Target listener
    pub listener_id: String,

    /// Not delivered before this instant
    pub next_execution_time: DateTime<Utc>,

    /// Failed attempts so far
    pub failure_count: u32,
}

/// What to do with an execution after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the record and try again at the given instant
    Retry {
        next_execution_time: DateTime<Utc>,
        failure_count: u32,
    },
    /// Delete the record; delivery is abandoned
    Drop { failure_count: u32 },
}

impl PendingExecution {
    /// Create a fresh execution with no failures.
    pub fn new(
        event: PersistableEvent,
        listener_id: impl Into<String>,
        next_execution_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            listener_id: listener_id.into(),
            next_execution_time,
            failure_count: 0,
        }
    }

    /// Whether the execution may be attempted at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_execution_time <= now
    }

    /// Account for one more failed attempt.
    ///
    /// The record itself is not modified; the caller persists the decision.
    pub fn after_failure(
        &self,
        max_failures: u32,
        policy: &BackoffPolicy,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        let failure_count = self.failure_count.saturating_add(1);
        if failure_count >= max_failures {
            RetryDecision::Drop { failure_count }
        } else {
            RetryDecision::Retry {
                next_execution_time: policy.next_attempt(failure_count, now),
                failure_count,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn execution() -> PendingExecution {
        PendingExecution::new(PersistableEvent::new("test", "{}"), "listener", Utc::now())
    }

    #[test]
    fn test_execution_creation() {
        let execution = execution();
        assert_eq!(execution.failure_count, 0);
        assert_eq!(execution.listener_id, "listener");
        assert!(execution.is_due(Utc::now()));
    }

    #[test]
    fn test_execution_id_uniqueness() {
        assert_ne!(execution().id, execution().id);
    }

    #[test]
    fn test_not_due_before_next_execution_time() {
        let mut execution = execution();
        execution.next_execution_time = Utc::now() + chrono::Duration::hours(1);
        assert!(!execution.is_due(Utc::now()));
    }

    #[test]
    fn test_failure_increments_and_pushes_forward() {
        let policy = BackoffPolicy::new(Duration::from_secs(30), Duration::from_secs(600));
        let now = Utc::now();
        let mut execution = execution();
        execution.failure_count = 1;

        match execution.after_failure(5, &policy, now) {
            RetryDecision::Retry {
                next_execution_time,
                failure_count,
            } => {
                assert_eq!(failure_count, 2);
                assert!(next_execution_time > now);
                assert!(next_execution_time > execution.next_execution_time);
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_reaching_max_failures_drops() {
        let policy = BackoffPolicy::default();
        let mut execution = execution();
        execution.failure_count = 2;

        assert_eq!(
            execution.after_failure(3, &policy, Utc::now()),
            RetryDecision::Drop { failure_count: 3 }
        );
    }

    #[test]
    fn test_zero_max_failures_drops_first_failure() {
        let decision = execution().after_failure(0, &BackoffPolicy::default(), Utc::now());
        assert_eq!(decision, RetryDecision::Drop { failure_count: 1 });
    }
}
