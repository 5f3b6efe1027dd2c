//! Retry policy for failed jobs.

use crate::job::{Job, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `fail` did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum FailOutcome {
    /// Re-enqueued; claimable again from `retry_at`.
    #[serde(rename_all = "camelCase")]
    Retried {
        priority: Priority,
        retry_at: DateTime<Utc>,
        attempt: u32,
    },
    /// Retries used up; the job is now terminally `failed`.
    Exhausted,
}

/// Fixed-delay retry with priority decay.
///
/// Each retry waits `delay` and drops the job `priority_step` levels (never
/// below 1), so repeatedly failing work yields to fresh work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub priority_step: u8,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(60),
            priority_step: 1,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(delay: Duration, priority_step: u8) -> Self {
        Self {
            delay,
            priority_step,
        }
    }

    /// Decides the next step for a job that just failed at `now`.
    pub fn decide(&self, job: &Job, now: DateTime<Utc>) -> FailOutcome {
        if !job.has_retries_left() {
            return FailOutcome::Exhausted;
        }

        let delay = chrono::Duration::from_std(self.delay).unwrap_or(chrono::Duration::MAX);
        FailOutcome::Retried {
            priority: job.priority.decayed(self.priority_step),
            retry_at: now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC),
            attempt: job.current_retry + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn job(priority: i64, max_retries: u32, current_retry: u32) -> Job {
        let mut job = Job::new("t", Value::Null, Priority::clamped(priority), max_retries);
        job.current_retry = current_retry;
        job
    }

    #[test]
    fn test_retry_decays_priority_and_delays() {
        let policy = RetryPolicy::new(Duration::from_secs(60), 1);
        let now = Utc::now();

        match policy.decide(&job(5, 3, 0), now) {
            FailOutcome::Retried {
                priority,
                retry_at,
                attempt,
            } => {
                assert_eq!(priority.get(), 4);
                assert_eq!(retry_at - now, chrono::Duration::seconds(60));
                assert_eq!(attempt, 1);
            }
            FailOutcome::Exhausted => panic!("expected a retry"),
        }
    }

    #[test]
    fn test_priority_floor() {
        let policy = RetryPolicy::new(Duration::ZERO, 3);
        let outcome = policy.decide(&job(2, 3, 1), Utc::now());
        assert!(matches!(outcome, FailOutcome::Retried { priority, .. } if priority == Priority::MIN));
    }

    #[test]
    fn test_exhausted_at_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(&job(5, 2, 2), Utc::now()), FailOutcome::Exhausted);
        assert_eq!(policy.decide(&job(5, 0, 0), Utc::now()), FailOutcome::Exhausted);
    }

    #[test]
    fn test_outcome_json() {
        let value = serde_json::to_value(FailOutcome::Exhausted).unwrap();
        assert_eq!(value["outcome"], "exhausted");
    }
}
