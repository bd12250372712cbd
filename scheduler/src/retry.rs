//! Retry state and the policy that advances it.

use keel_types::{ErrorKind, Timestamp};
use serde::{Deserialize, Serialize};

use crate::rules::MIN_PRIORITY;

/// Dispatch attempts before an item becomes a permanent failure.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Where a queued item stands with respect to retries.
///
/// Never mutated in place: a failure produces a new state via
/// [`RetryPolicy::after_failure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Failed dispatch attempts so far.
    pub attempts: u32,
    pub next_eligible_at: Timestamp,
    pub priority: u8,
}

impl RetryState {
    pub fn fresh(priority: u8, now: Timestamp) -> Self {
        Self {
            attempts: 0,
            next_eligible_at: now,
            priority: priority.max(MIN_PRIORITY),
        }
    }

    pub fn is_eligible(&self, now: Timestamp) -> bool {
        now >= self.next_eligible_at
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Re-enqueue with this state.
    Retry(RetryState),
    /// Budget spent; record a permanent failure.
    Exhausted { attempts: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Base backoff; attempt `n` waits `base × 2^(n−1)`.
    pub backoff_secs: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_secs: u64) -> Self {
        Self {
            max_attempts,
            backoff_secs,
        }
    }

    pub fn backoff_for(&self, attempts: u32) -> u64 {
        let exponent = attempts.saturating_sub(1).min(32);
        self.backoff_secs.saturating_mul(1u64 << exponent)
    }

    pub fn after_failure(&self, state: RetryState, now: Timestamp) -> RetryOutcome {
        let attempts = state.attempts.saturating_add(1);
        if attempts >= self.max_attempts {
            return RetryOutcome::Exhausted { attempts };
        }
        RetryOutcome::Retry(RetryState {
            attempts,
            next_eligible_at: now.plus_secs(self.backoff_for(attempts)),
            priority: state.priority.saturating_sub(1).max(MIN_PRIORITY),
        })
    }

    /// Like [`RetryPolicy::after_failure`], but failures of a kind that
    /// cannot clear up on their own are exhausted immediately.
    pub fn after_error(&self, state: RetryState, kind: ErrorKind, now: Timestamp) -> RetryOutcome {
        if kind.is_retryable() {
            self.after_failure(state, now)
        } else {
            RetryOutcome::Exhausted {
                attempts: state.attempts.saturating_add(1),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, 30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_decay_priority_and_back_off() {
        let policy = RetryPolicy::new(3, 30);
        let now = Timestamp::new(1_000);
        let fresh = RetryState::fresh(8, now);

        let RetryOutcome::Retry(first) = policy.after_failure(fresh, now) else {
            panic!("first failure should retry");
        };
        assert_eq!(first.attempts, 1);
        assert_eq!(first.priority, 7);
        assert_eq!(first.next_eligible_at, Timestamp::new(1_030));
        assert!(!first.is_eligible(Timestamp::new(1_029)));

        let RetryOutcome::Retry(second) = policy.after_failure(first, Timestamp::new(1_030)) else {
            panic!("second failure should retry");
        };
        assert_eq!(second.attempts, 2);
        assert_eq!(second.priority, 6);
        assert_eq!(second.next_eligible_at, Timestamp::new(1_090));

        assert_eq!(
            policy.after_failure(second, Timestamp::new(1_090)),
            RetryOutcome::Exhausted { attempts: 3 }
        );
    }

    #[test]
    fn priority_floors_at_one() {
        let policy = RetryPolicy::new(10, 0);
        let mut state = RetryState::fresh(2, Timestamp::new(0));
        for _ in 0..5 {
            match policy.after_failure(state, Timestamp::new(0)) {
                RetryOutcome::Retry(next) => state = next,
                RetryOutcome::Exhausted { .. } => panic!("budget should not run out"),
            }
        }
        assert_eq!(state.priority, MIN_PRIORITY);
    }

    #[test]
    fn unrecoverable_kinds_exhaust_immediately() {
        let policy = RetryPolicy::default();
        let now = Timestamp::new(0);
        let fresh = RetryState::fresh(8, now);

        for kind in [ErrorKind::Validation, ErrorKind::Permission] {
            assert_eq!(
                policy.after_error(fresh, kind, now),
                RetryOutcome::Exhausted { attempts: 1 }
            );
        }
        for kind in [ErrorKind::TransientExecutionFailure, ErrorKind::InsufficientBalance, ErrorKind::Paused] {
            assert!(matches!(policy.after_error(fresh, kind, now), RetryOutcome::Retry(_)));
        }
    }
}
