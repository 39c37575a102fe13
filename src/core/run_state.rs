/*!
 * Shared counters for one hammer run
 *
 * Every mutation happens under a single mutex and returns the state after
 * the update, so workers never act on a stale count.
 */

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::hammer::HammerResult;
use super::stop::StopReason;

/// The failure that ended a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Name of the worker thread that observed it
    pub worker: String,
    /// 1-based attempt number
    pub attempt: u64,
    pub message: String,
    pub observed_at: DateTime<Utc>,
}

impl Failure {
    pub fn new(worker: impl Into<String>, attempt: u64, message: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            attempt,
            message: message.into(),
            observed_at: Utc::now(),
        }
    }
}

/// State returned by a register call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registered {
    /// Attempts finished so far, this one included
    pub completed: u64,
    /// True when the attempt ceiling has been reached
    pub ceiling_reached: bool,
    /// True when this call stored the run's first failure
    pub first_failure: bool,
}

#[derive(Debug, Default)]
struct Counters {
    reserved: u64,
    successes: u64,
    failures: u64,
    first_failure: Option<Failure>,
    abort_cause: Option<String>,
}

impl Counters {
    fn completed(&self) -> u64 {
        self.successes + self.failures
    }
}

/// Counters shared by all workers of a run
#[derive(Debug)]
pub struct RunState {
    max_attempts: Option<u64>,
    counters: Mutex<Counters>,
}

impl RunState {
    pub fn new(max_attempts: Option<u64>) -> Self {
        Self {
            max_attempts,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Reserve the next attempt slot
    ///
    /// Returns the 1-based attempt number, or `None` once the attempt
    /// ceiling has been handed out.
    pub fn begin_attempt(&self) -> Option<u64> {
        let mut counters = self.counters.lock();
        if let Some(max) = self.max_attempts {
            if counters.reserved >= max {
                return None;
            }
        }
        counters.reserved += 1;
        Some(counters.reserved)
    }

    pub fn register_success(&self) -> Registered {
        let mut counters = self.counters.lock();
        counters.successes += 1;
        self.registered(&counters, false)
    }

    /// Count a failure; only the first one is kept
    pub fn register_failure(&self, failure: Failure) -> Registered {
        let mut counters = self.counters.lock();
        counters.failures += 1;
        let first = counters.first_failure.is_none();
        if first {
            counters.first_failure = Some(failure);
        }
        self.registered(&counters, first)
    }

    fn registered(&self, counters: &Counters, first_failure: bool) -> Registered {
        let completed = counters.completed();
        Registered {
            completed,
            ceiling_reached: self.max_attempts.is_some_and(|max| completed >= max),
            first_failure,
        }
    }

    /// True when no further attempt can be reserved
    pub fn attempts_exhausted(&self) -> bool {
        match self.max_attempts {
            Some(max) => self.counters.lock().reserved >= max,
            None => false,
        }
    }

    /// Record why the run had to be abandoned; the first cause is kept
    pub fn record_abort(&self, cause: impl Into<String>) {
        let mut counters = self.counters.lock();
        if counters.abort_cause.is_none() {
            counters.abort_cause = Some(cause.into());
        }
    }

    /// (attempts completed, failures)
    pub fn progress(&self) -> (u64, u64) {
        let counters = self.counters.lock();
        (counters.completed(), counters.failures)
    }

    /// Freeze the counters into the run result
    pub fn into_result(self, duration: Duration, stop_reason: Option<StopReason>) -> HammerResult {
        let counters = self.counters.into_inner();
        HammerResult {
            attempts: counters.completed(),
            successes: counters.successes,
            failures: counters.failures,
            duration,
            first_failure: counters.first_failure,
            stop_reason,
            abort_cause: counters.abort_cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_reservation_respects_ceiling() {
        let state = RunState::new(Some(3));

        assert_eq!(state.begin_attempt(), Some(1));
        assert_eq!(state.begin_attempt(), Some(2));
        assert_eq!(state.begin_attempt(), Some(3));
        assert_eq!(state.begin_attempt(), None);
        assert!(state.attempts_exhausted());
    }

    #[test]
    fn test_unbounded_never_exhausts() {
        let state = RunState::new(None);
        for _ in 0..1000 {
            assert!(state.begin_attempt().is_some());
        }
        assert!(!state.attempts_exhausted());
    }

    #[test]
    fn test_register_reports_post_state() {
        let state = RunState::new(Some(2));
        state.begin_attempt();
        state.begin_attempt();

        let first = state.register_success();
        assert_eq!(first.completed, 1);
        assert!(!first.ceiling_reached);

        let second = state.register_success();
        assert_eq!(second.completed, 2);
        assert!(second.ceiling_reached);
    }

    #[test]
    fn test_first_failure_is_kept() {
        let state = RunState::new(None);

        let a = state.register_failure(Failure::new("query-hammer-1", 4, "first"));
        let b = state.register_failure(Failure::new("query-hammer-2", 5, "second"));
        assert!(a.first_failure);
        assert!(!b.first_failure);

        let result = state.into_result(Duration::from_secs(1), Some(StopReason::Failure));
        assert_eq!(result.failures, 2);
        let kept = result.first_failure.unwrap();
        assert_eq!(kept.message, "first");
        assert_eq!(kept.attempt, 4);
    }

    #[test]
    fn test_concurrent_reservations_never_overshoot() {
        let state = RunState::new(Some(500));

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    while state.begin_attempt().is_some() {
                        state.register_success();
                    }
                });
            }
        });

        let result = state.into_result(Duration::ZERO, Some(StopReason::AttemptCeiling));
        assert_eq!(result.successes, 500);
        assert_eq!(result.attempts, 500);
    }

    #[test]
    fn test_abort_cause_is_write_once() {
        let state = RunState::new(None);
        state.record_abort("pool degraded");
        state.record_abort("later");

        let result = state.into_result(Duration::ZERO, Some(StopReason::PoolDegraded));
        assert_eq!(result.abort_cause.as_deref(), Some("pool degraded"));
    }
}
