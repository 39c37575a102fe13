/*!
 * Shared stop signal for hammer workers
 *
 * Workers poll the flag between steps; the first caller to stop the run
 * decides the recorded reason.
 */

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The configured number of attempts was performed
    AttemptCeiling,
    /// The configured wall-clock budget ran out
    TimeCeiling,
    /// An attempt failed
    Failure,
    /// A broken connection could not be replaced
    PoolDegraded,
    /// A worker thread could not be started
    SpawnFailed,
    /// A worker thread died outside of an attempt
    WorkerPanicked,
    /// Stopped from outside through a [`StopHandle`]
    Cancelled,
}

impl StopReason {
    /// True for reasons that mean the run could not complete its experiment
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            StopReason::PoolDegraded | StopReason::SpawnFailed | StopReason::WorkerPanicked
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::AttemptCeiling => "attempt ceiling reached",
            StopReason::TimeCeiling => "time ceiling reached",
            StopReason::Failure => "failure observed",
            StopReason::PoolDegraded => "connection pool degraded",
            StopReason::SpawnFailed => "worker could not be started",
            StopReason::WorkerPanicked => "worker panicked",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Lock-free stop flag with a write-once reason
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    reason: OnceLock<StopReason>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns true if this call decided the reason.
    pub fn stop(&self, reason: StopReason) -> bool {
        let won = self.reason.set(reason).is_ok();
        self.stopped.store(true, Ordering::Release);
        won
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }
}

/// Cloneable handle for cancelling a run from another thread
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: Arc<StopSignal>,
}

impl StopHandle {
    pub(crate) fn new(signal: Arc<StopSignal>) -> Self {
        Self { signal }
    }

    /// Ask every worker to finish its current attempt and exit
    pub fn cancel(&self) -> bool {
        self.signal.stop(StopReason::Cancelled)
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_first_reason_wins() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());
        assert_eq!(signal.reason(), None);

        assert!(signal.stop(StopReason::Failure));
        assert!(!signal.stop(StopReason::TimeCeiling));

        assert!(signal.is_stopped());
        assert_eq!(signal.reason(), Some(StopReason::Failure));
    }

    #[test]
    fn test_concurrent_stop_has_single_winner() {
        let signal = StopSignal::new();
        let winners: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| signal.stop(StopReason::AttemptCeiling)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });

        assert_eq!(winners, 1);
    }

    #[test]
    fn test_handle_cancels() {
        let signal = Arc::new(StopSignal::new());
        let handle = StopHandle::new(signal.clone());

        assert!(handle.cancel());
        assert!(handle.is_stopped());
        assert_eq!(signal.reason(), Some(StopReason::Cancelled));
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&StopReason::PoolDegraded).unwrap();
        assert_eq!(json, "\"pool_degraded\"");
        assert!(StopReason::SpawnFailed.is_abort());
        assert!(!StopReason::Failure.is_abort());
    }
}
