/*!
 * Concurrent workload driver
 *
 * A fixed number of worker threads share one connection pool and run the
 * same operation in a tight loop until a failure is observed, a ceiling is
 * reached, or the run is cancelled.
 */

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dbhammer_core_pool::{ConnectionPool, PoolError};
use tracing::{debug, error, info, trace, warn};

use super::run_state::{Failure, RunState};
use super::stop::{StopHandle, StopReason, StopSignal};
use crate::backend::{Backend, BackendError, Operation};
use crate::error::{HammerError, Result};

/// Budget and pacing for one run
#[derive(Debug, Clone)]
pub struct HammerLimits {
    /// Worker threads, at least one
    pub threads: usize,
    /// Stop after this many attempts
    pub max_attempts: Option<u64>,
    /// Stop once this much wall-clock time has passed
    pub max_duration: Option<Duration>,
    /// How long a worker waits for a pooled connection before re-checking
    /// the stop conditions
    pub acquire_timeout: Duration,
    /// Log progress every this many attempts (0 disables)
    pub progress_every: u64,
}

impl Default for HammerLimits {
    fn default() -> Self {
        Self {
            threads: 8,
            max_attempts: None,
            max_duration: None,
            acquire_timeout: Duration::from_secs(1),
            progress_every: 100,
        }
    }
}

impl HammerLimits {
    pub fn new(threads: usize) -> Self {
        Self {
            threads,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max: u64) -> Self {
        self.max_attempts = Some(max);
        self
    }

    pub fn with_max_duration(mut self, max: Duration) -> Self {
        self.max_duration = Some(max);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every;
        self
    }

    /// True when neither ceiling is set and only a failure or a cancel ends the run
    pub fn is_unbounded(&self) -> bool {
        self.max_attempts.is_none() && self.max_duration.is_none()
    }
}

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct HammerResult {
    /// Attempts that ran to completion, successful or not
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub duration: Duration,
    /// The first failure observed by any worker
    pub first_failure: Option<Failure>,
    pub stop_reason: Option<StopReason>,
    /// Why the run had to be abandoned, if it was
    pub abort_cause: Option<String>,
}

impl HammerResult {
    /// True when at least one attempt failed
    pub fn reproduced(&self) -> bool {
        self.first_failure.is_some()
    }

    /// Attempts per second
    pub fn rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            0.0
        }
    }
}

/// Drives one operation concurrently against a pooled backend
pub struct Hammer<B: Backend> {
    pool: Arc<ConnectionPool<B::Connection>>,
    backend: Arc<B>,
    operation: Operation,
    limits: HammerLimits,
    stop: Arc<StopSignal>,
}

impl<B: Backend> Hammer<B> {
    /// Create a hammer over a ready pool
    pub fn new(
        pool: Arc<ConnectionPool<B::Connection>>,
        backend: Arc<B>,
        operation: Operation,
        limits: HammerLimits,
    ) -> Result<Self> {
        if limits.threads == 0 {
            return Err(HammerError::Config(
                "thread count must be at least 1".to_string(),
            ));
        }
        if limits.acquire_timeout.is_zero() {
            return Err(HammerError::Config(
                "acquire timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            pool,
            backend,
            operation,
            limits,
            stop: Arc::new(StopSignal::new()),
        })
    }

    /// Handle for cancelling the run from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.stop.clone())
    }

    pub fn limits(&self) -> &HammerLimits {
        &self.limits
    }

    /// Run the workload until a stop condition fires
    ///
    /// Failures observed by workers are part of the result, never an error.
    pub fn run(self) -> HammerResult {
        let state = RunState::new(self.limits.max_attempts);
        let start = Instant::now();
        // A ceiling too far out to represent as an instant never fires
        let deadline = self.limits.max_duration.and_then(|d| start.checked_add(d));

        info!(
            backend = self.backend.name(),
            threads = self.limits.threads,
            pool_size = self.pool.capacity(),
            max_attempts = ?self.limits.max_attempts,
            max_duration = ?self.limits.max_duration,
            operation = %self.operation.summary(),
            "Starting query hammer"
        );

        thread::scope(|s| {
            let mut handles = Vec::with_capacity(self.limits.threads);

            for n in 1..=self.limits.threads {
                let name = format!("query-hammer-{}", n);
                let worker = Worker {
                    hammer: &self,
                    state: &state,
                    deadline,
                    name: name.clone(),
                };

                match thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(s, move || worker.run())
                {
                    Ok(handle) => handles.push((name, handle)),
                    Err(e) => {
                        error!(worker = %name, error = %e, "Failed to start worker thread");
                        state.record_abort(format!("failed to start {}: {}", name, e));
                        self.stop.stop(StopReason::SpawnFailed);
                        break;
                    }
                }
            }

            for (name, handle) in handles {
                if let Err(payload) = handle.join() {
                    let message = panic_message(payload.as_ref());
                    error!(worker = %name, panic = %message, "Worker thread panicked");
                    state.record_abort(format!("{} panicked: {}", name, message));
                    self.stop.stop(StopReason::WorkerPanicked);
                }
            }
        });

        let duration = start.elapsed();
        let result = state.into_result(duration, self.stop.reason());

        info!(
            attempts = result.attempts,
            failures = result.failures,
            elapsed = ?duration,
            stop_reason = ?result.stop_reason,
            "Query hammer finished"
        );

        result
    }
}

/// One worker thread's view of the run
struct Worker<'a, B: Backend> {
    hammer: &'a Hammer<B>,
    state: &'a RunState,
    deadline: Option<Instant>,
    name: String,
}

impl<B: Backend> Worker<'_, B> {
    fn run(self) {
        debug!(worker = %self.name, "Worker started");
        let mut local = 0u64;

        while self.keep_going() {
            let timeout = self.acquire_timeout();
            let mut conn = match self.hammer.pool.checkout(timeout) {
                Ok(conn) => conn,
                Err(PoolError::Timeout(_)) => {
                    trace!(worker = %self.name, "No connection available, re-checking stop conditions");
                    continue;
                }
                Err(e) => {
                    warn!(worker = %self.name, error = %e, "Cannot take a connection, stopping");
                    self.state.record_abort(format!("{}: {}", self.name, e));
                    self.hammer.stop.stop(StopReason::PoolDegraded);
                    break;
                }
            };

            // Conditions may have changed while waiting for the connection
            if !self.keep_going() {
                break;
            }
            let Some(attempt) = self.state.begin_attempt() else {
                self.hammer.stop.stop(StopReason::AttemptCeiling);
                break;
            };

            local += 1;
            match execute_guarded(self.hammer.backend.as_ref(), &mut *conn, &self.hammer.operation) {
                Ok(_) => {
                    let registered = self.state.register_success();
                    self.log_progress(registered.completed, local);
                    if registered.ceiling_reached {
                        self.hammer.stop.stop(StopReason::AttemptCeiling);
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    let registered = self
                        .state
                        .register_failure(Failure::new(self.name.clone(), attempt, message.clone()));

                    if registered.first_failure {
                        error!(
                            worker = %self.name,
                            attempt,
                            local_attempts = local,
                            error = %message,
                            "Failure observed"
                        );
                    } else {
                        debug!(worker = %self.name, attempt, error = %message, "Further failure discarded");
                    }

                    self.hammer.stop.stop(StopReason::Failure);

                    if let Err(e) = conn.invalidate() {
                        error!(worker = %self.name, error = %e, "Connection pool degraded");
                        self.state.record_abort(format!("connection pool degraded: {}", e));
                        self.hammer.stop.stop(StopReason::PoolDegraded);
                    }
                }
            }
        }

        debug!(worker = %self.name, attempts = local, "Worker exiting");
    }

    /// Check every stop condition, setting the stop flag when a ceiling is hit
    fn keep_going(&self) -> bool {
        if self.hammer.stop.is_stopped() {
            return false;
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.hammer.stop.stop(StopReason::TimeCeiling);
            return false;
        }
        if self.state.attempts_exhausted() {
            self.hammer.stop.stop(StopReason::AttemptCeiling);
            return false;
        }
        true
    }

    /// Never wait for a connection past the deadline
    fn acquire_timeout(&self) -> Duration {
        let timeout = self.hammer.limits.acquire_timeout;
        match self.deadline {
            Some(deadline) => timeout.min(deadline.saturating_duration_since(Instant::now())),
            None => timeout,
        }
    }

    fn log_progress(&self, completed: u64, local: u64) {
        let every = self.hammer.limits.progress_every;
        if every == 0 {
            return;
        }
        if local % every == 0 {
            debug!(worker = %self.name, local, total = completed, "Worker progress");
        }
        if completed % every == 0 {
            info!(attempts = completed, "Progress");
        }
    }
}

/// Run one attempt, turning a panic inside the backend into a failure
fn execute_guarded<B: Backend>(
    backend: &B,
    conn: &mut B::Connection,
    op: &Operation,
) -> std::result::Result<crate::backend::Row, BackendError> {
    match panic::catch_unwind(AssertUnwindSafe(|| backend.execute(conn, op))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(BackendError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
