/*!
 * Run report: verdict, counters, and the captured failure
 */

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::HammerConfig;
use crate::core::{Failure, HammerResult, StopReason};
use crate::error::{Result, EXIT_CANCELLED, EXIT_FATAL, EXIT_INCONCLUSIVE, EXIT_REPRODUCED};

/// What a run tells us about the defect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// At least one attempt failed
    Reproduced,
    /// The budget ran out without a failure; this is not a pass
    Inconclusive,
    /// The run was abandoned before it could finish its experiment
    Aborted,
    /// Stopped from outside
    Cancelled,
}

impl Verdict {
    pub fn from_result(result: &HammerResult) -> Self {
        if result.reproduced() {
            return Verdict::Reproduced;
        }
        match result.stop_reason {
            Some(StopReason::Cancelled) => Verdict::Cancelled,
            Some(reason) if reason.is_abort() => Verdict::Aborted,
            _ if result.abort_cause.is_some() => Verdict::Aborted,
            _ => Verdict::Inconclusive,
        }
    }

    /// Process exit code for this verdict
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Reproduced => EXIT_REPRODUCED,
            Verdict::Inconclusive => EXIT_INCONCLUSIVE,
            Verdict::Aborted => EXIT_FATAL,
            Verdict::Cancelled => EXIT_CANCELLED,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Reproduced => write!(f, "REPRODUCED"),
            Verdict::Inconclusive => write!(f, "INCONCLUSIVE"),
            Verdict::Aborted => write!(f, "ABORTED"),
            Verdict::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Summary of one run, suitable for printing or JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub verdict: Verdict,
    pub backend: String,
    /// Target with credentials masked
    pub target: String,
    pub operation: String,
    pub threads: usize,
    pub pool_size: usize,
    pub max_seconds: Option<u64>,
    pub max_iterations: Option<u64>,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub duration_ms: u64,
    /// Attempts per second
    pub rate: f64,
    pub stop_reason: Option<StopReason>,
    pub first_failure: Option<Failure>,
    /// Set when the pool degraded or a worker was lost
    pub abort_cause: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Build a report from a finished run
    pub fn from_result(result: &HammerResult, config: &HammerConfig, backend: &str) -> Self {
        let finished_at = Utc::now();
        let elapsed = ChronoDuration::from_std(result.duration).unwrap_or_else(|_| ChronoDuration::zero());

        Self {
            verdict: Verdict::from_result(result),
            backend: backend.to_string(),
            target: config.target().redacted(),
            operation: config.operation().summary(),
            threads: config.threads,
            pool_size: config.pool_size,
            max_seconds: config.max_duration().map(|d| d.as_secs()),
            max_iterations: config.max_attempts(),
            attempts: result.attempts,
            successes: result.successes,
            failures: result.failures,
            duration_ms: result.duration.as_millis() as u64,
            rate: result.rate(),
            stop_reason: result.stop_reason,
            first_failure: result.first_failure.clone(),
            abort_cause: result.abort_cause.clone(),
            started_at: finished_at - elapsed,
            finished_at,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }

    /// Serialize the report as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Emit the outcome through tracing, including budget warnings
    pub fn log(&self) {
        info!(
            attempts = self.attempts,
            duration = %format_duration(self.duration_ms),
            rate = %format!("{:.1}/s", self.rate),
            "Hammer finished"
        );

        match self.verdict {
            Verdict::Reproduced => {
                if let Some(ref failure) = self.first_failure {
                    error!(
                        worker = %failure.worker,
                        attempt = failure.attempt,
                        error = %failure.message,
                        "Encountered failure during run"
                    );
                }
                if let Some(ref cause) = self.abort_cause {
                    warn!(cause = %cause, "Run ended with a degraded pool");
                }
            }
            Verdict::Inconclusive => {
                if let Some(secs) = self.max_seconds {
                    if self.stop_reason == Some(StopReason::TimeCeiling) {
                        warn!(
                            "Reached configured duration ({}s) without observing a failure. \
                             Consider increasing --duration or setting it to 0 to run until failure.",
                            secs
                        );
                    }
                }
                if let Some(max) = self.max_iterations {
                    if self.stop_reason == Some(StopReason::AttemptCeiling) {
                        warn!(
                            "Reached configured iteration limit ({}) without observing a failure.",
                            max
                        );
                    }
                }
            }
            Verdict::Aborted => {
                error!(
                    cause = self.abort_cause.as_deref().unwrap_or("unknown"),
                    "Run aborted before a verdict could be reached"
                );
            }
            Verdict::Cancelled => {
                warn!("Interrupted before a verdict could be reached");
            }
        }
    }

    /// Print a human-readable summary to stdout
    pub fn print(&self) {
        println!("dbhammer run report");
        println!("===================\n");

        println!("Verdict:     {}", self.verdict);
        println!("Backend:     {} ({})", self.backend, self.target);
        println!("Operation:   {}", self.operation);
        println!(
            "Workers:     {} threads on {} pooled connections\n",
            self.threads, self.pool_size
        );

        println!("Attempts:    {}", self.attempts);
        println!("  Succeeded: {}", self.successes);
        println!("  Failed:    {}", self.failures);
        println!("Duration:    {}", format_duration(self.duration_ms));
        println!("Rate:        {:.1} attempts/s", self.rate);
        if let Some(reason) = self.stop_reason {
            println!("Stopped:     {}", reason);
        }

        if let Some(ref failure) = self.first_failure {
            println!("\nFirst failure:");
            println!("  Worker:    {}", failure.worker);
            println!("  Attempt:   {}", failure.attempt);
            println!("  At:        {}", failure.observed_at.to_rfc3339());
            println!("  Error:     {}", failure.message);
        }

        if let Some(ref cause) = self.abort_cause {
            println!("\nAbort cause: {}", cause);
        }

        if self.verdict == Verdict::Inconclusive {
            println!("\nNo failure observed within budget. This is not a pass.");
        }
    }
}

/// Format a duration in milliseconds as human-readable
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        return format!("{}ms", ms);
    }

    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes % 60, seconds % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}
