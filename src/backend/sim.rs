//! Simulated backend
//!
//! Stands in for a real database when exercising the driver itself: dry
//! runs, CI, and tests. Connections are numbered handles. Execution can be
//! slowed down, made to fail at random, or made to fail deterministically on
//! the k-th invocation across all connections.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Backend, BackendError, Operation, Row, Target};

/// Behaviour of the simulated backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Time spent in every execution
    #[serde(default)]
    pub latency_ms: u64,

    /// Probability (0.0 - 1.0) that an execution fails
    #[serde(default)]
    pub failure_rate: f64,

    /// Fail exactly the k-th execution (1-based, counted across all connections)
    #[serde(default)]
    pub fail_on: Option<u64>,

    /// Refuse every connect after this many successful connects
    #[serde(default)]
    pub connect_fail_after: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            failure_rate: 0.0,
            fail_on: None,
            connect_fail_after: None,
        }
    }
}

/// One simulated session
#[derive(Debug)]
pub struct SimConnection {
    id: u64,
    executed: u64,
}

impl SimConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Operations run on this session so far
    pub fn executed(&self) -> u64 {
        self.executed
    }
}

/// In-process backend with injectable failures
#[derive(Debug, Default)]
pub struct SimBackend {
    config: SimConfig,
    invocations: AtomicU64,
    connects: AtomicU64,
    closes: AtomicU64,
}

impl SimBackend {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Executions started across all connections
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Connections opened so far
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Connections closed so far
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Backend for SimBackend {
    type Connection = SimConnection;

    fn name(&self) -> &'static str {
        "sim"
    }

    fn connect(&self, target: &Target) -> Result<SimConnection, BackendError> {
        let id = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(limit) = self.config.connect_fail_after {
            if id > limit {
                // Refused connects are not counted as opened
                self.connects.fetch_sub(1, Ordering::SeqCst);
                return Err(BackendError::Connect {
                    target: target.redacted(),
                    message: format!("simulated refusal after {} connections", limit),
                });
            }
        }
        trace!(id, "Opened simulated connection");
        Ok(SimConnection { id, executed: 0 })
    }

    fn close(&self, conn: SimConnection) -> Result<(), BackendError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        trace!(id = conn.id, executed = conn.executed, "Closed simulated connection");
        Ok(())
    }

    fn execute(&self, conn: &mut SimConnection, op: &Operation) -> Result<Row, BackendError> {
        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        conn.executed += 1;

        if self.config.latency_ms > 0 {
            thread::sleep(Duration::from_millis(self.config.latency_ms));
        }

        if self.config.fail_on == Some(invocation) {
            return Err(BackendError::Execute(format!(
                "simulated defect on invocation {} (connection {})",
                invocation, conn.id
            )));
        }

        if self.config.failure_rate > 0.0 && rand::random::<f64>() < self.config.failure_rate {
            return Err(BackendError::Execute(format!(
                "simulated random failure on invocation {} (connection {})",
                invocation, conn.id
            )));
        }

        Ok(vec![op.summary(), conn.id.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::new("sim://local")
    }

    #[test]
    fn test_executes_successfully_by_default() {
        let backend = SimBackend::new(SimConfig::default());
        let mut conn = backend.connect(&target()).unwrap();

        let row = backend.execute(&mut conn, &Operation::new("SELECT 1")).unwrap();
        assert_eq!(row, vec!["SELECT 1".to_string(), "1".to_string()]);
        assert_eq!(conn.executed(), 1);
        assert_eq!(backend.invocations(), 1);
    }

    #[test]
    fn test_fails_on_kth_invocation_only() {
        let backend = SimBackend::new(SimConfig {
            fail_on: Some(3),
            ..Default::default()
        });
        let mut a = backend.connect(&target()).unwrap();
        let mut b = backend.connect(&target()).unwrap();
        let op = Operation::new("SELECT 1");

        assert!(backend.execute(&mut a, &op).is_ok());
        assert!(backend.execute(&mut b, &op).is_ok());
        let err = backend.execute(&mut a, &op).unwrap_err();
        assert!(err.to_string().contains("invocation 3"));
        assert!(backend.execute(&mut b, &op).is_ok());
    }

    #[test]
    fn test_certain_failure_rate() {
        let backend = SimBackend::new(SimConfig {
            failure_rate: 1.0,
            ..Default::default()
        });
        let mut conn = backend.connect(&target()).unwrap();
        assert!(matches!(
            backend.execute(&mut conn, &Operation::new("SELECT 1")),
            Err(BackendError::Execute(_))
        ));
    }

    #[test]
    fn test_connect_refusal() {
        let backend = SimBackend::new(SimConfig {
            connect_fail_after: Some(2),
            ..Default::default()
        });

        assert!(backend.connect(&target()).is_ok());
        assert!(backend.connect(&target()).is_ok());
        let err = backend.connect(&Target::new("sim://u:pw@local")).unwrap_err();
        assert!(matches!(err, BackendError::Connect { .. }));
        assert!(!err.to_string().contains("pw@"));
        assert_eq!(backend.connects(), 2);
    }

    #[test]
    fn test_close_is_counted() {
        let backend = SimBackend::new(SimConfig::default());
        let conn = backend.connect(&target()).unwrap();
        backend.close(conn).unwrap();
        assert_eq!(backend.closes(), 1);
    }
}
