/*!
 * Environment readiness
 *
 * Whatever hosts the backend (a container, a service, a file) is reduced to
 * two questions: where to connect, and whether it accepts connections yet.
 */

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::backend::{Backend, BackendError, Target};
use crate::error::{HammerError, Result};

/// Capability that provides a target and reports readiness
pub trait Environment {
    /// Descriptor the pool connects to
    fn target(&self) -> &Target;

    /// One readiness probe
    fn probe(&self) -> std::result::Result<(), BackendError>;

    fn is_ready(&self) -> bool {
        self.probe().is_ok()
    }
}

/// Environment whose readiness is a successful connect and close
pub struct BackendEnvironment<B: Backend> {
    backend: Arc<B>,
    target: Target,
}

impl<B: Backend> BackendEnvironment<B> {
    pub fn new(backend: Arc<B>, target: Target) -> Self {
        Self { backend, target }
    }
}

impl<B: Backend> Environment for BackendEnvironment<B> {
    fn target(&self) -> &Target {
        &self.target
    }

    fn probe(&self) -> std::result::Result<(), BackendError> {
        let conn = self.backend.connect(&self.target)?;
        if let Err(e) = self.backend.close(conn) {
            debug!(error = %e, "Ignoring close error after readiness probe");
        }
        Ok(())
    }
}

/// Poll `env` until it is ready or `timeout` elapses
///
/// At least one probe is always made. Returns how long readiness took.
pub fn wait_until_ready(env: &dyn Environment, timeout: Duration, poll: Duration) -> Result<Duration> {
    let start = Instant::now();
    let mut probes = 0u32;

    loop {
        probes += 1;
        let error = match env.probe() {
            Ok(()) => {
                let waited = start.elapsed();
                info!(endpoint = %env.target(), probes, ?waited, "Backend is ready");
                return Ok(waited);
            }
            Err(e) => e,
        };
        debug!(endpoint = %env.target(), probes, error = %error, "Backend not ready yet");

        let waited = start.elapsed();
        if waited >= timeout {
            return Err(HammerError::NotReady {
                waited,
                last_error: Some(error.to_string()),
            });
        }
        thread::sleep(poll.min(timeout - waited));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        target: Target,
        failures_left: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                target: Target::new("sim://flaky"),
                failures_left: AtomicU32::new(failures),
            }
        }
    }

    impl Environment for Flaky {
        fn target(&self) -> &Target {
            &self.target
        }

        fn probe(&self) -> std::result::Result<(), BackendError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left == 0 {
                return Ok(());
            }
            self.failures_left.store(left - 1, Ordering::SeqCst);
            Err(BackendError::Connect {
                target: self.target.redacted(),
                message: "still starting".to_string(),
            })
        }
    }

    #[test]
    fn test_ready_immediately() {
        let env = Flaky::new(0);
        let waited = wait_until_ready(&env, Duration::ZERO, Duration::from_millis(10)).unwrap();
        assert!(waited < Duration::from_secs(1));
        assert!(env.is_ready());
    }

    #[test]
    fn test_ready_after_retries() {
        let env = Flaky::new(3);
        let result = wait_until_ready(&env, Duration::from_secs(5), Duration::from_millis(5));
        assert!(result.is_ok());
        assert_eq!(env.failures_left.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_not_ready_reports_last_error() {
        let env = Flaky::new(u32::MAX);
        let err = wait_until_ready(&env, Duration::from_millis(50), Duration::from_millis(10))
            .unwrap_err();

        match err {
            HammerError::NotReady { waited, last_error } => {
                assert!(waited >= Duration::from_millis(50));
                assert!(last_error.unwrap().contains("still starting"));
            }
            other => panic!("expected NotReady, got {:?}", other),
        }
    }

    #[test]
    fn test_backend_environment_probe() {
        use crate::backend::{SimBackend, SimConfig};

        let backend = Arc::new(SimBackend::new(SimConfig::default()));
        let env = BackendEnvironment::new(backend.clone(), Target::new("sim://local"));

        assert!(env.is_ready());
        assert_eq!(backend.connects(), 1);
        assert_eq!(backend.closes(), 1);
        assert_eq!(env.target().as_str(), "sim://local");
    }
}
