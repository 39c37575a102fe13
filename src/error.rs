/*!
 * Error types for dbhammer
 *
 * Only setup failures surface as errors. Failures observed while the hammer
 * is running are data, folded into the run result.
 */

use std::fmt;
use std::io;
use std::time::Duration;

use dbhammer_core_pool::PoolError;

use crate::backend::BackendError;

pub type Result<T> = std::result::Result<T, HammerError>;

/// Exit code constants for structured process exit
///
/// A run that reaches its ceiling without observing a failure is
/// inconclusive, never a pass.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_INCONCLUSIVE: i32 = 0;
pub const EXIT_REPRODUCED: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug)]
pub enum HammerError {
    /// Invalid configuration
    Config(String),

    /// Connection pool could not be built or reached an unusable state
    Pool(PoolError),

    /// Backend error outside of the hammer loop
    Backend(BackendError),

    /// Environment never became ready
    NotReady {
        waited: Duration,
        last_error: Option<String>,
    },

    /// I/O error
    Io(io::Error),

    /// Report or config (de)serialization error
    Serialization(String),

    /// Generic error with message
    Other(String),
}

impl HammerError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        // Every error variant means the experiment could not run
        EXIT_FATAL
    }

    /// True when the pool failed to reach its configured capacity
    pub fn is_pool_init_failure(&self) -> bool {
        matches!(self, HammerError::Pool(e) if e.is_init_failure())
    }
}

impl fmt::Display for HammerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HammerError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            HammerError::Pool(err) => {
                write!(f, "Connection pool error: {}", err)
            }
            HammerError::Backend(err) => {
                write!(f, "Backend error: {}", err)
            }
            HammerError::NotReady { waited, last_error } => {
                write!(f, "Backend not ready after {:.1}s", waited.as_secs_f64())?;
                if let Some(last) = last_error {
                    write!(f, " (last error: {})", last)?;
                }
                Ok(())
            }
            HammerError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            HammerError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            HammerError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for HammerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HammerError::Pool(err) => Some(err),
            HammerError::Backend(err) => Some(err),
            HammerError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for HammerError {
    fn from(err: io::Error) -> Self {
        HammerError::Io(err)
    }
}

impl From<PoolError> for HammerError {
    fn from(err: PoolError) -> Self {
        HammerError::Pool(err)
    }
}

impl From<BackendError> for HammerError {
    fn from(err: BackendError) -> Self {
        HammerError::Backend(err)
    }
}

impl From<serde_json::Error> for HammerError {
    fn from(err: serde_json::Error) -> Self {
        HammerError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for HammerError {
    fn from(err: toml::de::Error) -> Self {
        HammerError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for HammerError {
    fn from(err: toml::ser::Error) -> Self {
        HammerError::Serialization(format!("TOML error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_exit_code_constants() {
        assert_eq!(EXIT_SUCCESS, 0);
        assert_eq!(EXIT_INCONCLUSIVE, 0);
        assert_eq!(EXIT_REPRODUCED, 1);
        assert_eq!(EXIT_FATAL, 2);
        assert_eq!(EXIT_CANCELLED, 130);
    }

    #[test]
    fn test_all_errors_are_fatal() {
        let errors = vec![
            HammerError::Config("threads".to_string()),
            HammerError::Pool(PoolError::InvalidCapacity(0)),
            HammerError::Backend(BackendError::NoRows),
            HammerError::NotReady {
                waited: Duration::from_secs(3),
                last_error: None,
            },
            HammerError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")),
            HammerError::Serialization("bad".to_string()),
            HammerError::Other("other".to_string()),
        ];

        for err in errors {
            assert_eq!(err.exit_code(), EXIT_FATAL, "{:?}", err);
        }
    }

    #[test]
    fn test_pool_init_failure_detection() {
        assert!(HammerError::Pool(PoolError::InvalidCapacity(0)).is_pool_init_failure());
        assert!(!HammerError::Pool(PoolError::Closed).is_pool_init_failure());
        assert!(!HammerError::Config("x".to_string()).is_pool_init_failure());
    }

    #[test]
    fn test_display() {
        let err = HammerError::Config("thread count must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: thread count must be positive"
        );

        let err = HammerError::NotReady {
            waited: Duration::from_millis(1500),
            last_error: Some("connection refused".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Backend not ready after 1.5s (last error: connection refused)"
        );

        let err = HammerError::Other("something unexpected".to_string());
        assert_eq!(err.to_string(), "something unexpected");
    }

    #[test]
    fn test_from_conversions() {
        let err: HammerError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, HammerError::Io(_)));
        assert!(err.source().is_some());

        let err: HammerError = PoolError::Closed.into();
        assert!(matches!(err, HammerError::Pool(PoolError::Closed)));
        assert!(err.source().is_some());

        let json_err = serde_json::from_str::<serde_json::Value>("not valid json")
            .expect_err("should fail to parse invalid JSON");
        let err: HammerError = json_err.into();
        assert!(matches!(err, HammerError::Serialization(_)));

        let toml_err = toml::from_str::<toml::Value>("= broken").expect_err("invalid toml");
        let err: HammerError = toml_err.into();
        assert!(matches!(err, HammerError::Config(ref msg) if msg.contains("TOML")));
    }

    #[test]
    fn test_source_absent_for_message_variants() {
        assert!(HammerError::Config("c".to_string()).source().is_none());
        assert!(HammerError::Other("o".to_string()).source().is_none());
        assert!(HammerError::NotReady {
            waited: Duration::ZERO,
            last_error: None
        }
        .source()
        .is_none());
    }
}
