//! Error types for pool operations

use std::time::Duration;

/// Boxed error returned by a [`ConnectionFactory`](crate::ConnectionFactory)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by [`ConnectionPool`](crate::ConnectionPool)
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Pool was configured with no connections
    #[error("pool capacity must be positive, got {0}")]
    InvalidCapacity(usize),

    /// Eager population failed; no pool was built
    #[error("failed to create connection {index} of {capacity} during pool initialisation: {source}")]
    Init {
        index: usize,
        capacity: usize,
        #[source]
        source: BoxError,
    },

    /// A replacement for an invalidated connection could not be created.
    /// The pool now holds fewer live connections than its capacity.
    #[error("failed to replace invalidated connection (pool degraded to {live} of {capacity}): {source}")]
    Replenish {
        live: usize,
        capacity: usize,
        #[source]
        source: BoxError,
    },

    /// No connection became available in time
    #[error("timed out after {0:?} waiting for a pooled connection")]
    Timeout(Duration),

    /// The pool has been closed
    #[error("connection pool is closed")]
    Closed,
}

impl PoolError {
    /// True for errors that mean the pool cannot reach its configured capacity
    pub fn is_init_failure(&self) -> bool {
        matches!(
            self,
            PoolError::InvalidCapacity(_) | PoolError::Init { .. } | PoolError::Replenish { .. }
        )
    }

    /// True for the recoverable acquire timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_failure_classification() {
        assert!(PoolError::InvalidCapacity(0).is_init_failure());
        assert!(PoolError::Init {
            index: 1,
            capacity: 4,
            source: "refused".into(),
        }
        .is_init_failure());
        assert!(PoolError::Replenish {
            live: 3,
            capacity: 4,
            source: "refused".into(),
        }
        .is_init_failure());

        assert!(!PoolError::Timeout(Duration::from_secs(1)).is_init_failure());
        assert!(!PoolError::Closed.is_init_failure());
    }

    #[test]
    fn test_timeout_is_recoverable() {
        let err = PoolError::Timeout(Duration::from_millis(250));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn test_display_includes_source() {
        let err = PoolError::Init {
            index: 2,
            capacity: 8,
            source: "connection refused".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2 of 8"));
        assert!(msg.contains("connection refused"));
    }
}
