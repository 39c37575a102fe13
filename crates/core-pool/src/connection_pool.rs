//! Fixed-capacity connection pool for blocking workers
//!
//! The pool is populated eagerly to its full capacity and never grows or
//! shrinks on its own. Idle connections are handed out last-in-first-out so
//! that recently used (warm) connections are reused first. A connection that
//! is suspected broken is invalidated: it is closed and a fresh replacement is
//! created in its slot, keeping the number of live connections constant.

use super::error::{BoxError, PoolError};
use parking_lot::{Condvar, Mutex};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Configuration for pool behaviour
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of connections created up front and kept for the pool's lifetime
    pub capacity: usize,
    /// Default wait used by [`ConnectionPool::checkout_default`]
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            acquire_timeout: Duration::from_secs(1),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given capacity and default timeout
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Factory for creating and closing pooled connections
///
/// Implementations are bound to a single backend target; every call to
/// [`create`](ConnectionFactory::create) opens a new session against it.
pub trait ConnectionFactory<T: Send + 'static>: Send + Sync {
    /// Open a new connection
    fn create(&self) -> Result<T, BoxError>;

    /// Close a connection. Failures are reported but never fatal to the pool.
    fn close(&self, conn: T) -> Result<(), BoxError> {
        drop(conn);
        Ok(())
    }
}

/// Internal pool state, guarded by the pool mutex
struct PoolState<T> {
    /// Idle connections; the back of the vector is the most recently released
    idle: Vec<T>,
    /// Connections currently handed out (or being replaced)
    checked_out: usize,
    /// Set once by `close()`
    closed: bool,
}

impl<T> PoolState<T> {
    fn live(&self) -> usize {
        self.idle.len() + self.checked_out
    }

    fn take_idle(&mut self) -> Option<T> {
        let conn = self.idle.pop()?;
        self.checked_out += 1;
        Some(conn)
    }
}

/// A fixed-capacity, thread-safe connection pool
///
/// # Example
/// ```
/// use dbhammer_core_pool::{BoxError, ConnectionFactory, ConnectionPool, PoolConfig};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// struct Numbered;
///
/// impl ConnectionFactory<u32> for Numbered {
///     fn create(&self) -> Result<u32, BoxError> {
///         Ok(7)
///     }
/// }
///
/// let pool = ConnectionPool::new(Arc::new(Numbered), PoolConfig::new(2)).unwrap();
/// let conn = pool.acquire(Duration::from_millis(10)).unwrap();
/// assert_eq!(pool.stats().idle, 1);
/// pool.release(conn);
/// pool.close();
/// ```
pub struct ConnectionPool<T: Send + 'static> {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory<T>>,
    state: Mutex<PoolState<T>>,
    available: Condvar,
}

impl<T: Send + 'static> ConnectionPool<T> {
    /// Create a pool and eagerly open `config.capacity` connections
    ///
    /// Either every connection is created or an error is returned; any
    /// connections opened before the failure are closed first.
    pub fn new(
        factory: Arc<dyn ConnectionFactory<T>>,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        let capacity = config.capacity;
        if capacity == 0 {
            return Err(PoolError::InvalidCapacity(capacity));
        }

        let mut idle = Vec::with_capacity(capacity);
        for index in 0..capacity {
            match factory.create() {
                Ok(conn) => idle.push(conn),
                Err(source) => {
                    warn!(
                        created = idle.len(),
                        capacity,
                        error = %source,
                        "Connection creation failed during pool initialisation"
                    );
                    for conn in idle.drain(..) {
                        close_quietly(factory.as_ref(), conn);
                    }
                    return Err(PoolError::Init {
                        index: index + 1,
                        capacity,
                        source,
                    });
                }
            }
        }

        debug!(capacity, "Connection pool populated");

        Ok(Self {
            config,
            factory,
            state: Mutex::new(PoolState {
                idle,
                checked_out: 0,
                closed: false,
            }),
            available: Condvar::new(),
        })
    }

    /// Take a connection, waiting up to `timeout` for one to be released
    pub fn acquire(&self, timeout: Duration) -> Result<T, PoolError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Err(PoolError::Closed);
            }
            if let Some(conn) = state.take_idle() {
                return Ok(conn);
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                // A release may have raced the deadline
                if !state.closed {
                    if let Some(conn) = state.take_idle() {
                        return Ok(conn);
                    }
                }
                trace!(?timeout, "Timed out waiting for a pooled connection");
                return Err(PoolError::Timeout(timeout));
            }
        }
    }

    /// Take a connection only if one is idle right now
    pub fn try_acquire(&self) -> Option<T> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.take_idle()
    }

    /// Return a healthy connection to the pool
    ///
    /// Never blocks. A connection released after [`close`](Self::close) is
    /// closed instead of stored.
    pub fn release(&self, conn: T) {
        let mut state = self.state.lock();
        debug_assert!(state.checked_out > 0, "release without matching acquire");
        state.checked_out = state.checked_out.saturating_sub(1);

        if state.closed {
            drop(state);
            close_quietly(self.factory.as_ref(), conn);
            return;
        }

        state.idle.push(conn);
        drop(state);
        self.available.notify_one();
    }

    /// Close a broken connection and store a fresh replacement in its slot
    ///
    /// The close is best-effort. If the replacement cannot be created the
    /// pool is left with fewer live connections than its capacity and
    /// [`PoolError::Replenish`] is returned.
    pub fn invalidate(&self, conn: T) -> Result<(), PoolError> {
        close_quietly(self.factory.as_ref(), conn);

        // The slot stays counted as checked out until the replacement lands,
        // so the live total can never exceed capacity.
        let created = self.factory.create();

        let mut state = self.state.lock();
        state.checked_out = state.checked_out.saturating_sub(1);

        match created {
            Ok(replacement) => {
                if state.closed {
                    drop(state);
                    close_quietly(self.factory.as_ref(), replacement);
                    return Ok(());
                }
                state.idle.push(replacement);
                drop(state);
                self.available.notify_one();
                debug!("Replaced invalidated connection");
                Ok(())
            }
            Err(source) => {
                let live = state.live();
                drop(state);
                warn!(
                    live,
                    capacity = self.config.capacity,
                    error = %source,
                    "Could not replace invalidated connection"
                );
                Err(PoolError::Replenish {
                    live,
                    capacity: self.config.capacity,
                    source,
                })
            }
        }
    }

    /// Acquire a connection wrapped in a guard that releases it on drop
    pub fn checkout(&self, timeout: Duration) -> Result<PooledConnection<'_, T>, PoolError> {
        let conn = self.acquire(timeout)?;
        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    /// [`checkout`](Self::checkout) using the configured acquire timeout
    pub fn checkout_default(&self) -> Result<PooledConnection<'_, T>, PoolError> {
        self.checkout(self.config.acquire_timeout)
    }

    /// Drain and close every idle connection
    ///
    /// Connections currently checked out are closed when they come back.
    /// Calling this more than once is harmless.
    pub fn close(&self) {
        let drained = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.idle)
        };
        self.available.notify_all();

        let count = drained.len();
        for conn in drained {
            close_quietly(self.factory.as_ref(), conn);
        }

        if count > 0 {
            debug!(closed = count, "Connection pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            idle: state.idle.len(),
            checked_out: state.checked_out,
            live: state.live(),
            capacity: self.config.capacity,
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for ConnectionPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn close_quietly<T: Send + 'static>(factory: &dyn ConnectionFactory<T>, conn: T) {
    if let Err(e) = factory.close(conn) {
        debug!(error = %e, "Ignoring error while closing connection");
    }
}

/// A checked-out connection that returns to its pool when dropped
pub struct PooledConnection<'a, T: Send + 'static> {
    pool: &'a ConnectionPool<T>,
    conn: Option<T>,
}

impl<T: Send + 'static> PooledConnection<'_, T> {
    /// Discard this connection as broken and replace it in the pool
    pub fn invalidate(mut self) -> Result<(), PoolError> {
        match self.conn.take() {
            Some(conn) => self.pool.invalidate(conn),
            None => Ok(()),
        }
    }
}

impl<T: Send + 'static> Deref for PooledConnection<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.conn.as_ref().expect("pooled connection already returned")
    }
}

impl<T: Send + 'static> DerefMut for PooledConnection<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.conn.as_mut().expect("pooled connection already returned")
    }
}

impl<T: Send + 'static> Drop for PooledConnection<'_, T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections waiting in the pool
    pub idle: usize,
    /// Connections handed out to callers
    pub checked_out: usize,
    /// Idle plus checked out
    pub live: usize,
    /// Configured capacity
    pub capacity: usize,
}

impl PoolStats {
    /// Share of capacity currently checked out, as a percentage
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            (self.checked_out as f64 / self.capacity as f64) * 100.0
        }
    }

    /// True when an invalidated connection could not be replaced
    pub fn is_degraded(&self) -> bool {
        self.live < self.capacity
    }
}
