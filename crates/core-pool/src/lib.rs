//! dbhammer core pool: fixed-capacity connection pooling for stress workers
//!
//! # Overview
//!
//! This crate provides the connection pool shared by the hammer's worker
//! threads. It is **pure logic** with zero knowledge of any particular
//! database: connections are opaque values produced by a
//! [`ConnectionFactory`].
//!
//! - **Eager population**: every connection is opened before first use.
//! - **LIFO checkout**: the most recently released connection is handed out
//!   first, keeping warm sessions busy.
//! - **Invalidation**: a broken connection is closed and replaced in place,
//!   so the pool never runs below capacity unless a replacement fails.
//! - **Best-effort teardown**: close errors are logged and swallowed.
//!
//! ```text
//!            acquire / checkout
//!   worker ◄───────────────────── ┌──────────────┐
//!     │                           │  idle (LIFO) │ ◄── eager population
//!     ├── release ──────────────► └──────────────┘
//!     │                                  ▲
//!     └── invalidate ── close ── create ─┘
//! ```
//!
//! # Usage Example
//!
//! ```
//! use dbhammer_core_pool::{BoxError, ConnectionFactory, ConnectionPool, PoolConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Session;
//! struct SessionFactory;
//!
//! impl ConnectionFactory<Session> for SessionFactory {
//!     fn create(&self) -> Result<Session, BoxError> {
//!         Ok(Session)
//!     }
//! }
//!
//! let config = PoolConfig::new(4).with_acquire_timeout(Duration::from_millis(100));
//! let pool = ConnectionPool::new(Arc::new(SessionFactory), config)?;
//!
//! {
//!     let _conn = pool.checkout_default()?;
//!     // use the connection; it returns to the pool on drop
//! }
//!
//! pool.close();
//! # Ok::<(), dbhammer_core_pool::PoolError>(())
//! ```

pub mod connection_pool;
pub mod error;

pub use connection_pool::{ConnectionFactory, ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use error::{BoxError, PoolError};

/// Prelude module for convenient imports
pub mod prelude {
    pub use super::connection_pool::{ConnectionFactory, ConnectionPool, PoolConfig, PooledConnection};
    pub use super::error::{BoxError, PoolError};
}
