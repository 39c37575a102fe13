/*!
 * dbhammer - concurrent query hammer
 *
 * Reproduces low-probability concurrency defects in a database by running
 * one operation from many threads over a shared, fixed-size connection pool
 * until the first failure is observed or a budget runs out:
 * - Eagerly populated LIFO connection pool with invalidate-and-replace
 * - Exact attempt ceiling and wall-clock ceiling shared by all workers
 * - First failure captured atomically across workers
 * - Simulated and SQLite backends
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

pub mod backend;
pub mod commands;
pub mod config;
pub mod core;
pub mod environment;
pub mod error;
pub mod logging;
pub mod report;
pub mod runner;
pub mod signal;

// Re-export commonly used types
pub use backend::{Backend, BackendError, Operation, SimBackend, SimConfig, Target};
#[cfg(feature = "sqlite")]
pub use backend::SqliteBackend;
pub use config::{BackendKind, HammerConfig, LogLevel};
pub use self::core::{Failure, Hammer, HammerLimits, HammerResult, StopHandle, StopReason};
pub use environment::{wait_until_ready, BackendEnvironment, Environment};
pub use error::{HammerError, Result};
pub use report::{RunReport, Verdict};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
