/*!
 * Run orchestration: readiness, pool setup, hammer, teardown
 */

use std::sync::Arc;
use std::time::Duration;

use dbhammer_core_pool::ConnectionPool;
use tracing::{info, warn};

use crate::backend::{build_pool, Backend, SimBackend};
use crate::config::{BackendKind, HammerConfig};
use crate::core::{Hammer, StopHandle};
use crate::environment::{wait_until_ready, BackendEnvironment};
use crate::error::Result;
use crate::report::RunReport;

#[cfg(feature = "sqlite")]
use crate::backend::SqliteBackend;

/// Closes the pool when dropped, whatever happened in between
struct PoolGuard<T: Send + 'static>(Arc<ConnectionPool<T>>);

impl<T: Send + 'static> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// A hammer whose environment is ready and whose pool is populated
pub struct PreparedRun<B: Backend> {
    hammer: Hammer<B>,
    pool: PoolGuard<B::Connection>,
    config: HammerConfig,
    backend_name: &'static str,
}

impl<B: Backend> PreparedRun<B> {
    /// Handle for cancelling the run once it has started
    pub fn stop_handle(&self) -> StopHandle {
        self.hammer.stop_handle()
    }

    /// Run the hammer and close the pool
    pub fn run(self) -> RunReport {
        let PreparedRun {
            hammer,
            pool,
            config,
            backend_name,
        } = self;

        let result = hammer.run();
        let stats = pool.0.stats();
        if stats.is_degraded() {
            warn!(live = stats.live, capacity = stats.capacity, "Pool finished below capacity");
        }
        drop(pool);

        let report = RunReport::from_result(&result, &config, backend_name);
        report.log();
        report
    }
}

/// Wait for the environment, build the pool, and construct the hammer
pub fn prepare<B: Backend>(backend: Arc<B>, config: &HammerConfig) -> Result<PreparedRun<B>> {
    config.validate()?;

    let limits = config.limits();
    if limits.is_unbounded() {
        warn!("No duration or iteration limit set; the run ends only on failure or cancellation");
    }

    let target = config.target();
    let environment = BackendEnvironment::new(backend.clone(), target.clone());
    wait_until_ready(&environment, config.ready_timeout(), config.ready_poll())?;

    info!(
        backend = backend.name(),
        endpoint = %target,
        pool_size = config.pool_size,
        "Populating connection pool"
    );
    let pool = Arc::new(build_pool(backend.clone(), target, config.pool_config())?);
    let guard = PoolGuard(pool.clone());

    let backend_name = backend.name();
    let hammer = Hammer::new(pool, backend, config.operation(), limits)?;

    Ok(PreparedRun {
        hammer,
        pool: guard,
        config: config.clone(),
        backend_name,
    })
}

/// Run the configured backend to completion
pub fn run(config: &HammerConfig) -> Result<RunReport> {
    run_with(config, |_| {})
}

/// Like [`run`], handing the stop handle to `on_start` just before workers start
pub fn run_with<F: FnOnce(StopHandle)>(config: &HammerConfig, on_start: F) -> Result<RunReport> {
    match config.backend {
        BackendKind::Sim => {
            let backend = Arc::new(SimBackend::new(config.sim.clone()));
            Ok(start(prepare(backend, config)?, on_start))
        }
        BackendKind::Sqlite => run_sqlite(config, on_start),
    }
}

fn start<B: Backend, F: FnOnce(StopHandle)>(prepared: PreparedRun<B>, on_start: F) -> RunReport {
    on_start(prepared.stop_handle());
    prepared.run()
}

/// Wait until the configured backend accepts connections
pub fn check(config: &HammerConfig) -> Result<Duration> {
    config.validate()?;
    match config.backend {
        BackendKind::Sim => {
            let backend = Arc::new(SimBackend::new(config.sim.clone()));
            check_backend(backend, config)
        }
        BackendKind::Sqlite => check_sqlite(config),
    }
}

fn check_backend<B: Backend>(backend: Arc<B>, config: &HammerConfig) -> Result<Duration> {
    let environment = BackendEnvironment::new(backend, config.target());
    wait_until_ready(&environment, config.ready_timeout(), config.ready_poll())
}

#[cfg(feature = "sqlite")]
fn sqlite_backend(config: &HammerConfig) -> Arc<SqliteBackend> {
    Arc::new(
        SqliteBackend::new().with_busy_timeout(Duration::from_millis(config.sqlite_busy_timeout_ms)),
    )
}

#[cfg(feature = "sqlite")]
fn run_sqlite<F: FnOnce(StopHandle)>(config: &HammerConfig, on_start: F) -> Result<RunReport> {
    Ok(start(prepare(sqlite_backend(config), config)?, on_start))
}

#[cfg(feature = "sqlite")]
fn check_sqlite(config: &HammerConfig) -> Result<Duration> {
    check_backend(sqlite_backend(config), config)
}

#[cfg(not(feature = "sqlite"))]
fn run_sqlite<F: FnOnce(StopHandle)>(_config: &HammerConfig, _on_start: F) -> Result<RunReport> {
    Err(sqlite_unavailable())
}

#[cfg(not(feature = "sqlite"))]
fn check_sqlite(_config: &HammerConfig) -> Result<Duration> {
    Err(sqlite_unavailable())
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_unavailable() -> crate::error::HammerError {
    crate::error::HammerError::Config(
        "this build does not include the sqlite backend (enable the `sqlite` feature)".to_string(),
    )
}
