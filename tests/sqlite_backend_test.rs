//! Hammer runs against a real SQLite database file

#![cfg(feature = "sqlite")]

use dbhammer::backend::build_pool;
use dbhammer::runner;
use dbhammer::{
    Backend, BackendKind, Hammer, HammerConfig, HammerLimits, Operation, SqliteBackend,
    StopReason, Target, Verdict,
};
use dbhammer_core_pool::PoolConfig;
use rusqlite::Connection;
use std::sync::Arc;
use tempfile::TempDir;

fn seeded_database(dir: &TempDir) -> Target {
    let path = dir.path().join("orders.sqlite3");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, amount REAL NOT NULL);
         INSERT INTO orders (amount) VALUES (10.5), (20.25), (3.0);",
    )
    .unwrap();
    Target::new(path.to_string_lossy().into_owned())
}

#[test]
fn test_concurrent_reads_reach_ceiling() {
    let dir = TempDir::new().unwrap();
    let target = seeded_database(&dir);
    let backend = Arc::new(SqliteBackend::new());
    let pool = Arc::new(build_pool(backend.clone(), target, PoolConfig::new(3)).unwrap());

    let hammer = Hammer::new(
        pool.clone(),
        backend,
        Operation::new("SELECT count(*), sum(amount) FROM orders"),
        HammerLimits::new(6).with_max_attempts(600),
    )
    .unwrap();
    let result = hammer.run();

    assert_eq!(result.successes, 600);
    assert!(!result.reproduced());
    assert_eq!(result.stop_reason, Some(StopReason::AttemptCeiling));
    pool.close();
}

#[test]
fn test_empty_result_is_reproduced_as_failure() {
    let dir = TempDir::new().unwrap();
    let target = seeded_database(&dir);
    let backend = Arc::new(SqliteBackend::new());
    let pool = Arc::new(build_pool(backend.clone(), target, PoolConfig::new(2)).unwrap());

    let hammer = Hammer::new(
        pool.clone(),
        backend,
        Operation::new("SELECT id FROM orders WHERE amount > 1000"),
        HammerLimits::new(2).with_max_attempts(100),
    )
    .unwrap();
    let result = hammer.run();

    assert!(result.reproduced());
    assert!(result.first_failure.unwrap().message.contains("no rows"));
    // The failing connection was replaced by a fresh one
    assert_eq!(pool.stats().live, 2);
    pool.close();
}

#[test]
fn test_row_values_are_rendered() {
    let dir = TempDir::new().unwrap();
    let target = seeded_database(&dir);
    let backend = SqliteBackend::new();
    let mut conn = backend.connect(&target).unwrap();

    let row = backend
        .execute(
            &mut conn,
            &Operation::new("SELECT id, amount FROM orders ORDER BY id LIMIT 1"),
        )
        .unwrap();
    assert_eq!(row, vec!["1".to_string(), "10.5".to_string()]);
    backend.close(conn).unwrap();
}

#[test]
fn test_runner_with_sqlite_config() {
    let dir = TempDir::new().unwrap();
    let target = seeded_database(&dir);
    let config = HammerConfig {
        backend: BackendKind::Sqlite,
        target: target.as_str().to_string(),
        operation: "SELECT max(amount) FROM orders".to_string(),
        threads: 4,
        pool_size: 2,
        max_iterations: 250,
        ready_timeout_secs: 2,
        ..Default::default()
    };

    let report = runner::run(&config).unwrap();

    assert_eq!(report.verdict, Verdict::Inconclusive);
    assert_eq!(report.successes, 250);
    assert_eq!(report.backend, "sqlite");
}
