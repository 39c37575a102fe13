/*!
 * Configuration types for dbhammer
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dbhammer_core_pool::PoolConfig;

use crate::backend::{Operation, SimConfig, Target};
use crate::core::HammerLimits;
use crate::error::{HammerError, Result};

/// Main configuration for a hammer run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HammerConfig {
    /// Number of concurrent worker threads
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Number of connections kept in the pool
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Wall-clock budget in seconds (0 = run until failure)
    #[serde(default = "default_max_seconds")]
    pub max_seconds: u64,

    /// Attempt budget (0 = unlimited)
    #[serde(default)]
    pub max_iterations: u64,

    /// How long a worker waits for a pooled connection, in milliseconds
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Log progress every this many attempts (0 = never)
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,

    /// Backend to hammer
    #[serde(default)]
    pub backend: BackendKind,

    /// Connection descriptor handed to the backend
    #[serde(default = "default_target")]
    pub target: String,

    /// Statement executed on every attempt
    #[serde(default = "default_operation")]
    pub operation: String,

    /// How long `check` and `run` wait for the backend to accept connections
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    /// Delay between readiness probes, in milliseconds
    #[serde(default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,

    /// Busy timeout for sqlite connections, in milliseconds
    #[serde(default = "default_sqlite_busy_timeout_ms")]
    pub sqlite_busy_timeout_ms: u64,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,

    /// Print the run report as JSON
    #[serde(default)]
    pub json: bool,

    /// Behaviour of the simulated backend
    #[serde(default)]
    pub sim: SimConfig,
}

impl Default for HammerConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            pool_size: default_pool_size(),
            max_seconds: default_max_seconds(),
            max_iterations: 0,
            acquire_timeout_ms: default_acquire_timeout_ms(),
            progress_every: default_progress_every(),
            backend: BackendKind::default(),
            target: default_target(),
            operation: default_operation(),
            ready_timeout_secs: default_ready_timeout_secs(),
            ready_poll_ms: default_ready_poll_ms(),
            sqlite_busy_timeout_ms: default_sqlite_busy_timeout_ms(),
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
            json: false,
            sim: SimConfig::default(),
        }
    }
}

/// Which backend implementation to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process simulation with injectable failures
    #[default]
    Sim,

    /// SQLite database file
    Sqlite,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Sim => write!(f, "sim"),
            BackendKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_threads() -> usize {
    8
}

fn default_pool_size() -> usize {
    16
}

fn default_max_seconds() -> u64 {
    300
}

fn default_acquire_timeout_ms() -> u64 {
    1000
}

fn default_progress_every() -> u64 {
    100
}

fn default_target() -> String {
    "sim://localhost".to_string()
}

fn default_operation() -> String {
    "SELECT 1".to_string()
}

fn default_ready_timeout_secs() -> u64 {
    60
}

fn default_ready_poll_ms() -> u64 {
    500
}

fn default_sqlite_busy_timeout_ms() -> u64 {
    5000
}

impl HammerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: HammerConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject settings the hammer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(HammerError::Config(
                "thread count must be at least 1".to_string(),
            ));
        }
        if self.pool_size == 0 {
            return Err(HammerError::Config(
                "pool size must be at least 1".to_string(),
            ));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(HammerError::Config(
                "acquire timeout must be positive".to_string(),
            ));
        }
        if self.ready_poll_ms == 0 {
            return Err(HammerError::Config(
                "readiness poll interval must be positive".to_string(),
            ));
        }
        if self.target.trim().is_empty() {
            return Err(HammerError::Config("target must not be empty".to_string()));
        }
        if self.operation.trim().is_empty() {
            return Err(HammerError::Config(
                "operation must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.sim.failure_rate) {
            return Err(HammerError::Config(format!(
                "sim failure rate must be between 0 and 1, got {}",
                self.sim.failure_rate
            )));
        }
        if self.sim.fail_on == Some(0) {
            return Err(HammerError::Config(
                "sim fail_on counts from 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Attempt ceiling, if any
    pub fn max_attempts(&self) -> Option<u64> {
        (self.max_iterations > 0).then_some(self.max_iterations)
    }

    /// Wall-clock ceiling, if any
    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_seconds > 0).then(|| Duration::from_secs(self.max_seconds))
    }

    /// Budget handed to the workload driver
    pub fn limits(&self) -> HammerLimits {
        HammerLimits {
            threads: self.threads,
            max_attempts: self.max_attempts(),
            max_duration: self.max_duration(),
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            progress_every: self.progress_every,
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.pool_size)
            .with_acquire_timeout(Duration::from_millis(self.acquire_timeout_ms))
    }

    pub fn target(&self) -> Target {
        Target::new(self.target.clone())
    }

    pub fn operation(&self) -> Operation {
        Operation::new(self.operation.clone())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }

    /// Create a configuration for a short smoke run against the simulator
    pub fn smoke_preset() -> Self {
        Self {
            threads: 2,
            pool_size: 2,
            max_seconds: 5,
            max_iterations: 1000,
            progress_every: 0,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HammerConfig::default();
        assert_eq!(config.threads, 8);
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.max_seconds, 300);
        assert_eq!(config.max_iterations, 0);
        assert_eq!(config.backend, BackendKind::Sim);
        assert_eq!(config.operation, "SELECT 1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_means_no_ceiling() {
        let config = HammerConfig {
            max_seconds: 0,
            max_iterations: 0,
            ..Default::default()
        };
        let limits = config.limits();
        assert!(limits.max_attempts.is_none());
        assert!(limits.max_duration.is_none());
        assert!(limits.is_unbounded());

        let config = HammerConfig {
            max_seconds: 10,
            max_iterations: 500,
            ..Default::default()
        };
        let limits = config.limits();
        assert_eq!(limits.max_attempts, Some(500));
        assert_eq!(limits.max_duration, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad = [
            HammerConfig {
                threads: 0,
                ..Default::default()
            },
            HammerConfig {
                pool_size: 0,
                ..Default::default()
            },
            HammerConfig {
                acquire_timeout_ms: 0,
                ..Default::default()
            },
            HammerConfig {
                target: "  ".to_string(),
                ..Default::default()
            },
            HammerConfig {
                operation: String::new(),
                ..Default::default()
            },
            HammerConfig {
                sim: SimConfig {
                    failure_rate: 1.5,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];

        for config in bad {
            assert!(
                matches!(config.validate(), Err(HammerError::Config(_))),
                "{:?}",
                config
            );
        }
    }

    #[test]
    fn test_pool_config() {
        let config = HammerConfig {
            pool_size: 3,
            acquire_timeout_ms: 250,
            ..Default::default()
        };
        let pool = config.pool_config();
        assert_eq!(pool.capacity, 3);
        assert_eq!(pool.acquire_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_serialization() {
        let config = HammerConfig {
            backend: BackendKind::Sqlite,
            log_file: Some(PathBuf::from("/tmp/hammer.log")),
            sim: SimConfig {
                fail_on: Some(9),
                ..Default::default()
            },
            ..Default::default()
        };
        let toml = toml::to_string(&config).unwrap();
        let deserialized: HammerConfig = toml::from_str(&toml).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dbhammer.toml");

        let config = HammerConfig::smoke_preset();
        config.to_file(&path).unwrap();
        let loaded = HammerConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = HammerConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, HammerError::Io(_)));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml_str = r#"
threads = 32
backend = "sqlite"
target = "/var/lib/dbhammer/target.sqlite3"
operation = "SELECT count(*) FROM orders"

[sim]
latency_ms = 5
"#;

        let config: HammerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.threads, 32);
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.sim.latency_ms, 5);
        assert_eq!(config.sim.failure_rate, 0.0);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
