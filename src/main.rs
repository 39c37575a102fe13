/*!
 * dbhammer CLI - Command Line Interface
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

use clap::{Args, Parser, Subcommand, ValueEnum};
use dbhammer::{
    commands::init::write_default_config,
    config::{BackendKind, HammerConfig, LogLevel},
    error::{HammerError, Result, EXIT_SUCCESS},
    logging, report::format_duration, runner, signal,
};
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser)]
#[command(name = "dbhammer")]
#[command(version, about = "Hammer a database with one concurrent query until it breaks", long_about = None)]
struct Cli {
    /// Configuration file (TOML); command-line flags override its values
    #[arg(short = 'c', long = "config", value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of stderr
    #[arg(long = "log", value_name = "PATH", global = true)]
    log: Option<PathBuf>,

    /// Verbose logging (same as --log-level debug)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hammer until a failure is observed or a limit is reached
    Run(RunArgs),

    /// Wait until the backend accepts connections
    Check(TargetArgs),

    /// Write a default configuration file
    InitConfig {
        /// Where to write the configuration
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct TargetArgs {
    /// Backend to drive
    #[arg(short = 'b', long = "backend", value_enum)]
    backend: Option<BackendArg>,

    /// Connection descriptor (database path for sqlite)
    #[arg(short = 't', long = "target", value_name = "DESCRIPTOR")]
    target: Option<String>,

    /// Seconds to wait for the backend to accept connections
    #[arg(long = "ready-timeout", value_name = "SECS")]
    ready_timeout: Option<u64>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// Statement executed on every attempt
    #[arg(short = 'q', long = "operation", alias = "sql", value_name = "SQL")]
    operation: Option<String>,

    /// Number of concurrent worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Number of pooled connections
    #[arg(long = "pool-size")]
    pool_size: Option<usize>,

    /// Maximum duration in seconds (0 = run until failure)
    #[arg(short = 'd', long = "duration", value_name = "SECS")]
    duration: Option<u64>,

    /// Maximum number of attempts (0 = unlimited)
    #[arg(long = "max-iterations")]
    max_iterations: Option<u64>,

    /// Milliseconds a worker waits for a pooled connection
    #[arg(long = "acquire-timeout-ms")]
    acquire_timeout_ms: Option<u64>,

    /// Log progress every N attempts (0 = never)
    #[arg(long = "progress-every")]
    progress_every: Option<u64>,

    /// Simulated backend: latency per attempt in milliseconds
    #[arg(long = "sim-latency-ms")]
    sim_latency_ms: Option<u64>,

    /// Simulated backend: probability (0.0 - 1.0) that an attempt fails
    #[arg(long = "sim-failure-rate")]
    sim_failure_rate: Option<f64>,

    /// Simulated backend: fail exactly the k-th attempt
    #[arg(long = "sim-fail-on", value_name = "K")]
    sim_fail_on: Option<u64>,

    /// Simulated backend: refuse connections after N connects
    #[arg(long = "sim-connect-fail-after", value_name = "N")]
    sim_connect_fail_after: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum BackendArg {
    Sim,
    Sqlite,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Sim => BackendKind::Sim,
            BackendArg::Sqlite => BackendKind::Sqlite,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    if let Commands::InitConfig { ref path, force } = cli.command {
        write_default_config(path, force).map_err(|e| HammerError::Other(format!("{:#}", e)))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(EXIT_SUCCESS);
    }

    let mut config = match cli.config {
        Some(ref path) => HammerConfig::from_file(path)?,
        None => HammerConfig::default(),
    };

    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    match cli.command {
        Commands::Run(args) => {
            apply_run_args(&mut config, args);
            let report = runner::run_with(&config, |handle| {
                if let Err(e) = signal::cancel_on_interrupt(handle) {
                    warn!(error = %e, "Ctrl-C will terminate without a report");
                }
            })?;
            if config.json {
                println!("{}", report.to_json()?);
            } else {
                report.print();
            }
            Ok(report.exit_code())
        }
        Commands::Check(args) => {
            apply_target_args(&mut config, args);
            let waited = runner::check(&config)?;
            println!(
                "Backend {} is ready ({} at {})",
                config.backend,
                format_duration(waited.as_millis() as u64),
                config.target().redacted()
            );
            Ok(EXIT_SUCCESS)
        }
        Commands::InitConfig { .. } => Ok(EXIT_SUCCESS),
    }
}

fn apply_target_args(config: &mut HammerConfig, args: TargetArgs) {
    if let Some(backend) = args.backend {
        config.backend = backend.into();
    }
    if let Some(target) = args.target {
        config.target = target;
    }
    if let Some(secs) = args.ready_timeout {
        config.ready_timeout_secs = secs;
    }
}

fn apply_run_args(config: &mut HammerConfig, args: RunArgs) {
    apply_target_args(config, args.target);

    if let Some(operation) = args.operation {
        config.operation = operation;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(pool_size) = args.pool_size {
        config.pool_size = pool_size;
    }
    if let Some(duration) = args.duration {
        config.max_seconds = duration;
    }
    if let Some(max) = args.max_iterations {
        config.max_iterations = max;
    }
    if let Some(ms) = args.acquire_timeout_ms {
        config.acquire_timeout_ms = ms;
    }
    if let Some(every) = args.progress_every {
        config.progress_every = every;
    }

    if let Some(latency) = args.sim_latency_ms {
        config.sim.latency_ms = latency;
    }
    if let Some(rate) = args.sim_failure_rate {
        config.sim.failure_rate = rate;
    }
    if args.sim_fail_on.is_some() {
        config.sim.fail_on = args.sim_fail_on;
    }
    if args.sim_connect_fail_after.is_some() {
        config.sim.connect_fail_after = args.sim_connect_fail_after;
    }

    config.json |= args.json;
}
