//! kv-migrate CLI - key-value store migration with verification and resume.

use clap::{Parser, Subcommand};
use kv_migrate::{Config, MigrateError, MigrationSummary, Orchestrator, VerificationSummary};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "kv-migrate")]
#[command(about = "Migrate keys between Redis-compatible stores")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to state file for resume capability
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Seconds to wait for in-flight keys after a shutdown signal
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new migration
    Run {
        /// Override number of workers
        #[arg(long)]
        workers: Option<usize>,

        /// Override number of keys per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Only migrate keys matching this glob pattern
        #[arg(long)]
        key_pattern: Option<String>,

        /// Skip post-migration verification
        #[arg(long)]
        no_verify: bool,
    },

    /// Resume a previously interrupted migration
    Resume {
        /// Override number of workers
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Compare every source key with the target
    Verify,

    /// Test store connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    // Fill in worker and batch sizes that the config leaves unset
    let mut config = Config::load(&cli.config)?.with_auto_tuning();
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            workers,
            batch_size,
            key_pattern,
            no_verify,
        } => {
            if let Some(w) = workers {
                config.migration.workers = Some(w);
            }
            if let Some(b) = batch_size {
                config.migration.batch_size = Some(b);
            }
            if let Some(pattern) = key_pattern {
                config.migration.key_pattern = pattern;
            }
            if no_verify {
                config.migration.verify = false;
            }
            config.validate()?;

            let cancel_token = setup_signal_handler(cli.shutdown_timeout)?;
            let mut orchestrator = Orchestrator::new(config).await?;

            if let Some(ref path) = cli.state_file {
                orchestrator = orchestrator.with_state_file(path.clone());
            }
            if cli.progress {
                orchestrator = orchestrator.with_progress(true);
            }

            let summary = orchestrator.run(cancel_token).await?;
            report_summary(&summary, cli.output_json, "Migration")?;
        }

        Commands::Resume { workers } => {
            // State file is required for resume
            let state_file = cli.state_file.ok_or_else(|| {
                MigrateError::Config("--state-file is required for resume".to_string())
            })?;

            if !state_file.exists() {
                return Err(MigrateError::Config(format!(
                    "State file not found: {:?}",
                    state_file
                )));
            }

            if let Some(w) = workers {
                config.migration.workers = Some(w);
            }
            config.validate()?;

            let cancel_token = setup_signal_handler(cli.shutdown_timeout)?;
            let mut orchestrator = Orchestrator::new(config)
                .await?
                .with_state_file(state_file)
                .resume()
                .await?;

            if cli.progress {
                orchestrator = orchestrator.with_progress(true);
            }

            info!("Resuming from previous state");
            let summary = orchestrator.run(cancel_token).await?;
            report_summary(&summary, cli.output_json, "Resumed migration")?;
        }

        Commands::Verify => {
            let orchestrator = Orchestrator::new(config).await?;
            let summary = orchestrator.verify_only().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_verification(&summary);
            }

            if !summary.is_success() {
                return Err(MigrateError::Verification(format!(
                    "{} of {} keys differ",
                    summary.failed_keys, summary.total_keys
                )));
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config).await?;
            let result = orchestrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source: {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target: {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Connection("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

fn report_summary(
    summary: &MigrationSummary,
    output_json: bool,
    label: &str,
) -> Result<(), MigrateError> {
    if output_json {
        println!("{}", summary.to_json()?);
    } else {
        let stats = &summary.stats;
        println!("\n{} {}!", label, summary.status);
        println!("  Run ID: {}", summary.run_id);
        println!("  Duration: {:.2}s", stats.duration.as_secs_f64());
        println!("  Keys: {}/{}", stats.successful_keys, stats.total_keys);
        if summary.skipped_keys > 0 {
            println!("  Skipped (already migrated): {}", summary.skipped_keys);
        }
        println!("  Bytes: {}", stats.bytes_transferred);
        println!("  Throughput: {:.1} keys/sec", stats.throughput);
        if !summary.failed_keys.is_empty() {
            println!("  Failed keys: {:?}", summary.failed_keys);
        }
        if let Some(ref verification) = summary.verification {
            println!();
            print_verification(verification);
        }
    }

    match summary.error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_verification(summary: &VerificationSummary) {
    println!("Verification Summary:");
    println!("  Keys checked: {}", summary.total_keys);
    println!("  Keys verified: {}", summary.verified_keys);
    println!("  Keys failed: {}", summary.failed_keys);
    println!("  Keys with mismatches: {}", summary.mismatched_keys);
    for result in summary.failures() {
        if let Some(ref msg) = result.error_msg {
            println!("  ✗ {}: {}", result.key, msg);
        }
        for mismatch in &result.mismatches {
            println!("  ✗ {}: {}", result.key, mismatch);
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    // RUST_LOG takes precedence over --verbosity
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}

/// Exit if in-flight keys do not drain within `shutdown_timeout` seconds.
fn arm_shutdown_deadline(shutdown_timeout: u64) {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(shutdown_timeout)).await;
        eprintln!("Shutdown timeout of {}s elapsed, exiting", shutdown_timeout);
        std::process::exit(i32::from(MigrateError::Cancelled.exit_code()));
    });
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM (container shutdown).
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!(
            "\nReceived {}. Finishing the current batch (timeout: {}s)...",
            name, shutdown_timeout
        );
        token.cancel();
        arm_shutdown_deadline(shutdown_timeout);
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing the current batch...");
            token.cancel();
            arm_shutdown_deadline(shutdown_timeout);
        }
    });

    Ok(cancel_token)
}
