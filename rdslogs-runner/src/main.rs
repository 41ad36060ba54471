//! Scheduled entry point: mirror one RDS instance's logs, print the report.
//!
//! Exit codes: 0 when every file synced or was already current, 2 when some
//! files failed, 1 when the run could not proceed at all.

use anyhow::Context;
use clap::{Parser, Subcommand};
use rdslogs_sync::{
    Credentials, LogFileDescriptor, LogStreamer, RunOutcome, SyncConfig, SyncOrchestrator,
};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

const EXIT_PARTIAL_FAILURE: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "rdslogs-runner", about = "Mirror RDS log files into S3")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one sync (the default).
    Sync {
        /// Compare sizes and decide only; transfer nothing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print a presigned download URL for one log file.
    Presign {
        /// Log file name as reported by RDS, e.g. `error/postgresql.log.2024-01-01-00`.
        log_file: String,
        /// URL lifetime in seconds.
        #[arg(long, default_value_t = 300)]
        expires: u64,
    },
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Command::Sync { dry_run: false }) {
        Command::Sync { dry_run } => sync(dry_run).await,
        Command::Presign { log_file, expires } => presign(&log_file, expires),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn sync(dry_run: bool) -> anyhow::Result<ExitCode> {
    let config = SyncConfig::from_env().context("loading configuration")?;
    let credentials = Credentials::from_env().context("loading credentials")?;

    info!(
        "mirroring {} into {} (region {}, concurrency {})",
        config.db_instance_id,
        config.destination_label(),
        config.region,
        config.max_concurrency
    );

    let orchestrator = SyncOrchestrator::from_config(&config, credentials)
        .context("building sync pipeline")?
        .with_dry_run(dry_run);

    let report = orchestrator
        .run(&config.db_instance_id)
        .await
        .context("sync run failed")?;

    println!("{}", report.to_json()?);

    for (name, reason) in report.failures() {
        error!("{name}: {reason}");
    }

    Ok(match report.outcome() {
        RunOutcome::Success => ExitCode::SUCCESS,
        RunOutcome::PartialFailure => ExitCode::from(EXIT_PARTIAL_FAILURE),
    })
}

fn presign(log_file: &str, expires: u64) -> anyhow::Result<ExitCode> {
    let config = SyncConfig::from_env().context("loading configuration")?;
    let credentials = Credentials::from_env().context("loading credentials")?;

    let streamer = LogStreamer::from_config(&config, credentials)?;
    let file = LogFileDescriptor::new(config.db_instance_id.clone(), log_file, 0);
    let url = streamer.presigned_url(&file, Duration::from_secs(expires))?;

    println!("{url}");
    Ok(ExitCode::SUCCESS)
}
