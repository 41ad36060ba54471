//! Sync run orchestration.
//!
//! One run: enumerate the instance's log files, then for each file check the
//! destination, decide by size, and stream changed files across. Files are
//! independent; a failure is recorded against its file and the run carries
//! on. Only configuration, signing, credential and enumeration failures abort
//! the run.

use crate::catalog::{LogCatalog, RdsLogSource};
use crate::config::{DestinationTarget, SyncConfig};
use crate::credentials::Credentials;
use crate::destination::{DestinationStore, destination_path};
use crate::error::{ErrorScope, SyncError, SyncResult};
use crate::local_store::LocalDestination;
use crate::s3_transport::S3Destination;
use crate::streamer::{LogFetcher, LogStreamer};
use crate::types::*;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{error, info, warn};

/// Per-run tunables.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub key_prefix: String,
    pub max_concurrency: usize,
    pub run_timeout: Duration,
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            max_concurrency: 4,
            run_timeout: Duration::from_secs(270),
            dry_run: false,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            key_prefix: config.key_prefix.clone(),
            max_concurrency: config.max_concurrency.max(1),
            run_timeout: Duration::from_secs(config.run_timeout_secs),
            dry_run: false,
        }
    }
}

/// Drives one sync run.
pub struct SyncOrchestrator {
    catalog: LogCatalog,
    destination: Arc<dyn DestinationStore>,
    fetcher: Arc<dyn LogFetcher>,
    options: RunOptions,
}

impl SyncOrchestrator {
    pub fn new(
        catalog: LogCatalog,
        destination: Arc<dyn DestinationStore>,
        fetcher: Arc<dyn LogFetcher>,
        options: RunOptions,
    ) -> Self {
        Self {
            catalog,
            destination,
            fetcher,
            options,
        }
    }

    /// Wires the AWS-backed collaborators described by `config`.
    pub fn from_config(config: &SyncConfig, credentials: Credentials) -> SyncResult<Self> {
        config.validate()?;

        let source = RdsLogSource::from_credentials(
            &credentials,
            &config.region,
            config.rds_endpoint_override.as_deref(),
        );

        let destination: Arc<dyn DestinationStore> = match &config.destination {
            DestinationTarget::S3 { bucket } => Arc::new(S3Destination::from_credentials(
                &credentials,
                &config.region,
                config.s3_endpoint_override.as_deref(),
                bucket.clone(),
                config.part_size_bytes,
            )),
            DestinationTarget::Local { root } => Arc::new(LocalDestination::new(root.clone())),
        };

        let fetcher = LogStreamer::from_config(config, credentials)?;

        Ok(Self::new(
            LogCatalog::new(Arc::new(source)),
            destination,
            Arc::new(fetcher),
            RunOptions::from_config(config),
        ))
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.options.dry_run = dry_run;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs one sync for `db_instance_id`.
    ///
    /// Returns `Err` only for run-scoped failures. Files still in flight at
    /// the deadline are reported as failed; whatever they wrote is not
    /// committed, and the size check picks them up again next run.
    pub async fn run(&self, db_instance_id: &str) -> SyncResult<SyncReport> {
        let started_at = Utc::now();
        let deadline = Instant::now() + self.options.run_timeout;

        info!(
            "sync run started for {db_instance_id} -> {}",
            self.destination.label()
        );

        if !self.options.dry_run {
            self.fetcher.preflight().inspect_err(|e| {
                error!("sync run aborted before enumeration: {e}");
            })?;
        }

        let files = match timeout_at(deadline, self.catalog.list_log_files(db_instance_id)).await {
            Ok(Ok(files)) => files,
            Ok(Err(e)) => {
                error!("sync run aborted, cannot enumerate logs: {e}");
                return Err(e);
            }
            Err(_) => {
                error!("sync run aborted, enumeration exceeded the run deadline");
                return Err(SyncError::RemoteUnavailable(
                    "enumeration exceeded the run deadline".into(),
                ));
            }
        };

        let mut completed: Vec<Option<FileReport>> = vec![None; files.len()];
        let drive = async {
            let mut results = stream::iter(files.iter().enumerate())
                .map(|(idx, file)| async move { (idx, self.sync_file(file).await) })
                .buffer_unordered(self.options.max_concurrency.max(1));

            while let Some((idx, report)) = results.next().await {
                completed[idx] = Some(report?);
            }
            Ok::<(), SyncError>(())
        };

        let driven = timeout_at(deadline, drive).await;
        self.destination.settle().await;

        match driven {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("sync run aborted: {e}");
                return Err(e);
            }
            Err(_) => warn!(
                "run deadline of {:?} reached, abandoning in-flight files",
                self.options.run_timeout
            ),
        }

        let reports: Vec<FileReport> = files
            .iter()
            .zip(completed)
            .map(|(file, report)| report.unwrap_or_else(|| self.abandoned(file)))
            .collect();

        let report = SyncReport {
            db_instance_id: db_instance_id.to_string(),
            destination: self.destination.label(),
            started_at,
            finished_at: Utc::now(),
            dry_run: self.options.dry_run,
            files: reports,
        };

        info!(
            "sync run finished for {db_instance_id}: {} transferred, {} skipped, {} failed",
            report.transferred(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    /// Check the stored size, decide and (maybe) transfer one file. File-scoped failures are
    /// recorded in the report; run-scoped ones (signing, expired credentials)
    /// are returned and end the run.
    async fn sync_file(&self, file: &LogFileDescriptor) -> SyncResult<FileReport> {
        let path = destination_path(&self.options.key_prefix, &file.name);

        let outcome = match self.transfer(file, &path).await {
            Ok(outcome) => outcome,
            Err(e) if e.scope() == ErrorScope::Run => return Err(e),
            Err(e) => {
                warn!("sync failed for {}: {e}", file.name);
                FileOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        Ok(FileReport {
            name: file.name.clone(),
            destination_path: path,
            source_size: file.size,
            outcome,
        })
    }

    async fn transfer(&self, file: &LogFileDescriptor, path: &str) -> SyncResult<FileOutcome> {
        let existing = self.destination.object_size(path).await?;

        match TransferDecision::from_sizes(file.size, existing) {
            TransferDecision::Skip => {
                info!("skipping existing {} ({} bytes)", file.name, file.size);
                Ok(FileOutcome::Skipped)
            }
            TransferDecision::Transfer if self.options.dry_run => {
                info!("would sync {} ({:?} -> {} bytes)", file.name, existing, file.size);
                Ok(FileOutcome::WouldTransfer)
            }
            TransferDecision::Transfer => {
                info!("sync {} ({:?} -> {} bytes)", file.name, existing, file.size);
                let stream = self.fetcher.fetch(file).await?;
                let bytes = self.destination.put_stream(path, stream).await?;
                Ok(FileOutcome::Transferred { bytes })
            }
        }
    }

    fn abandoned(&self, file: &LogFileDescriptor) -> FileReport {
        FileReport {
            name: file.name.clone(),
            destination_path: destination_path(&self.options.key_prefix, &file.name),
            source_size: file.size,
            outcome: FileOutcome::Failed {
                error: SyncError::TimedOut.to_string(),
            },
        }
    }
}
