//! Shared types for log sync runs.

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One log file as reported by the source instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFileDescriptor {
    /// Source-relative name, e.g. `error/postgresql.log.2020-03-03-21`.
    pub name: String,
    /// Size in bytes at enumeration time.
    pub size: u64,
    /// Instance the file belongs to.
    pub db_instance_id: String,
}

impl LogFileDescriptor {
    pub fn new(db_instance_id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            db_instance_id: db_instance_id.into(),
        }
    }
}

/// Whether a file needs to be copied this run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDecision {
    Skip,
    Transfer,
}

impl TransferDecision {
    /// Size equality is the only "unchanged" test.
    pub fn from_sizes(source_size: u64, destination_size: Option<u64>) -> Self {
        match destination_size {
            Some(size) if size == source_size => Self::Skip,
            _ => Self::Transfer,
        }
    }
}

/// What happened to a single file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Skipped,
    Transferred { bytes: u64 },
    /// Dry runs stop after the decision.
    WouldTransfer,
    Failed { error: String },
}

/// Per-file entry in a [`SyncReport`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileReport {
    pub name: String,
    pub destination_path: String,
    pub source_size: u64,
    pub outcome: FileOutcome,
}

/// Overall result of a completed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    PartialFailure,
}

/// Summary of one sync run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncReport {
    pub db_instance_id: String,
    pub destination: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub files: Vec<FileReport>,
}

impl SyncReport {
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped))
    }

    pub fn transferred(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Transferred { .. }))
    }

    pub fn pending(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::WouldTransfer))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    /// Total bytes written to the destination.
    pub fn bytes_transferred(&self) -> u64 {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Transferred { bytes } => bytes,
                _ => 0,
            })
            .sum()
    }

    /// Failed files with their error text.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().filter_map(|f| match &f.outcome {
            FileOutcome::Failed { error } => Some((f.name.as_str(), error.as_str())),
            _ => None,
        })
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.failed() == 0 {
            RunOutcome::Success
        } else {
            RunOutcome::PartialFailure
        }
    }

    /// Pretty-printed JSON, as written to stdout by the runner.
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn file(&self, name: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.name == name)
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}
