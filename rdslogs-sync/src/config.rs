//! Log sync configuration.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Smallest part S3 accepts for every part but the last.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Upper bound for `SYNC_FETCH_ATTEMPTS`; the last backoff is 2^9 times the base.
pub const MAX_FETCH_ATTEMPTS: u32 = 10;

/// Where mirrored log files are written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationTarget {
    /// An S3 bucket (the production destination).
    S3 { bucket: String },
    /// A local directory tree, for development runs.
    Local { root: PathBuf },
}

/// Configuration for one sync run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// RDS instance identifier whose logs are mirrored.
    pub db_instance_id: String,

    /// Destination for mirrored files.
    pub destination: DestinationTarget,

    /// Prefix prepended to every destination path. Empty for none.
    pub key_prefix: String,

    /// AWS region used for signing and endpoint derivation.
    pub region: String,

    /// Optional RDS endpoint override (for local testing).
    pub rds_endpoint_override: Option<String>,

    /// Optional S3 endpoint override (for MinIO in testing).
    pub s3_endpoint_override: Option<String>,

    /// Max number of files processed concurrently.
    pub max_concurrency: usize,

    /// Hard wall-clock budget for a run, in seconds.
    pub run_timeout_secs: u64,

    /// Multipart part size for streamed uploads.
    pub part_size_bytes: usize,

    /// Attempts for a throttled download (429/503) before giving up.
    pub fetch_max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            db_instance_id: String::new(),
            destination: DestinationTarget::S3 {
                bucket: String::new(),
            },
            key_prefix: String::new(),
            region: "us-east-1".to_string(),
            rds_endpoint_override: None,
            s3_endpoint_override: None,
            max_concurrency: 4,
            run_timeout_secs: 270, // leaves headroom inside a 5 minute cadence
            part_size_bytes: 8 * 1024 * 1024,
            fetch_max_attempts: 3,
        }
    }
}

impl SyncConfig {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let db_instance_id =
            get("DBNAME").ok_or_else(|| SyncError::Config("DBNAME is not set".into()))?;

        let destination = match (get("TARGET_BUCKET"), get("TARGET_DIR")) {
            (_, Some(dir)) => DestinationTarget::Local {
                root: PathBuf::from(dir),
            },
            (Some(bucket), None) => DestinationTarget::S3 { bucket },
            (None, None) => {
                return Err(SyncError::Config("TARGET_BUCKET is not set".into()));
            }
        };

        let config = Self {
            db_instance_id,
            destination,
            key_prefix: get("TARGET_PREFIX")
                .map(|p| p.trim_matches('/').to_string())
                .unwrap_or_default(),
            region: get("AWS_REGION")
                .or_else(|| get("AWS_DEFAULT_REGION"))
                .unwrap_or(defaults.region),
            rds_endpoint_override: get("RDS_ENDPOINT_URL"),
            s3_endpoint_override: get("S3_ENDPOINT_URL"),
            max_concurrency: parse_var(get("SYNC_CONCURRENCY"), "SYNC_CONCURRENCY")?
                .unwrap_or(defaults.max_concurrency),
            run_timeout_secs: parse_var(get("SYNC_TIMEOUT_SECS"), "SYNC_TIMEOUT_SECS")?
                .unwrap_or(defaults.run_timeout_secs),
            part_size_bytes: parse_var(get("SYNC_PART_SIZE_BYTES"), "SYNC_PART_SIZE_BYTES")?
                .unwrap_or(defaults.part_size_bytes),
            fetch_max_attempts: parse_var(get("SYNC_FETCH_ATTEMPTS"), "SYNC_FETCH_ATTEMPTS")?
                .unwrap_or(defaults.fetch_max_attempts),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks numeric bounds.
    pub fn validate(&self) -> SyncResult<()> {
        if self.db_instance_id.is_empty() {
            return Err(SyncError::Config("db instance id is empty".into()));
        }
        if let DestinationTarget::S3 { bucket } = &self.destination {
            if bucket.is_empty() {
                return Err(SyncError::Config("target bucket is empty".into()));
            }
        }
        if self.max_concurrency == 0 {
            return Err(SyncError::Config("SYNC_CONCURRENCY must be at least 1".into()));
        }
        if self.run_timeout_secs == 0 {
            return Err(SyncError::Config("SYNC_TIMEOUT_SECS must be at least 1".into()));
        }
        if self.part_size_bytes < MIN_PART_SIZE {
            return Err(SyncError::Config(format!(
                "SYNC_PART_SIZE_BYTES must be at least {MIN_PART_SIZE}"
            )));
        }
        if !(1..=MAX_FETCH_ATTEMPTS).contains(&self.fetch_max_attempts) {
            return Err(SyncError::Config(format!(
                "SYNC_FETCH_ATTEMPTS must be between 1 and {MAX_FETCH_ATTEMPTS}"
            )));
        }
        Ok(())
    }

    /// Base URL of the RDS REST endpoint for this region.
    pub fn rds_base_url(&self) -> String {
        self.rds_endpoint_override
            .clone()
            .unwrap_or_else(|| format!("https://rds.{}.amazonaws.com", self.region))
    }

    /// Human-readable destination, used in reports and logs.
    pub fn destination_label(&self) -> String {
        match &self.destination {
            DestinationTarget::S3 { bucket } => format!("s3://{bucket}"),
            DestinationTarget::Local { root } => root.display().to_string(),
        }
    }
}

fn parse_var<T: FromStr>(value: Option<String>, name: &str) -> SyncResult<Option<T>> {
    value
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| SyncError::Config(format!("{name} is not a valid number: {v}")))
        })
        .transpose()
}
