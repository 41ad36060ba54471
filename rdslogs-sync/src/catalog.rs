//! Log file discovery for an RDS instance.

use crate::credentials::Credentials;
use crate::error::{SyncError, SyncResult};
use crate::types::LogFileDescriptor;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// One page of a "describe log files" response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogFilePage {
    /// `(name, size)` pairs in service order.
    pub files: Vec<(String, u64)>,
    /// Continuation marker; `None` on the last page.
    pub marker: Option<String>,
}

/// The remote "describe log files" operation.
#[async_trait]
pub trait DescribeLogFiles: Send + Sync {
    async fn describe_page(
        &self,
        db_instance_id: &str,
        marker: Option<&str>,
    ) -> SyncResult<LogFilePage>;
}

/// Upper bound on pages drained per enumeration. A marker that never
/// terminates is reported instead of looping forever.
const MAX_PAGES: usize = 10_000;

/// Enumerates the log files an instance currently reports.
#[derive(Clone)]
pub struct LogCatalog {
    source: Arc<dyn DescribeLogFiles>,
}

impl LogCatalog {
    pub fn new(source: Arc<dyn DescribeLogFiles>) -> Self {
        Self { source }
    }

    /// Lists every log file, draining pagination. Any remote failure becomes
    /// `RemoteUnavailable` and nothing from earlier pages is returned.
    pub async fn list_log_files(&self, db_instance_id: &str) -> SyncResult<Vec<LogFileDescriptor>> {
        let mut files = Vec::new();
        let mut marker: Option<String> = None;

        for page_no in 0..MAX_PAGES {
            let page = self
                .source
                .describe_page(db_instance_id, marker.as_deref())
                .await
                .map_err(|e| match e {
                    SyncError::RemoteUnavailable(_) => e,
                    other => SyncError::RemoteUnavailable(other.to_string()),
                })?;

            debug!(
                "describe page {page_no} for {db_instance_id}: {} files",
                page.files.len()
            );

            files.extend(
                page.files
                    .into_iter()
                    .map(|(name, size)| LogFileDescriptor::new(db_instance_id, name, size)),
            );

            match page.marker {
                Some(next) if !next.is_empty() => marker = Some(next),
                _ => {
                    info!("{db_instance_id} reports {} log files", files.len());
                    return Ok(files);
                }
            }
        }

        Err(SyncError::RemoteUnavailable(format!(
            "pagination did not terminate after {MAX_PAGES} pages"
        )))
    }
}

/// `DescribeDBLogFiles` through the AWS SDK.
pub struct RdsLogSource {
    client: aws_sdk_rds::Client,
}

impl RdsLogSource {
    pub fn new(client: aws_sdk_rds::Client) -> Self {
        Self { client }
    }

    /// Builds an RDS client from explicit credentials.
    pub fn from_credentials(
        creds: &Credentials,
        region: &str,
        endpoint_override: Option<&str>,
    ) -> Self {
        let mut config_builder = aws_sdk_rds::Config::builder()
            .region(aws_types::region::Region::new(region.to_string()))
            .credentials_provider(creds.to_sdk())
            .behavior_version_latest();

        if let Some(endpoint) = endpoint_override {
            config_builder = config_builder.endpoint_url(endpoint);
        }

        Self::new(aws_sdk_rds::Client::from_conf(config_builder.build()))
    }
}

#[async_trait]
impl DescribeLogFiles for RdsLogSource {
    async fn describe_page(
        &self,
        db_instance_id: &str,
        marker: Option<&str>,
    ) -> SyncResult<LogFilePage> {
        let resp = self
            .client
            .describe_db_log_files()
            .db_instance_identifier(db_instance_id)
            .set_marker(marker.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                SyncError::RemoteUnavailable(format!(
                    "describe log files failed for {db_instance_id}: {}",
                    e.into_service_error()
                ))
            })?;

        let files = resp
            .describe_db_log_files()
            .iter()
            .filter_map(|detail| {
                let name = detail.log_file_name()?;
                let size = detail.size().unwrap_or(0).max(0) as u64;
                Some((name.to_string(), size))
            })
            .collect();

        Ok(LogFilePage {
            files,
            marker: resp.marker().map(str::to_string),
        })
    }
}
