//! S3 destination for mirrored log files.
//!
//! Reads object sizes with HEAD and writes log streams part by part: bodies
//! that fit in one part go up with a single PUT, larger ones through a
//! multipart upload that is aborted on any failure or cancellation, so a
//! broken transfer never replaces the stored object.

use crate::credentials::Credentials;
use crate::destination::DestinationStore;
use crate::error::{SyncError, SyncResult};
use crate::streamer::LogStream;
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type AbortTasks = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// S3 bucket destination.
pub struct S3Destination {
    client: S3Client,
    bucket: String,
    part_size: usize,
    aborts: AbortTasks,
}

/// An open multipart upload. Dropping it before `completed` (an upload
/// future cancelled at the run deadline) schedules the abort on the runtime.
struct PendingUpload {
    client: S3Client,
    bucket: String,
    key: String,
    upload_id: String,
    aborts: AbortTasks,
    done: bool,
}

impl PendingUpload {
    fn completed(mut self) {
        self.done = true;
    }

    async fn abort(mut self) {
        self.done = true;
        abort_multipart(&self.client, &self.bucket, &self.key, &self.upload_id).await;
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                "multipart upload {} for {} left open: no runtime to abort it",
                self.upload_id, self.key
            );
            return;
        };

        let client = self.client.clone();
        let bucket = std::mem::take(&mut self.bucket);
        let key = std::mem::take(&mut self.key);
        let upload_id = std::mem::take(&mut self.upload_id);
        debug!("upload of {key} cancelled, aborting multipart upload {upload_id}");

        let task = runtime.spawn(async move {
            abort_multipart(&client, &bucket, &key, &upload_id).await;
        });
        if let Ok(mut aborts) = self.aborts.lock() {
            aborts.push(task);
        }
    }
}

async fn abort_multipart(client: &S3Client, bucket: &str, key: &str, upload_id: &str) {
    if let Err(e) = client
        .abort_multipart_upload()
        .bucket(bucket)
        .key(key)
        .upload_id(upload_id)
        .send()
        .await
    {
        warn!("abort multipart upload failed for {key}: {e}");
    }
}

/// Stored size from a HEAD `Content-Length`. A missing or negative length is
/// treated as no usable copy, so the file is transferred again.
fn reported_size(content_length: Option<i64>) -> Option<u64> {
    content_length.and_then(|len| u64::try_from(len).ok())
}

impl S3Destination {
    pub fn new(client: S3Client, bucket: String, part_size: usize) -> Self {
        Self {
            client,
            bucket,
            part_size,
            aborts: AbortTasks::default(),
        }
    }

    /// Builds an S3 client from explicit credentials.
    pub fn from_credentials(
        creds: &Credentials,
        region: &str,
        endpoint_override: Option<&str>,
        bucket: String,
        part_size: usize,
    ) -> Self {
        let mut config_builder = aws_sdk_s3::Config::builder()
            .region(aws_types::region::Region::new(region.to_string()))
            .credentials_provider(creds.to_sdk())
            .behavior_version_latest();

        if let Some(endpoint) = endpoint_override {
            config_builder = config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        Self::new(S3Client::from_conf(config_builder.build()), bucket, part_size)
    }

    async fn put_single(&self, key: &str, data: Bytes) -> SyncResult<u64> {
        let size = data.len() as u64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(size as i64)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| SyncError::destination(key, format!("put object failed: {e}")))?;
        Ok(size)
    }

    async fn create_multipart(&self, key: &str) -> SyncResult<String> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| SyncError::destination(key, format!("create multipart upload failed: {e}")))?;

        resp.upload_id()
            .map(str::to_string)
            .ok_or_else(|| SyncError::destination(key, "no upload id returned"))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> SyncResult<CompletedPart> {
        let resp = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| SyncError::destination(key, format!("upload part {part_number} failed: {e}")))?;

        Ok(CompletedPart::builder()
            .e_tag(resp.e_tag().unwrap_or_default())
            .part_number(part_number)
            .build())
    }

    /// Streams the remaining parts and completes the upload.
    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Bytes,
        stream: &mut LogStream,
    ) -> SyncResult<u64> {
        let mut total = first.len() as u64;
        let mut parts = vec![self.upload_part(key, upload_id, 1, first).await?];

        loop {
            let part = stream.read_part(self.part_size).await?;
            if !part.data.is_empty() {
                let part_number = parts.len() as i32 + 1;
                total += part.data.len() as u64;
                parts.push(self.upload_part(key, upload_id, part_number, part.data).await?);
            }
            if part.last {
                break;
            }
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| SyncError::destination(key, format!("complete multipart upload failed: {e}")))?;

        Ok(total)
    }
}

#[async_trait]
impl DestinationStore for S3Destination {
    async fn object_size(&self, path: &str) -> SyncResult<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(resp) => {
                let size = reported_size(resp.content_length());
                if size.is_none() {
                    warn!("HEAD {path} returned no content length, treating as absent");
                }
                Ok(size)
            }
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(None)
                } else {
                    Err(SyncError::destination(
                        path,
                        format!("head object failed: {service_err}"),
                    ))
                }
            }
        }
    }

    async fn put_stream(&self, path: &str, mut stream: LogStream) -> SyncResult<u64> {
        let first = stream.read_part(self.part_size).await?;
        if first.last {
            let size = self.put_single(path, first.data).await?;
            debug!("uploaded {size} bytes to s3://{}/{path}", self.bucket);
            return Ok(size);
        }

        let upload_id = self.create_multipart(path).await?;
        let pending = PendingUpload {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: path.to_string(),
            upload_id: upload_id.clone(),
            aborts: Arc::clone(&self.aborts),
            done: false,
        };

        match self
            .upload_parts(path, &upload_id, first.data, &mut stream)
            .await
        {
            Ok(size) => {
                pending.completed();
                debug!(
                    "uploaded {size} bytes to s3://{}/{path} (multipart)",
                    self.bucket
                );
                Ok(size)
            }
            Err(e) => {
                pending.abort().await;
                Err(e)
            }
        }
    }

    async fn settle(&self) {
        let tasks: Vec<_> = match self.aborts.lock() {
            Ok(mut aborts) => aborts.drain(..).collect(),
            Err(_) => return,
        };
        for task in tasks {
            let _ = task.await;
        }
    }

    fn label(&self) -> String {
        format!("s3://{}", self.bucket)
    }
}
