//! Signed whole-file log downloads exposed as forward-only byte streams.
//!
//! Uses the REST `downloadCompleteLogFile` endpoint rather than the paginated
//! `DownloadDBLogFilePortion` API: the portion API silently truncates large
//! pages and cannot return non-ASCII bytes intact.

use crate::config::{MAX_FETCH_ATTEMPTS, SyncConfig};
use crate::credentials::Credentials;
use crate::error::{SyncError, SyncResult};
use crate::sigv4::{RequestDescription, RequestSigner};
use crate::types::LogFileDescriptor;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::{Client, Url};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, warn};

/// Max bytes of an error body kept in a `Fetch` error.
pub const ERROR_EXCERPT_LIMIT: usize = 512;

const DOWNLOAD_API_VERSION: &str = "v13";

/// A log file body, readable once from front to back.
///
/// Dropping the stream releases the underlying connection.
pub struct LogStream {
    source: String,
    inner: BoxStream<'static, SyncResult<Bytes>>,
}

/// A chunk of at least the requested size, or the final remainder.
#[derive(Debug)]
pub struct Part {
    pub data: Bytes,
    pub last: bool,
}

impl LogStream {
    pub fn new<S>(source: impl Into<String>, stream: S) -> Self
    where
        S: Stream<Item = SyncResult<Bytes>> + Send + 'static,
    {
        Self {
            source: source.into(),
            inner: stream.boxed(),
        }
    }

    /// An in-memory body; used for small payloads and tests.
    pub fn from_bytes(source: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::new(source, futures::stream::once(async move { Ok(data) }))
    }

    fn from_response(source: String, response: reqwest::Response) -> Self {
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| SyncError::FetchTransport(e.to_string())));
        Self::new(source, stream)
    }

    /// Name of the log file this stream carries.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Reads until at least `target` bytes are buffered or the body ends.
    pub async fn read_part(&mut self, target: usize) -> SyncResult<Part> {
        let mut buffer = BytesMut::with_capacity(target);
        while buffer.len() < target {
            match self.inner.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk?),
                None => {
                    return Ok(Part {
                        data: buffer.freeze(),
                        last: true,
                    });
                }
            }
        }
        Ok(Part {
            data: buffer.freeze(),
            last: false,
        })
    }
}

impl Stream for LogStream {
    type Item = SyncResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStream").field("source", &self.source).finish()
    }
}

/// Fetches the body of one log file.
#[async_trait]
pub trait LogFetcher: Send + Sync {
    async fn fetch(&self, file: &LogFileDescriptor) -> SyncResult<LogStream>;

    /// Run-level checks before any file is processed.
    fn preflight(&self) -> SyncResult<()> {
        Ok(())
    }
}

/// Downloads complete log files through the signed REST endpoint.
pub struct LogStreamer {
    client: Client,
    signer: RequestSigner,
    base_url: Url,
    max_attempts: u32,
    backoff_base: Duration,
}

impl LogStreamer {
    /// `base_url` is the RDS REST root, e.g. `https://rds.us-east-1.amazonaws.com`.
    pub fn new(signer: RequestSigner, base_url: &str) -> SyncResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        let base_url = Url::parse(base_url)
            .map_err(|e| SyncError::Config(format!("invalid RDS endpoint {base_url}: {e}")))?;
        if base_url.host_str().is_none() {
            return Err(SyncError::Config(format!("RDS endpoint has no host: {base_url}")));
        }

        Ok(Self {
            client,
            signer,
            base_url,
            max_attempts: 1,
            backoff_base: Duration::from_millis(500),
        })
    }

    /// Streamer for the configured region and endpoint, signing for `rds`.
    pub fn from_config(config: &SyncConfig, credentials: Credentials) -> SyncResult<Self> {
        let signer = RequestSigner::new(credentials, config.region.clone(), "rds")?;
        Ok(Self::new(signer, &config.rds_base_url())?.with_max_attempts(config.fetch_max_attempts))
    }

    /// Attempts per download for throttled responses (429/503), clamped to
    /// `1..=MAX_FETCH_ATTEMPTS`.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.clamp(1, MAX_FETCH_ATTEMPTS);
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Unsigned request for the complete contents of `file`.
    pub fn download_request(&self, file: &LogFileDescriptor) -> RequestDescription {
        let mut host = self.base_url.host_str().unwrap_or_default().to_string();
        if let Some(port) = self.base_url.port() {
            host = format!("{host}:{port}");
        }

        let base_path = self.base_url.path().trim_end_matches('/');
        let path = format!(
            "{base_path}/{DOWNLOAD_API_VERSION}/downloadCompleteLogFile/{}/{}",
            file.db_instance_id,
            file.name.trim_start_matches('/')
        );

        RequestDescription::get(self.base_url.scheme(), host, path)
    }

    /// A presigned download URL for `file`, valid for `expires`.
    pub fn presigned_url(&self, file: &LogFileDescriptor, expires: Duration) -> SyncResult<String> {
        self.signer
            .presign(&self.download_request(file), Utc::now(), expires)
    }

    /// One signed GET. Non-2xx responses become `Fetch` errors carrying an
    /// excerpt of the body; the body itself is never handed to the caller.
    async fn fetch_once(&self, file: &LogFileDescriptor) -> SyncResult<LogStream> {
        if self.signer.credentials().is_expired() {
            return Err(SyncError::CredentialExpired);
        }

        // Signed right before sending: the timestamp is only valid for minutes.
        let signed = self.signer.sign(&self.download_request(file), Utc::now())?;

        let mut request = self.client.get(&signed.url);
        for (name, value) in &signed.headers {
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::FetchTransport(format!("{}: {e}", file.name)))?;

        let status = response.status();
        if !status.is_success() {
            let excerpt = body_excerpt(response).await;
            return Err(SyncError::Fetch {
                status: status.as_u16(),
                excerpt,
            });
        }

        debug!(
            "streaming {} (reported {} bytes, content-length {:?})",
            file.name,
            file.size,
            response.content_length()
        );
        Ok(LogStream::from_response(file.name.clone(), response))
    }
}

#[async_trait]
impl LogFetcher for LogStreamer {
    async fn fetch(&self, file: &LogFileDescriptor) -> SyncResult<LogStream> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(file).await {
                Err(e) if e.is_throttled() && attempt + 1 < self.max_attempts => {
                    let backoff = self.backoff_base.saturating_mul(1u32 << attempt);
                    warn!("download of {} throttled, retrying in {backoff:?}: {e}", file.name);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn preflight(&self) -> SyncResult<()> {
        if self.signer.credentials().is_expired() {
            return Err(SyncError::CredentialExpired);
        }
        Ok(())
    }
}

/// First bytes of an error response, lossily decoded.
async fn body_excerpt(mut response: reqwest::Response) -> String {
    let mut collected: Vec<u8> = Vec::new();
    while collected.len() < ERROR_EXCERPT_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => collected.extend_from_slice(&chunk),
            _ => break,
        }
    }
    collected.truncate(ERROR_EXCERPT_LIMIT);
    String::from_utf8_lossy(&collected).trim().to_string()
}
