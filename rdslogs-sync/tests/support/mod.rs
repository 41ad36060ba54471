//! Shared fakes for orchestrator, catalog and destination tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use rdslogs_sync::catalog::{DescribeLogFiles, LogCatalog, LogFilePage};
use rdslogs_sync::destination::DestinationStore;
use rdslogs_sync::error::{SyncError, SyncResult};
use rdslogs_sync::orchestrator::{RunOptions, SyncOrchestrator};
use rdslogs_sync::streamer::{LogFetcher, LogStream};
use rdslogs_sync::types::LogFileDescriptor;
use rdslogs_sync::Credentials;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const DB: &str = "prod-db";

pub fn test_credentials() -> Credentials {
    Credentials::new(
        "AKIDEXAMPLE",
        "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        "IQoJb3JpZ2luX2VjEXAMPLE+token/value==",
    )
    .expect("test credentials are complete")
}

// ── Log source ──────────────────────────────────────────────────

/// Serves pre-built pages; page `n` is returned for marker `"page-n"`.
pub struct FakeLogSource {
    pages: Vec<Vec<(String, u64)>>,
    fail: bool,
    pub calls: AtomicUsize,
}

impl FakeLogSource {
    pub fn single(files: &[(&str, u64)]) -> Self {
        Self::paged(vec![files.to_vec()])
    }

    pub fn paged(pages: Vec<Vec<(&str, u64)>>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|p| p.into_iter().map(|(n, s)| (n.to_string(), s)).collect())
                .collect(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            pages: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DescribeLogFiles for FakeLogSource {
    async fn describe_page(
        &self,
        _db_instance_id: &str,
        marker: Option<&str>,
    ) -> SyncResult<LogFilePage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SyncError::FetchTransport("connection reset by peer".into()));
        }

        let index = match marker {
            None => 0,
            Some(m) => m
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .expect("marker issued by this fake"),
        };
        let files = self.pages.get(index).cloned().unwrap_or_default();
        let marker = (index + 1 < self.pages.len()).then(|| format!("page-{}", index + 1));
        Ok(LogFilePage { files, marker })
    }
}

// ── Destination ─────────────────────────────────────────────────

/// In-memory destination that commits an object only after its stream ends cleanly.
#[derive(Default)]
pub struct MemoryDestination {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    unavailable: Mutex<HashSet<String>>,
    pub puts: AtomicUsize,
}

impl MemoryDestination {
    pub fn with_objects(objects: &[(&str, usize)]) -> Self {
        let dest = Self::default();
        for (path, size) in objects {
            dest.insert(path, vec![b'x'; *size]);
        }
        dest
    }

    pub fn insert(&self, path: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(path.to_string(), data);
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Makes size lookups of `path` fail with a non-existence error.
    pub fn make_unavailable(&self, path: &str) {
        self.unavailable.lock().unwrap().insert(path.to_string());
    }
}

#[async_trait]
impl DestinationStore for MemoryDestination {
    async fn object_size(&self, path: &str) -> SyncResult<Option<u64>> {
        if self.unavailable.lock().unwrap().contains(path) {
            return Err(SyncError::DestinationUnavailable {
                path: path.to_string(),
                reason: "access denied".into(),
            });
        }
        Ok(self.get(path).map(|data| data.len() as u64))
    }

    async fn put_stream(&self, path: &str, mut stream: LogStream) -> SyncResult<u64> {
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        let size = buffer.len() as u64;
        self.insert(path, buffer);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(size)
    }

    fn label(&self) -> String {
        "memory://test".to_string()
    }
}

// ── Fetcher ─────────────────────────────────────────────────────

#[derive(Clone)]
pub enum FetchBehavior {
    /// Serve these bytes in two chunks.
    Body(Vec<u8>),
    /// Fail the request with this HTTP status.
    Status(u16),
    /// Serve these bytes, then break the connection.
    BreakAfter(Vec<u8>),
    /// Wait this long before answering with the body.
    Slow(Duration, Vec<u8>),
    /// Serve these bytes, then stall without ever ending the body.
    Stall(Vec<u8>),
    /// Fail as if the credentials expired mid-run.
    Expired,
}

/// Fetcher whose answers are scripted per log file name. Files without a
/// script get a body of exactly their reported size.
#[derive(Default)]
pub struct FakeFetcher {
    behaviors: HashMap<String, FetchBehavior>,
    pub fetched: Mutex<Vec<String>>,
    expired: bool,
}

impl FakeFetcher {
    pub fn with(mut self, name: &str, behavior: FetchBehavior) -> Self {
        self.behaviors.insert(name.to_string(), behavior);
        self
    }

    pub fn expired() -> Self {
        Self {
            expired: true,
            ..Self::default()
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        let mut names = self.fetched.lock().unwrap().clone();
        names.sort();
        names
    }
}

fn two_chunks(data: Vec<u8>) -> Vec<SyncResult<Bytes>> {
    let mid = data.len() / 2;
    let data = Bytes::from(data);
    vec![Ok(data.slice(..mid)), Ok(data.slice(mid..))]
}

#[async_trait]
impl LogFetcher for FakeFetcher {
    async fn fetch(&self, file: &LogFileDescriptor) -> SyncResult<LogStream> {
        self.fetched.lock().unwrap().push(file.name.clone());

        let behavior = self
            .behaviors
            .get(&file.name)
            .cloned()
            .unwrap_or_else(|| FetchBehavior::Body(vec![b'l'; file.size as usize]));

        match behavior {
            FetchBehavior::Body(data) => Ok(LogStream::new(
                file.name.clone(),
                futures::stream::iter(two_chunks(data)),
            )),
            FetchBehavior::Status(status) => Err(SyncError::Fetch {
                status,
                excerpt: "<Error><Code>AccessDenied</Code></Error>".into(),
            }),
            FetchBehavior::BreakAfter(data) => {
                let mut chunks = two_chunks(data);
                chunks.push(Err(SyncError::FetchTransport("connection closed".into())));
                Ok(LogStream::new(file.name.clone(), futures::stream::iter(chunks)))
            }
            FetchBehavior::Stall(data) => {
                let body = futures::stream::iter(two_chunks(data)).chain(futures::stream::pending());
                Ok(LogStream::new(file.name.clone(), body))
            }
            FetchBehavior::Expired => Err(SyncError::CredentialExpired),
            FetchBehavior::Slow(delay, data) => {
                tokio::time::sleep(delay).await;
                Ok(LogStream::new(
                    file.name.clone(),
                    futures::stream::iter(two_chunks(data)),
                ))
            }
        }
    }

    fn preflight(&self) -> SyncResult<()> {
        if self.expired {
            Err(SyncError::CredentialExpired)
        } else {
            Ok(())
        }
    }
}

// ── Wiring ──────────────────────────────────────────────────────

pub fn orchestrator(
    source: Arc<FakeLogSource>,
    destination: Arc<dyn DestinationStore>,
    fetcher: Arc<dyn LogFetcher>,
) -> SyncOrchestrator {
    orchestrator_with(source, destination, fetcher, RunOptions::default())
}

pub fn orchestrator_with(
    source: Arc<FakeLogSource>,
    destination: Arc<dyn DestinationStore>,
    fetcher: Arc<dyn LogFetcher>,
    options: RunOptions,
) -> SyncOrchestrator {
    SyncOrchestrator::new(LogCatalog::new(source), destination, fetcher, options)
}
