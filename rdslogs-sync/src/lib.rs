//! RDS log mirroring engine.
//!
//! Copies database log files from an RDS instance into S3 on a schedule:
//! - Log discovery via `DescribeDBLogFiles`, draining pagination
//! - Size-diff decisions against the destination (no content hashing)
//! - SigV4-signed whole-file downloads streamed straight into the destination
//! - Per-file failure isolation with a run-level report

pub mod catalog;
pub mod config;
pub mod credentials;
pub mod destination;
pub mod error;
pub mod local_store;
pub mod orchestrator;
pub mod s3_transport;
pub mod sigv4;
pub mod streamer;
pub mod types;

pub use catalog::{DescribeLogFiles, LogCatalog, LogFilePage, RdsLogSource};
pub use config::{DestinationTarget, SyncConfig};
pub use credentials::Credentials;
pub use destination::{DestinationStore, destination_path};
pub use error::{ErrorScope, SyncError, SyncResult};
pub use orchestrator::{RunOptions, SyncOrchestrator};
pub use sigv4::{RequestDescription, RequestSigner, SignedRequest};
pub use streamer::{LogFetcher, LogStream, LogStreamer};
pub use types::*;
