//! Destination store operations and path mapping.

use crate::error::SyncResult;
use crate::streamer::LogStream;
use async_trait::async_trait;

/// Where mirrored log files land.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Size of the stored object, or `None` when it does not exist.
    ///
    /// Absence is not an error; anything else (permissions, network) is
    /// `DestinationUnavailable`.
    async fn object_size(&self, path: &str) -> SyncResult<Option<u64>>;

    /// Writes `stream` to `path`, returning the number of bytes stored.
    ///
    /// Nothing becomes visible at `path` unless the whole stream was read
    /// successfully, including when the returned future is dropped early.
    async fn put_stream(&self, path: &str, stream: LogStream) -> SyncResult<u64>;

    /// Short label for reports, e.g. `s3://bucket`.
    fn label(&self) -> String;

    /// Waits for cleanup started by writes that were cancelled mid-stream.
    async fn settle(&self) {}
}

/// Maps a source log file name to its destination path.
///
/// A `YYYY-MM-DD` token in the file name becomes a directory ahead of the
/// file, so `error/postgresql.log.2020-03-03-21` maps to
/// `error/2020-03-03/postgresql.log.2020-03-03-21`. Names without a date map
/// unchanged.
pub fn destination_path(prefix: &str, log_file_name: &str) -> String {
    let name = log_file_name.trim_start_matches('/');
    let (dir, file) = match name.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, name),
    };

    let mut segments: Vec<&str> = Vec::with_capacity(4);
    let prefix = prefix.trim_matches('/');
    if !prefix.is_empty() {
        segments.push(prefix);
    }
    if let Some(dir) = dir.filter(|d| !d.is_empty()) {
        segments.push(dir);
    }
    if let Some(date) = date_token(file) {
        segments.push(date);
    }
    segments.push(file);
    segments.join("/")
}

/// Last `YYYY-MM-DD` run of characters in `file`.
fn date_token(file: &str) -> Option<&str> {
    let bytes = file.as_bytes();
    if bytes.len() < 10 {
        return None;
    }
    (0..=bytes.len() - 10).rev().find_map(|start| {
        let window = &bytes[start..start + 10];
        let shape_ok = window.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
        let bounded = start == 0 || !bytes[start - 1].is_ascii_digit();
        (shape_ok && bounded).then(|| &file[start..start + 10])
    })
}
