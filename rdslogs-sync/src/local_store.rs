//! Local directory destination, for development runs without a bucket.

use crate::destination::DestinationStore;
use crate::error::{SyncError, SyncResult};
use crate::streamer::LogStream;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// A temporary file that is removed when dropped, unless it was renamed
/// into place. Covers errors and futures cancelled mid-write alike.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn committed(mut self) {
        self.committed = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("failed to remove partial file {}: {e}", self.path.display());
                }
            }
        }
    }
}

/// Mirrors log files into a directory tree.
///
/// Writes go to a temporary sibling and are renamed into place once the
/// stream has been read completely.
pub struct LocalDestination {
    root: PathBuf,
}

impl LocalDestination {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `path` under the root, refusing anything that would escape it.
    fn resolve(&self, path: &str) -> SyncResult<PathBuf> {
        let relative = Path::new(path);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !clean || path.is_empty() {
            return Err(SyncError::destination(path, "path escapes destination root"));
        }
        Ok(self.root.join(relative))
    }

    async fn write_temp(&self, temp: &Path, stream: &mut LogStream) -> SyncResult<u64> {
        let display = temp.display().to_string();
        let mut file = fs::File::create(temp)
            .await
            .map_err(|e| SyncError::destination(&display, e))?;

        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::destination(&display, e))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| SyncError::destination(&display, e))?;
        file.sync_all()
            .await
            .map_err(|e| SyncError::destination(&display, e))?;
        Ok(written)
    }
}

#[async_trait]
impl DestinationStore for LocalDestination {
    async fn object_size(&self, path: &str) -> SyncResult<Option<u64>> {
        let target = self.resolve(path)?;
        match fs::metadata(&target).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Err(SyncError::destination(path, "not a regular file")),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::destination(path, e)),
        }
    }

    async fn put_stream(&self, path: &str, mut stream: LogStream) -> SyncResult<u64> {
        let target = self.resolve(path)?;
        let parent = target
            .parent()
            .ok_or_else(|| SyncError::destination(path, "no parent directory"))?;
        fs::create_dir_all(parent)
            .await
            .map_err(|e| SyncError::destination(path, e))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_name = format!(".{file_name}.{}.partial", Uuid::new_v4());
        let temp = PartialFile::new(parent.join(temp_name));

        let written = self.write_temp(temp.path(), &mut stream).await?;
        fs::rename(temp.path(), &target)
            .await
            .map_err(|e| SyncError::destination(path, e))?;
        temp.committed();

        debug!("wrote {written} bytes to {}", target.display());
        Ok(written)
    }

    fn label(&self) -> String {
        self.root.display().to_string()
    }
}
