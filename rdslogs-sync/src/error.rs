//! Log sync error types.

use thiserror::Error;

/// Result type for log sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// How far an error reaches: the whole run, or only the file being processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorScope {
    Run,
    File,
}

/// Errors that can occur while mirroring log files.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("log enumeration failed: {0}")]
    RemoteUnavailable(String),

    #[error("destination unavailable for {path}: {reason}")]
    DestinationUnavailable { path: String, reason: String },

    #[error("log download failed with HTTP {status}: {excerpt}")]
    Fetch { status: u16, excerpt: String },

    #[error("log download transport error: {0}")]
    FetchTransport(String),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("credentials expired")]
    CredentialExpired,

    #[error("abandoned at run deadline")]
    TimedOut,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Run-scoped errors abort the run; file-scoped ones are recorded against
    /// a single file and the run moves on.
    pub fn scope(&self) -> ErrorScope {
        match self {
            Self::Config(_)
            | Self::RemoteUnavailable(_)
            | Self::Signing(_)
            | Self::CredentialExpired
            | Self::Serialization(_) => ErrorScope::Run,
            Self::DestinationUnavailable { .. }
            | Self::Fetch { .. }
            | Self::FetchTransport(_)
            | Self::TimedOut => ErrorScope::File,
        }
    }

    /// Throttling responses worth another attempt after a backoff.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Fetch { status: 429 | 503, .. })
    }

    pub(crate) fn destination(path: &str, reason: impl std::fmt::Display) -> Self {
        Self::DestinationUnavailable {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
