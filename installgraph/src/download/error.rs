//! Download error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::concurrency::ConcurrencyError;
use crate::executor::TaskError;

/// Errors from fetching and storing remote files.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The HTTP client could not be built.
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Connection or transfer failed.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// Request exceeded the client timeout.
    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// Body length differs from what was announced or expected.
    #[error("expected {expected} bytes from {url}, got {actual}")]
    SizeMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    /// Downloaded data does not hash to the expected digest.
    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// Body is not valid UTF-8 where text was expected.
    #[error("response from {url} is not valid UTF-8")]
    InvalidText { url: String },

    /// Local filesystem operation failed.
    #[error("failed to write {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Nothing to download from.
    #[error("no download candidates for {0}")]
    NoCandidates(String),

    /// The download guard refused a permit.
    #[error(transparent)]
    Concurrency(ConcurrencyError),

    /// The pipeline was cancelled mid-download.
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Returns true if another attempt may succeed.
    ///
    /// Server errors, throttling, timeouts and corrupted transfers are
    /// transient. Client errors such as 404 are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Request { .. }
            | Self::Timeout { .. }
            | Self::SizeMismatch { .. }
            | Self::ChecksumMismatch { .. } => true,
            _ => false,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<ConcurrencyError> for DownloadError {
    fn from(err: ConcurrencyError) -> Self {
        match err {
            ConcurrencyError::Cancelled(_) => Self::Cancelled,
            closed => Self::Concurrency(closed),
        }
    }
}

impl From<DownloadError> for TaskError {
    fn from(err: DownloadError) -> Self {
        if matches!(err, DownloadError::Cancelled) {
            return TaskError::cancelled();
        }
        let message = err.to_string();
        let task_error = if err.is_transient() {
            TaskError::transient(message)
        } else {
            TaskError::new(message)
        };
        task_error.with_source(err)
    }
}
