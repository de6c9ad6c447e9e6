//! Error types for local model operations

use modelgate_common::ModelId;
use thiserror::Error;

/// Failure surfaced by [`crate::ModelStore::ensure`].
///
/// Cloned to every caller waiting on the same download, so the cause is kept
/// as a rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Download failed for model {model}: {cause}")]
    DownloadFailed { model: ModelId, cause: String },
}

impl StoreError {
    /// Model the failure belongs to
    pub fn model(&self) -> &ModelId {
        match self {
            StoreError::DownloadFailed { model, .. } => model,
        }
    }
}

/// Errors raised by a [`crate::Downloader`] implementation
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Model pull failed: {0}")]
    PullFailed(String),

    #[error("Download command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },

    #[error("Downloader reported success but {0} does not exist")]
    ArtifactMissing(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownloadError::Timeout(err.to_string())
        } else {
            DownloadError::NetworkError(err.to_string())
        }
    }
}
