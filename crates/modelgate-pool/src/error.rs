//! Error types for the instance pool and inference backends

use modelgate_common::ModelId;
use thiserror::Error;

/// Failure of [`crate::InstancePool::checkout`]
///
/// Cloned to every caller sharing one lazy load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("No instance of {model} became available in time (pool capacity {capacity})")]
    Exhausted { model: ModelId, capacity: usize },

    #[error("Failed to load model {model}: {cause}")]
    LoadFailed { model: ModelId, cause: String },
}

/// Failure of a single generate call.
///
/// `corrupted` means the instance can no longer be trusted; the pool drops it
/// at checkin and loads a fresh one on the next checkout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InferenceError {
    pub message: String,
    pub corrupted: bool,
}

impl InferenceError {
    /// Failure that leaves the instance usable
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            corrupted: false,
        }
    }

    /// Failure that leaves the instance in an unknown state
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            corrupted: true,
        }
    }
}

/// Errors raised by a [`crate::ModelLoader`] while creating an instance
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Artifact not usable: {0}")]
    InvalidArtifact(String),

    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Unreachable(err.to_string())
    }
}
