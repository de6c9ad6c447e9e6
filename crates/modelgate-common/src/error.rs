//! Error types shared across crates

use thiserror::Error;

/// Rejected model identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidModelId {
    #[error("Model identifier cannot be empty")]
    Empty,

    #[error("Model identifier exceeds {max} bytes (got {actual})")]
    TooLong { max: usize, actual: usize },

    #[error("Model identifier contains control characters")]
    ControlCharacter,
}

/// The task driving a single-flight operation ended without producing a value
/// (it panicked or the runtime shut down).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("In-flight operation for '{key}' was abandoned")]
pub struct FlightAbandoned {
    pub key: String,
}
