//! Local Model Store for ModelGate
//!
//! Resolves model identifiers to directories on local disk and materializes
//! missing models on demand through a pluggable [`Downloader`]. Concurrent
//! requests for the same model share a single download.

pub mod download;
pub mod error;
pub mod models;
pub mod store;

pub use download::{CommandDownloader, Downloader, OllamaDownloader, SimulatedDownloader};
pub use error::{DownloadError, StoreError};
pub use models::{ArtifactManifest, ArtifactStatus, ModelArtifact, PullProgress};
pub use modelgate_common::ModelId;
pub use store::ModelStore;

/// Result type for model store operations
pub type Result<T> = std::result::Result<T, StoreError>;
