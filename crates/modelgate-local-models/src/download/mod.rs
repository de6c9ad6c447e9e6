//! Download backends
//!
//! A [`Downloader`] turns a model identifier into a populated directory. The
//! store decides *when* to download and guarantees at most one concurrent
//! download per model; implementations only decide *how*.

mod command;
mod ollama;
mod simulated;

use std::path::Path;

use async_trait::async_trait;
use modelgate_common::ModelId;

use crate::error::DownloadError;

pub use command::CommandDownloader;
pub use ollama::OllamaDownloader;
pub use simulated::SimulatedDownloader;

/// Materializes a model into a local directory
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Short name used in logs and manifests
    fn name(&self) -> &str;

    /// Fetch `model` so that `dest` exists and holds its files.
    async fn download(&self, model: &ModelId, dest: &Path) -> Result<(), DownloadError>;
}
