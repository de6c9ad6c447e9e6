use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use modelgate_common::ModelId;
use tracing::info;

use super::Downloader;
use crate::error::DownloadError;
use crate::models::ArtifactManifest;

/// Creates the model directory with a manifest and nothing else.
///
/// Stands in for a real download while no model source is wired up.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDownloader {
    delay: Duration,
}

impl SimulatedDownloader {
    /// Complete immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait `delay` before completing
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Downloader for SimulatedDownloader {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn download(&self, model: &ModelId, dest: &Path) -> Result<(), DownloadError> {
        info!(model = %model, dest = %dest.display(), "Simulating model download");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        ArtifactManifest::new(model, self.name(), None)
            .write_to(dest)
            .await?;
        Ok(())
    }
}
