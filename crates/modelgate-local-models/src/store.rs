//! Model store: resolves identifiers to local artifacts, downloading on demand
//!
//! The artifact table is a sharded map, so lookups and status changes for one
//! model never block another. Downloads go through a [`SingleFlight`] keyed
//! by model: callers that arrive while a download is running attach to it,
//! and all of them observe the same outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use modelgate_common::{ModelId, SingleFlight};
use tracing::{debug, info, warn};

use crate::{
    download::Downloader,
    error::{DownloadError, StoreError},
    models::{ArtifactStatus, ModelArtifact},
    Result,
};

type ArtifactTable = Arc<DashMap<ModelId, ModelArtifact>>;

/// Owns the artifact record of every model referenced during the process
/// lifetime
pub struct ModelStore {
    root: PathBuf,
    downloader: Arc<dyn Downloader>,
    artifacts: ArtifactTable,
    downloads: SingleFlight<ModelId, Result<ModelArtifact>>,
}

impl ModelStore {
    /// Create a store rooted at `root` that fetches missing models with
    /// `downloader`
    pub fn new(root: impl Into<PathBuf>, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            root: root.into(),
            downloader,
            artifacts: Arc::new(DashMap::new()),
            downloads: SingleFlight::new(),
        }
    }

    /// Directory holding one subdirectory per model
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the configured downloader
    pub fn downloader_name(&self) -> &str {
        self.downloader.name()
    }

    /// Where `model` lives (or will live) on disk
    pub fn artifact_path(&self, model: &ModelId) -> PathBuf {
        self.root.join(model.storage_name())
    }

    /// Snapshot of the record for `model`, if it has been referenced
    pub fn artifact(&self, model: &ModelId) -> Option<ModelArtifact> {
        self.artifacts.get(model).map(|entry| entry.value().clone())
    }

    /// Snapshot of every record, ordered by identifier
    pub fn artifacts(&self) -> Vec<ModelArtifact> {
        let mut all: Vec<ModelArtifact> = self
            .artifacts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Current status of `model`; unreferenced models are `Missing`
    pub fn status(&self, model: &ModelId) -> ArtifactStatus {
        self.artifacts
            .get(model)
            .map(|entry| entry.status)
            .unwrap_or(ArtifactStatus::Missing)
    }

    /// Whether a download for `model` is running right now
    pub fn is_downloading(&self, model: &ModelId) -> bool {
        self.downloads.is_in_flight(model)
    }

    /// Make sure `model` is available locally.
    ///
    /// Returns at once when the artifact is already `Ready`. Otherwise starts a
    /// download, or joins the one already running for this model, and waits
    /// for it to finish. A failed download is reported to every waiter; a
    /// later call starts a new attempt.
    pub async fn ensure(&self, model: &ModelId) -> Result<ModelArtifact> {
        if let Some(ready) = self.ready_artifact(model) {
            return Ok(ready);
        }

        let artifacts = Arc::clone(&self.artifacts);
        let downloader = Arc::clone(&self.downloader);
        let path = self.artifact_path(model);
        let id = model.clone();

        self.downloads
            .run(model.clone(), move || materialize(artifacts, downloader, id, path))
            .await
            .unwrap_or_else(|abandoned| {
                Err(StoreError::DownloadFailed {
                    model: model.clone(),
                    cause: abandoned.to_string(),
                })
            })
    }

    fn ready_artifact(&self, model: &ModelId) -> Option<ModelArtifact> {
        self.artifacts
            .get(model)
            .filter(|entry| entry.is_ready())
            .map(|entry| entry.value().clone())
    }
}

/// Body of one download attempt; runs on the single-flight task
async fn materialize(
    artifacts: ArtifactTable,
    downloader: Arc<dyn Downloader>,
    model: ModelId,
    path: PathBuf,
) -> Result<ModelArtifact> {
    // A previous attempt may have finished between the caller's fast-path
    // check and this attempt being registered.
    if let Some(ready) = artifacts
        .get(&model)
        .filter(|entry| entry.is_ready())
        .map(|entry| entry.value().clone())
    {
        return Ok(ready);
    }

    if dir_exists(&path).await {
        debug!(model = %model, path = %path.display(), "Model already present on disk");
        return Ok(update(&artifacts, &model, &path, ModelArtifact::mark_ready));
    }

    let attempt = update(&artifacts, &model, &path, ModelArtifact::begin_attempt).attempts;
    info!(
        model = %model,
        attempt,
        downloader = downloader.name(),
        path = %path.display(),
        "Downloading model"
    );

    let started = Instant::now();
    let outcome = match downloader.download(&model, &path).await {
        Ok(()) => {
            if dir_exists(&path).await {
                Ok(())
            } else {
                Err(DownloadError::ArtifactMissing(path.display().to_string()))
            }
        }
        Err(e) => Err(e),
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => {
            info!(model = %model, attempt, duration_ms, "Model ready");
            Ok(update(&artifacts, &model, &path, ModelArtifact::mark_ready))
        }
        Err(e) => {
            let cause = e.to_string();
            warn!(model = %model, attempt, duration_ms, error = %cause, "Model download failed");
            remove_partial(&path).await;
            update(&artifacts, &model, &path, |artifact| {
                artifact.mark_failed(cause.clone())
            });
            Err(StoreError::DownloadFailed { model, cause })
        }
    }
}

/// Apply `change` to the record for `model`, creating it if needed, and
/// return the updated snapshot. The shard lock is released before returning.
fn update(
    artifacts: &DashMap<ModelId, ModelArtifact>,
    model: &ModelId,
    path: &Path,
    change: impl FnOnce(&mut ModelArtifact),
) -> ModelArtifact {
    let mut entry = artifacts
        .entry(model.clone())
        .or_insert_with(|| ModelArtifact::missing(model.clone(), path.to_path_buf()));
    change(entry.value_mut());
    entry.value().clone()
}

async fn dir_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

async fn remove_partial(path: &Path) {
    if dir_exists(path).await {
        if let Err(e) = tokio::fs::remove_dir_all(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove partial download");
        }
    }
}
