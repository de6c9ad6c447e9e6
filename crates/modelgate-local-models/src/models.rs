//! Data models for local model management

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use modelgate_common::ModelId;
use serde::{Deserialize, Serialize};

/// Name of the manifest file written into a model directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Lifecycle of a model's local artifact.
///
/// `Missing -> Downloading -> {Ready | Failed}`. A failed artifact goes back to
/// `Downloading` when a later request retries it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Missing,
    Downloading,
    Ready,
    Failed,
}

/// Local location and status of one model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelArtifact {
    /// Model the artifact belongs to
    pub id: ModelId,

    /// Directory holding the model files
    pub path: PathBuf,

    /// Current status
    pub status: ArtifactStatus,

    /// Number of download attempts started for this model
    pub attempts: u32,

    /// Cause of the most recent failed attempt
    pub last_error: Option<String>,

    /// When the status last changed
    pub updated_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// New record for a model that has not been materialized yet
    pub fn missing(id: ModelId, path: PathBuf) -> Self {
        Self {
            id,
            path,
            status: ArtifactStatus::Missing,
            attempts: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether the artifact can be loaded
    pub fn is_ready(&self) -> bool {
        self.status == ArtifactStatus::Ready
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.status = ArtifactStatus::Downloading;
        self.attempts += 1;
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_ready(&mut self) {
        self.status = ArtifactStatus::Ready;
        self.last_error = None;
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_failed(&mut self, cause: String) {
        self.status = ArtifactStatus::Failed;
        self.last_error = Some(cause);
        self.updated_at = Utc::now();
    }
}

/// Small description written next to the model files by downloaders that do
/// not produce their own layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactManifest {
    /// Model identifier
    pub model: String,

    /// Downloader that produced the directory (e.g. "simulated", "ollama")
    pub source: String,

    /// Content digest, when the source reports one
    pub digest: Option<String>,

    /// When the artifact was created
    pub created_at: DateTime<Utc>,
}

impl ArtifactManifest {
    /// Manifest stamped with the current time
    pub fn new(model: &ModelId, source: &str, digest: Option<String>) -> Self {
        Self {
            model: model.to_string(),
            source: source.to_string(),
            digest,
            created_at: Utc::now(),
        }
    }

    /// Write the manifest into `dir`, creating the directory if needed
    pub async fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(dir).await?;
        let body = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(dir.join(MANIFEST_FILE), body).await
    }

    /// Read the manifest from `dir`
    pub async fn read_from(dir: &Path) -> std::io::Result<Self> {
        let body = tokio::fs::read(dir.join(MANIFEST_FILE)).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Progress information for model pull operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullProgress {
    /// Model name being pulled
    pub model: String,

    /// Current status message
    pub status: String,

    /// Layer digest, if the line carried one
    pub digest: Option<String>,

    /// Total bytes to download
    pub total: u64,

    /// Bytes downloaded so far
    pub completed: u64,
}

impl PullProgress {
    /// Get the progress percentage (0-100)
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }

    /// Check if pull is complete
    pub fn is_complete(&self) -> bool {
        self.completed >= self.total && self.total > 0
    }
}

// Tests live in tests/models.rs
