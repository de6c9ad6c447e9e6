//! Model pulls through the Ollama API

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use modelgate_common::ModelId;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use super::Downloader;
use crate::error::DownloadError;
use crate::models::{ArtifactManifest, PullProgress};

/// Connect timeout for Ollama requests (10 seconds)
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default pool idle timeout (90 seconds)
const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Default TCP keep-alive interval (60 seconds)
const DEFAULT_TCP_KEEPALIVE_SECS: u64 = 60;

/// One line of the streaming `/api/pull` response
#[derive(Debug, Deserialize)]
struct OllamaPullResponse {
    #[serde(default)]
    status: String,
    digest: Option<String>,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

/// Pulls models from an Ollama registry.
///
/// Ollama keeps the weights in its own store; the artifact directory receives
/// a manifest recording the pull.
pub struct OllamaDownloader {
    client: Arc<Client>,
    base_url: String,
}

impl OllamaDownloader {
    /// Create a downloader for the Ollama server at `base_url` with no overall
    /// request timeout (pulls of large models can take a long time)
    pub fn new(base_url: String) -> Result<Self, DownloadError> {
        Self::build(base_url, None)
    }

    /// Create a downloader whose requests give up after `timeout`
    pub fn with_timeout(base_url: String, timeout: Duration) -> Result<Self, DownloadError> {
        Self::build(base_url, Some(timeout))
    }

    fn build(base_url: String, timeout: Option<Duration>) -> Result<Self, DownloadError> {
        if base_url.is_empty() {
            return Err(DownloadError::ConfigError(
                "Ollama base URL is required".to_string(),
            ));
        }

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_idle_timeout(Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT_SECS))
            .tcp_keepalive(Duration::from_secs(DEFAULT_TCP_KEEPALIVE_SECS));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            DownloadError::ConfigError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Pull a model and return the progress lines reported by the server
    pub async fn pull(&self, model: &ModelId) -> Result<Vec<PullProgress>, DownloadError> {
        debug!("Pulling model: {}", model);

        let url = format!("{}/api/pull", self.base_url);
        let request_body = serde_json::json!({
            "name": model.as_str(),
            "stream": true
        });

        let response = self.client.post(&url).json(&request_body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Failed to pull model {}: {}", model, error_text);
            return Err(DownloadError::PullFailed(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let body = response.text().await.map_err(|e| {
            error!("Failed to read pull response: {}", e);
            DownloadError::NetworkError(e.to_string())
        })?;

        let mut progress_updates = Vec::new();
        for line in body.lines() {
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<OllamaPullResponse>(line) {
                Ok(resp) => {
                    if let Some(message) = resp.error {
                        error!("Ollama reported pull error for {}: {}", model, message);
                        return Err(DownloadError::PullFailed(message));
                    }
                    progress_updates.push(PullProgress {
                        model: model.to_string(),
                        status: resp.status,
                        digest: resp.digest,
                        total: resp.total.unwrap_or(0),
                        completed: resp.completed.unwrap_or(0),
                    });
                }
                Err(e) => {
                    warn!("Failed to parse pull response line: {}", e);
                }
            }
        }

        if progress_updates.last().map(|p| p.status.as_str()) != Some("success") {
            return Err(DownloadError::PullFailed(format!(
                "pull of {} ended without a success status",
                model
            )));
        }

        info!("Successfully pulled model: {}", model);
        Ok(progress_updates)
    }
}

#[async_trait]
impl Downloader for OllamaDownloader {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn download(&self, model: &ModelId, dest: &Path) -> Result<(), DownloadError> {
        let progress = self.pull(model).await?;
        let digest = progress.iter().rev().find_map(|p| p.digest.clone());
        ArtifactManifest::new(model, self.name(), digest)
            .write_to(dest)
            .await?;
        Ok(())
    }
}
