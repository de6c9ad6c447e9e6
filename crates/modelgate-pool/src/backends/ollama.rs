//! Ollama backend
//!
//! An instance is a model served by a local Ollama daemon; generate calls
//! `/api/chat` without streaming.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use modelgate_common::ModelId;
use modelgate_local_models::ModelArtifact;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::{BackendError, InferenceError};
use crate::handle::{ChatMessage, ModelHandle, ModelLoader};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 400;

fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.status().is_some_and(|s| s.is_server_error())
}

/// Send a request, retrying connection failures, timeouts and 5xx replies with backoff
async fn execute_with_retry<F, Fut>(
    mut request_fn: F,
) -> Result<reqwest::Response, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut attempt = 0;
    loop {
        match request_fn().await {
            Ok(response) => return Ok(response),
            Err(err) if is_transient_error(&err) && attempt < MAX_RETRIES => {
                let backoff_ms = (INITIAL_BACKOFF_MS * 2_u64.pow(attempt)).min(MAX_BACKOFF_MS);
                warn!(
                    attempt = attempt + 1,
                    backoff_ms = backoff_ms,
                    error = %err,
                    "Transient Ollama error, retrying"
                );
                sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Loader producing [`OllamaHandle`]s
#[derive(Debug, Clone)]
pub struct OllamaLoader {
    client: Arc<Client>,
    base_url: String,
}

impl OllamaLoader {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        Self::with_timeout(base_url, Duration::from_secs(300))
    }

    /// Create a loader whose generate calls give up after `timeout`
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(BackendError::ConfigError(
                "Ollama base URL is required".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::ConfigError(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ModelLoader for OllamaLoader {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn load(&self, artifact: &ModelArtifact) -> Result<Box<dyn ModelHandle>, BackendError> {
        if tokio::fs::metadata(&artifact.path).await.is_err() {
            return Err(BackendError::InvalidArtifact(format!(
                "{} does not exist",
                artifact.path.display()
            )));
        }

        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(BackendError::Unreachable(format!(
                "Ollama answered {} on {}",
                response.status(),
                url
            )));
        }

        debug!(model = %artifact.id, base_url = %self.base_url, "Bound Ollama model instance");
        Ok(Box::new(OllamaHandle {
            client: Arc::clone(&self.client),
            base_url: self.base_url.clone(),
            model: artifact.id.clone(),
        }))
    }
}

/// One model served by Ollama
#[derive(Debug)]
pub struct OllamaHandle {
    client: Arc<Client>,
    base_url: String,
    model: ModelId,
}

#[async_trait]
impl ModelHandle for OllamaHandle {
    fn model(&self) -> &ModelId {
        &self.model
    }

    async fn generate(&mut self, turns: &[ChatMessage]) -> Result<String, InferenceError> {
        let request = OllamaChatRequest {
            model: self.model.to_string(),
            messages: turns
                .iter()
                .map(|turn| OllamaMessage {
                    role: turn.role.clone(),
                    content: turn.content.clone(),
                })
                .collect(),
            stream: false,
        };

        let url = format!("{}/api/chat", self.base_url);
        let client = Arc::clone(&self.client);
        let response = execute_with_retry(|| {
            let client = Arc::clone(&client);
            let url = url.clone();
            let request = request.clone();
            async move {
                let response = client.post(url).json(&request).send().await?;
                if response.status().is_server_error() {
                    return response.error_for_status();
                }
                Ok(response)
            }
        })
        .await
        .map_err(|e| {
            error!(model = %self.model, error = %e, "Ollama chat request failed");
            InferenceError::new(format!("Ollama request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(model = %self.model, status = %status, body = %body, "Ollama chat error");
            return Err(InferenceError::new(format!("Ollama API error: {}", status)));
        }

        let body: OllamaChatResponse = response.json().await.map_err(|e| {
            error!(model = %self.model, error = %e, "Failed to parse Ollama response");
            InferenceError::corrupted(format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(body.message.content)
    }
}

#[derive(Debug, Serialize, Clone)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Clone)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    content: String,
}
