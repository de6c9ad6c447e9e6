//! Mock backend
//!
//! Loads instantly and answers with a canned reply echoing the last user
//! turn. Used for tests and for running the gateway without a model runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use modelgate_common::ModelId;
use modelgate_local_models::ModelArtifact;
use tracing::debug;

use crate::error::{BackendError, InferenceError};
use crate::handle::{ChatMessage, ModelHandle, ModelLoader};

/// Loader producing [`MockHandle`]s
#[derive(Debug, Default)]
pub struct MockLoader {
    latency: Duration,
    loads: AtomicUsize,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every generate call by `latency`
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of instances created so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for MockLoader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn load(&self, artifact: &ModelArtifact) -> Result<Box<dyn ModelHandle>, BackendError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        debug!(model = %artifact.id, "Created mock model instance");
        Ok(Box::new(MockHandle::new(artifact.id.clone(), self.latency)))
    }
}

/// Instance answering `[mock] <model> test model response to: <prompt>`
#[derive(Debug)]
pub struct MockHandle {
    model: ModelId,
    latency: Duration,
}

impl MockHandle {
    pub fn new(model: ModelId, latency: Duration) -> Self {
        Self { model, latency }
    }

    /// Reply the mock gives for `turns`
    pub fn reply(model: &ModelId, turns: &[ChatMessage]) -> String {
        let prompt = turns
            .iter()
            .rev()
            .find(|turn| turn.role == "user")
            .or_else(|| turns.last())
            .map(|turn| turn.content.as_str())
            .unwrap_or_default();
        format!("[mock] {} test model response to: {}", model, prompt)
    }
}

#[async_trait]
impl ModelHandle for MockHandle {
    fn model(&self) -> &ModelId {
        &self.model
    }

    async fn generate(&mut self, turns: &[ChatMessage]) -> Result<String, InferenceError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(Self::reply(&self.model, turns))
    }
}
