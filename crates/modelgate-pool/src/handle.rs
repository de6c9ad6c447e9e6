//! Loaded model instances and the loaders that create them

use async_trait::async_trait;
use modelgate_common::ModelId;
use modelgate_local_models::ModelArtifact;
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, InferenceError};

/// One turn of a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// Speaker (e.g. "system", "user", "assistant")
    pub role: String,
    /// Text of the turn
    pub content: String,
}

impl ChatMessage {
    /// Create a turn
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// A user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// An assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// A loaded model instance.
///
/// `generate` takes `&mut self`: an instance serves one call at a time, and
/// the pool's checkout is what hands out that exclusive access.
#[async_trait]
pub trait ModelHandle: Send {
    /// Model this instance was loaded from
    fn model(&self) -> &ModelId;

    /// Produce the assistant reply for `turns`. May take arbitrarily long.
    async fn generate(&mut self, turns: &[ChatMessage]) -> Result<String, InferenceError>;
}

/// Creates instances from ready artifacts
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Load the model stored at `artifact.path`
    async fn load(&self, artifact: &ModelArtifact) -> Result<Box<dyn ModelHandle>, BackendError>;
}
