//! API request and response models

use modelgate_local_models::ModelArtifact;
use modelgate_pool::{ChatMessage, PoolStats};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One conversation turn on the wire
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Message {
    /// Speaker (e.g. "system", "user", "assistant")
    pub role: String,
    /// Text of the turn
    pub content: String,
}

impl From<Message> for ChatMessage {
    fn from(message: Message) -> Self {
        ChatMessage::new(message.role, message.content)
    }
}

/// Chat completion request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    /// Model to use; the configured default when absent
    #[serde(default)]
    pub model: Option<String>,
    /// Conversation so far, oldest first
    pub messages: Vec<Message>,
}

/// One generated alternative
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Choice {
    /// Generated assistant turn
    pub message: Message,
}

/// Chat completion response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ChatResponse {
    /// Model that answered, after default substitution
    pub model: String,
    /// Always exactly one choice
    pub choices: Vec<Choice>,
}

impl ChatResponse {
    /// Wrap a generated reply
    pub fn new(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            choices: vec![Choice {
                message: Message {
                    role: "assistant".to_string(),
                    content: content.into(),
                },
            }],
        }
    }
}

/// Response of `GET /`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RootResponse {
    /// Status string
    pub message: String,
}

/// Response of `GET /info`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InfoResponse {
    /// Model used when a request omits one
    pub default_model: String,
}

/// Pool occupancy in the health response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PoolHealth {
    /// Maximum number of loaded instances
    pub capacity: usize,
    /// Currently loaded instances
    pub resident: usize,
    /// Instances checked out right now
    pub busy: usize,
}

impl From<PoolStats> for PoolHealth {
    fn from(stats: PoolStats) -> Self {
        Self {
            capacity: stats.capacity,
            resident: stats.resident,
            busy: stats.busy,
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// "ready", "starting" or "degraded"
    pub status: String,
    /// Server version
    pub version: String,
    /// Uptime in seconds
    pub uptime: u64,
    /// Model used when a request omits one
    pub default_model: String,
    /// Pool occupancy
    pub pool: PoolHealth,
}

/// One model known to the store
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelEntry {
    /// Model identifier
    pub id: String,
    /// "missing", "downloading", "ready" or "failed"
    pub status: String,
    /// Local artifact directory
    pub path: String,
    /// Download attempts so far
    pub attempts: u32,
    /// Error of the last failed attempt
    pub last_error: Option<String>,
}

impl From<ModelArtifact> for ModelEntry {
    fn from(artifact: ModelArtifact) -> Self {
        let status = serde_json::to_value(artifact.status)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            id: artifact.id.to_string(),
            status,
            path: artifact.path.display().to_string(),
            attempts: artifact.attempts,
            last_error: artifact.last_error,
        }
    }
}

/// Response of `GET /v1/models`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelListResponse {
    /// Always "list"
    pub object: String,
    /// Known models
    pub data: Vec<ModelEntry>,
}

/// Error body detail
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable kind
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

/// Body of every error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error detail
    pub error: ErrorDetail,
}
