//! Completion gateway
//!
//! Drives one chat request through
//! `Received -> ResolvingModel -> AwaitingArtifact -> AwaitingHandle ->
//! Generating -> Completed | Failed`.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use modelgate_common::ModelId;
use modelgate_local_models::ModelStore;
use modelgate_pool::{ChatMessage, InstancePool};
use tracing::{debug, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{ChatRequest, ChatResponse};

/// Progress of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Request accepted, not yet validated
    Received,
    /// Picking the model to use
    ResolvingModel,
    /// Waiting for the model to be downloaded
    AwaitingArtifact,
    /// Waiting for exclusive use of a loaded instance
    AwaitingHandle,
    /// Instance is generating the reply
    Generating,
    /// Reply produced
    Completed,
    /// Request ended with the given error kind
    Failed(&'static str),
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestState::Received => write!(f, "received"),
            RequestState::ResolvingModel => write!(f, "resolving_model"),
            RequestState::AwaitingArtifact => write!(f, "awaiting_artifact"),
            RequestState::AwaitingHandle => write!(f, "awaiting_handle"),
            RequestState::Generating => write!(f, "generating"),
            RequestState::Completed => write!(f, "completed"),
            RequestState::Failed(kind) => write!(f, "failed({})", kind),
        }
    }
}

struct Progress {
    state: RequestState,
}

impl Progress {
    fn new() -> Self {
        debug!(state = %RequestState::Received, "Request state");
        Self {
            state: RequestState::Received,
        }
    }

    fn advance(&mut self, next: RequestState) {
        debug!(from = %self.state, to = %next, "Request state");
        self.state = next;
    }
}

/// Accepts chat requests and answers them with a pooled model instance
pub struct CompletionGateway {
    store: Arc<ModelStore>,
    pool: InstancePool,
    default_model: ModelId,
}

impl CompletionGateway {
    /// Create a gateway substituting `default_model` for requests without one
    pub fn new(store: Arc<ModelStore>, pool: InstancePool, default_model: ModelId) -> Self {
        Self {
            store,
            pool,
            default_model,
        }
    }

    /// Model used when a request omits `model`
    pub fn default_model(&self) -> &ModelId {
        &self.default_model
    }

    /// Artifact store
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Instance pool
    pub fn pool(&self) -> &InstancePool {
        &self.pool
    }

    /// Answer one chat request
    pub async fn complete(&self, request: ChatRequest) -> ApiResult<ChatResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!("completion", request_id = %request_id, model = field::Empty);
        self.run(request, span.clone()).instrument(span).await
    }

    async fn run(&self, request: ChatRequest, span: Span) -> ApiResult<ChatResponse> {
        let started = Instant::now();
        let mut progress = Progress::new();

        match self.drive(request, &span, &mut progress).await {
            Ok(response) => {
                progress.advance(RequestState::Completed);
                info!(
                    model = %response.model,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Completion finished"
                );
                Ok(response)
            }
            Err(err) => {
                progress.advance(RequestState::Failed(err.kind()));
                warn!(
                    kind = err.kind(),
                    error = %err,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Completion failed"
                );
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        request: ChatRequest,
        span: &Span,
        progress: &mut Progress,
    ) -> ApiResult<ChatResponse> {
        let turns = validate_messages(request.messages)?;

        progress.advance(RequestState::ResolvingModel);
        let model = self.resolve_model(request.model.as_deref())?;
        span.record("model", field::display(&model));

        progress.advance(RequestState::AwaitingArtifact);
        let artifact = self.store.ensure(&model).await?;

        progress.advance(RequestState::AwaitingHandle);
        let mut handle = self.pool.checkout(&artifact).await?;

        progress.advance(RequestState::Generating);
        // The generation runs on its own task holding the handle, so the
        // handle is checked in once generate returns even if this request is
        // dropped mid-call.
        let generation = tokio::spawn(
            async move {
                let result = handle.generate(&turns).await;
                handle.checkin();
                result
            }
            .instrument(span.clone()),
        );

        let content = match generation.await {
            Ok(Ok(content)) => content,
            Ok(Err(err)) => {
                return Err(ApiError::InferenceFailed {
                    model,
                    cause: err.message,
                })
            }
            Err(join) => {
                return Err(ApiError::InferenceFailed {
                    model,
                    cause: format!("generation task ended abnormally: {}", join),
                })
            }
        };

        Ok(ChatResponse::new(model.as_str(), content))
    }

    fn resolve_model(&self, requested: Option<&str>) -> ApiResult<ModelId> {
        match requested.map(str::trim) {
            None | Some("") => Ok(self.default_model.clone()),
            Some(raw) => Ok(ModelId::parse(raw)?),
        }
    }
}

fn validate_messages(messages: Vec<crate::models::Message>) -> ApiResult<Vec<ChatMessage>> {
    if messages.is_empty() {
        return Err(ApiError::MalformedRequest(
            "messages must contain at least one turn".to_string(),
        ));
    }
    if let Some(index) = messages.iter().position(|m| m.role.trim().is_empty()) {
        return Err(ApiError::MalformedRequest(format!(
            "messages[{}].role cannot be empty",
            index
        )));
    }
    Ok(messages.into_iter().map(ChatMessage::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    fn message(role: &str, content: &str) -> Message {
        Message {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_empty_messages_rejected() {
        let err = validate_messages(vec![]).unwrap_err();
        assert_eq!(err.kind(), "malformed_request");
    }

    #[test]
    fn test_blank_role_rejected() {
        let err = validate_messages(vec![message("user", "hi"), message(" ", "x")]).unwrap_err();
        assert!(err.to_string().contains("messages[1].role"));
    }

    #[test]
    fn test_turns_keep_order() {
        let turns =
            validate_messages(vec![message("system", "s"), message("user", "u")]).unwrap();
        assert_eq!(turns[0], ChatMessage::new("system", "s"));
        assert_eq!(turns[1], ChatMessage::user("u"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RequestState::AwaitingHandle.to_string(), "awaiting_handle");
        assert_eq!(
            RequestState::Failed("pool_exhausted").to_string(),
            "failed(pool_exhausted)"
        );
    }
}
