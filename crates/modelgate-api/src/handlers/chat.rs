//! Chat completions endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::{
    error::{ApiError, ApiResult},
    models::{ChatRequest, ChatResponse},
    state::AppState,
};

/// Generate the assistant reply for a conversation
#[utoipa::path(
    post,
    path = "/v1/chat/completions",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Reply generated", body = ChatResponse),
        (status = 400, description = "Malformed request", body = crate::models::ErrorResponse),
        (status = 429, description = "No instance available, retry later",
            body = crate::models::ErrorResponse),
        (status = 500, description = "Inference failed", body = crate::models::ErrorResponse),
        (status = 503, description = "Model could not be downloaded or loaded",
            body = crate::models::ErrorResponse)
    )
)]
pub async fn chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let Json(request) =
        payload.map_err(|rejection| ApiError::MalformedRequest(rejection.body_text()))?;
    state.gateway.complete(request).await.map(Json)
}
