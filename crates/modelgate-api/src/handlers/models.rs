//! Model listing endpoint

use axum::{extract::State, Json};

use crate::{
    models::{ModelEntry, ModelListResponse},
    state::AppState,
};

/// Models the store has seen, with their download status
#[utoipa::path(
    get,
    path = "/v1/models",
    responses(
        (status = 200, description = "Known models", body = ModelListResponse)
    )
)]
pub async fn list_models(State(state): State<AppState>) -> Json<ModelListResponse> {
    let data = state
        .gateway
        .store()
        .artifacts()
        .into_iter()
        .map(ModelEntry::from)
        .collect();

    Json(ModelListResponse {
        object: "list".to_string(),
        data,
    })
}
