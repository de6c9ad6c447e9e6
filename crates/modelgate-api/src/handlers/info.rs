//! Status and configuration endpoints

use axum::{extract::State, Json};

use crate::{
    models::{InfoResponse, RootResponse},
    state::AppState,
};

/// Server status message
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Server is running", body = RootResponse)
    )
)]
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: state.status_message.to_string(),
    })
}

/// Default model
#[utoipa::path(
    get,
    path = "/info",
    responses(
        (status = 200, description = "Gateway configuration", body = InfoResponse)
    )
)]
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        default_model: state.gateway.default_model().to_string(),
    })
}
