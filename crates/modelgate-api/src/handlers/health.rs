//! Health check endpoint

use axum::{extract::State, Json};

use crate::{models::HealthResponse, state::AppState};

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Readiness and pool occupancy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway = &state.gateway;
    Json(HealthResponse {
        status: state.readiness().as_str().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.uptime_seconds(),
        default_model: gateway.default_model().to_string(),
        pool: gateway.pool().stats().into(),
    })
}
