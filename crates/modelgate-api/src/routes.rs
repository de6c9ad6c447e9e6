//! API route definitions

use std::path::Path;

use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use utoipa::OpenApi;

use crate::{
    handlers::{chat, health, info, models},
    middleware::logging_middleware,
    state::AppState,
};

/// API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(info::root))
        .route("/info", get(info::info))
        .route("/health", get(health::health_check))
        .route("/v1/models", get(models::list_models))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/api-docs/openapi.json", get(openapi_json))
}

/// Full router: API routes, optional static front-end under `/ui`, logging
/// and CORS
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut routes = api_routes();
    if let Some(dir) = static_dir {
        routes = routes.nest_service("/ui", ServeDir::new(dir));
    }

    routes
        .layer(middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        info::root,
        info::info,
        health::health_check,
        models::list_models,
        chat::chat_completions,
    ),
    components(schemas(
        crate::models::Message,
        crate::models::ChatRequest,
        crate::models::Choice,
        crate::models::ChatResponse,
        crate::models::RootResponse,
        crate::models::InfoResponse,
        crate::models::PoolHealth,
        crate::models::HealthResponse,
        crate::models::ModelEntry,
        crate::models::ModelListResponse,
        crate::models::ErrorDetail,
        crate::models::ErrorResponse,
    )),
    info(
        title = "ModelGate API",
        version = "0.1.0",
        description = "Chat completions served by locally materialized models"
    )
)]
struct ApiDoc;
