//! Router tests driven through `tower::ServiceExt::oneshot`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use modelgate::{ApiServer, CompletionGateway};
use modelgate_common::ModelId;
use modelgate_config::GatewayConfig;
use modelgate_local_models::{DownloadError, Downloader, ModelArtifact, ModelStore};
use modelgate_pool::{
    BackendError, ChatMessage, InferenceError, InstancePool, MockLoader, ModelHandle, ModelLoader,
    PoolConfig,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const DEFAULT: &str = "Llama-2-7b-chat-glm-4b-q0f16_0";

fn config(models_dir: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.models.models_dir = models_dir.to_path_buf();
    config
}

fn server(models_dir: &Path) -> ApiServer {
    ApiServer::new(config(models_dir)).unwrap()
}

fn custom_server(
    models_dir: &Path,
    downloader: Arc<dyn Downloader>,
    loader: Arc<dyn ModelLoader>,
    checkout_timeout: Duration,
) -> ApiServer {
    let store = Arc::new(ModelStore::new(models_dir, downloader));
    let pool = InstancePool::new(
        PoolConfig {
            capacity: 1,
            checkout_timeout,
            idle_timeout: None,
        },
        loader,
    );
    let gateway = CompletionGateway::new(store, pool, ModelId::parse(DEFAULT).unwrap());
    ApiServer::with_gateway(config(models_dir), gateway)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    post_raw(uri, body.to_string())
}

fn post_raw(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn chat(model: Option<&str>, content: &str) -> Request<Body> {
    let mut body = json!({ "messages": [{ "role": "user", "content": content }] });
    if let Some(model) = model {
        body["model"] = json!(model);
    }
    post_json("/v1/chat/completions", body)
}

struct FailingDownloader;

#[async_trait]
impl Downloader for FailingDownloader {
    fn name(&self) -> &str {
        "failing"
    }

    async fn download(&self, _model: &ModelId, _dest: &Path) -> Result<(), DownloadError> {
        Err(DownloadError::NetworkError("registry unreachable".to_string()))
    }
}

fn simulated() -> Arc<dyn Downloader> {
    Arc::new(modelgate_local_models::SimulatedDownloader::new())
}

struct FailingLoader;

#[async_trait]
impl ModelLoader for FailingLoader {
    fn name(&self) -> &str {
        "failing"
    }

    async fn load(&self, _artifact: &ModelArtifact) -> Result<Box<dyn ModelHandle>, BackendError> {
        Err(BackendError::InvalidArtifact("not enough memory".to_string()))
    }
}

/// Loader whose instances fail on the prompt "boom"
struct BoomLoader;

struct BoomHandle(ModelId);

#[async_trait]
impl ModelLoader for BoomLoader {
    fn name(&self) -> &str {
        "boom"
    }

    async fn load(&self, artifact: &ModelArtifact) -> Result<Box<dyn ModelHandle>, BackendError> {
        Ok(Box::new(BoomHandle(artifact.id.clone())))
    }
}

#[async_trait]
impl ModelHandle for BoomHandle {
    fn model(&self) -> &ModelId {
        &self.0
    }

    async fn generate(&mut self, turns: &[ChatMessage]) -> Result<String, InferenceError> {
        match turns.last() {
            Some(turn) if turn.content == "boom" => Err(InferenceError::new("kernel fault")),
            _ => Ok("fine".to_string()),
        }
    }
}

// ============================================================================
// Status endpoints
// ============================================================================

#[tokio::test]
async fn test_root_returns_status_message() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(server(dir.path()).router(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "MLC-LLM server running" }));
}

#[tokio::test]
async fn test_info_returns_default_model() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(server(dir.path()).router(), get("/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "default_model": DEFAULT }));
}

#[tokio::test]
async fn test_health_reports_readiness_and_pool() {
    let dir = TempDir::new().unwrap();
    let mut server = server(dir.path());

    let (_, body) = send(server.router(), get("/health")).await;
    assert_eq!(body["status"], "starting");

    server.start_background();
    let (status, body) = send(server.router(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["default_model"], DEFAULT);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["pool"], json!({ "capacity": 1, "resident": 0, "busy": 0 }));
}

#[tokio::test]
async fn test_preload_warms_default_model() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path());
    config.models.preload_default = true;
    let mut server = ApiServer::new(config).unwrap();
    server.start_background();

    let mut status = Value::Null;
    for _ in 0..50 {
        let (_, body) = send(server.router(), get("/health")).await;
        status = body["status"].clone();
        if status != "starting" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, "ready");

    let (_, body) = send(server.router(), get("/health")).await;
    assert_eq!(body["pool"]["resident"], 1);
    assert!(dir.path().join(DEFAULT).is_dir());
}

#[tokio::test]
async fn test_failed_preload_is_degraded() {
    let dir = TempDir::new().unwrap();
    let server = custom_server(
        dir.path(),
        Arc::new(FailingDownloader),
        Arc::new(MockLoader::new()),
        Duration::from_secs(1),
    );
    modelgate::server::spawn_warm_up(server.state().clone())
        .await
        .unwrap();

    let (_, body) = send(server.router(), get("/health")).await;
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_openapi_document() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(server(dir.path()).router(), get("/api-docs/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/v1/chat/completions"]["post"].is_object());
    assert!(body["components"]["schemas"]["ChatRequest"].is_object());
}

#[tokio::test]
async fn test_static_front_end_under_ui() {
    let dir = TempDir::new().unwrap();
    let assets = TempDir::new().unwrap();
    std::fs::write(assets.path().join("index.html"), "<h1>chat</h1>").unwrap();

    let mut config = config(dir.path());
    config.server.static_dir = Some(assets.path().to_path_buf());
    let app = ApiServer::new(config).unwrap().router();

    let response = app.oneshot(get("/ui/index.html")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"<h1>chat</h1>");
}

// ============================================================================
// Chat completions
// ============================================================================

#[tokio::test]
async fn test_default_model_is_substituted_and_echoed() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(server(dir.path()).router(), chat(None, "hello")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], DEFAULT);
    assert_eq!(
        body["choices"],
        json!([{
            "message": {
                "role": "assistant",
                "content": format!("[mock] {} test model response to: hello", DEFAULT)
            }
        }])
    );
}

#[tokio::test]
async fn test_requested_model_is_downloaded_and_listed() {
    let dir = TempDir::new().unwrap();
    let server = server(dir.path());

    let (status, body) = send(server.router(), chat(Some("phi-2"), "hi")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "phi-2");
    assert!(dir.path().join("phi-2").join("manifest.json").is_file());

    let (status, body) = send(server.router(), get("/v1/models")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "list");
    assert_eq!(body["data"][0]["id"], "phi-2");
    assert_eq!(body["data"][0]["status"], "ready");
    assert_eq!(body["data"][0]["attempts"], 1);
}

#[tokio::test]
async fn test_blank_model_uses_default() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(server(dir.path()).router(), chat(Some("  "), "x")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], DEFAULT);
}

#[tokio::test]
async fn test_malformed_requests_are_rejected() {
    let dir = TempDir::new().unwrap();
    let server = server(dir.path());

    let cases = [
        post_json("/v1/chat/completions", json!({ "model": "phi-2" })),
        post_json("/v1/chat/completions", json!({ "messages": [] })),
        post_json(
            "/v1/chat/completions",
            json!({ "messages": [{ "role": "", "content": "x" }] }),
        ),
        post_json(
            "/v1/chat/completions",
            json!({ "messages": "not a list" }),
        ),
        post_raw("/v1/chat/completions", "{not json".to_string()),
        chat(Some("bad\u{0007}model"), "x"),
    ];

    for request in cases {
        let (status, body) = send(server.router(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
        assert_eq!(body["error"]["kind"], "malformed_request");
        assert!(body["error"]["message"].is_string());
    }

    // Rejected before any download was attempted
    assert!(server.state().gateway.store().artifacts().is_empty());
}

#[tokio::test]
async fn test_download_failure_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let server = custom_server(
        dir.path(),
        Arc::new(FailingDownloader),
        Arc::new(MockLoader::new()),
        Duration::from_secs(1),
    );

    let (status, body) = send(server.router(), chat(Some("phi-2"), "x")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["kind"], "download_failed");
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("phi-2"));
    assert!(message.contains("registry unreachable"));
}

#[tokio::test]
async fn test_load_failure_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let server = custom_server(
        dir.path(),
        simulated(),
        Arc::new(FailingLoader),
        Duration::from_secs(1),
    );

    let (status, body) = send(server.router(), chat(None, "x")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["kind"], "load_failed");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("not enough memory"));
}

#[tokio::test]
async fn test_inference_failure_then_recovery() {
    let dir = TempDir::new().unwrap();
    let server = custom_server(
        dir.path(),
        simulated(),
        Arc::new(BoomLoader),
        Duration::from_secs(1),
    );

    let (status, body) = send(server.router(), chat(None, "boom")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["kind"], "inference_failed");

    let (status, body) = send(server.router(), chat(None, "again")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["choices"][0]["message"]["content"], "fine");
}

#[tokio::test]
async fn test_pool_exhaustion_is_retry_later() {
    let dir = TempDir::new().unwrap();
    let server = custom_server(
        dir.path(),
        simulated(),
        Arc::new(MockLoader::new()),
        Duration::from_millis(50),
    );

    // Hold the only slot with another model
    let gateway = Arc::clone(&server.state().gateway);
    let other = ModelId::parse("other").unwrap();
    let artifact = gateway.store().ensure(&other).await.unwrap();
    let held = gateway.pool().checkout(&artifact).await.unwrap();

    let response = server.router().oneshot(chat(None, "x")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    held.checkin();
    let (status, _) = send(server.router(), chat(None, "x")).await;
    assert_eq!(status, StatusCode::OK);
}
