//! Shared fixtures for the ModelGate end-to-end tests
//!
//! Instrumented download and inference backends plus helpers to build a
//! gateway router over a temporary models directory and talk to it in-process.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
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
use modelgate_local_models::{
    DownloadError, Downloader, ModelArtifact, ModelStore, SimulatedDownloader,
};
use modelgate_pool::{
    BackendError, ChatMessage, InferenceError, InstancePool, MockHandle, ModelHandle, ModelLoader,
    PoolConfig,
};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Default model of [`test_config`]
pub const DEFAULT_MODEL: &str = "Llama-2-7b-chat-glm-4b-q0f16_0";

/// Prompt that makes a [`CountingLoader`] instance fail its generate call
pub const FAILING_PROMPT: &str = "trigger-failure";

/// Default configuration pointed at `models_dir`
pub fn test_config(models_dir: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.models.models_dir = models_dir.to_path_buf();
    config
}

/// Downloader that counts attempts, optionally failing the first few
#[derive(Default)]
pub struct CountingDownloader {
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Duration,
}

impl CountingDownloader {
    /// Succeed after `delay`
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Fail the first `times` attempts
    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            ..Default::default()
        }
    }

    /// Number of download attempts so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for CountingDownloader {
    fn name(&self) -> &str {
        "counting"
    }

    async fn download(&self, model: &ModelId, dest: &Path) -> Result<(), DownloadError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DownloadError::NetworkError("mirror timed out".to_string()));
        }
        SimulatedDownloader::new().download(model, dest).await
    }
}

/// Loader that counts loads; its instances answer like the mock backend and
/// fail on [`FAILING_PROMPT`]
#[derive(Default)]
pub struct CountingLoader {
    loads: AtomicUsize,
    load_delay: Duration,
    generate_delay: Duration,
    fail_loads: bool,
}

impl CountingLoader {
    /// Slow loads
    pub fn with_load_delay(delay: Duration) -> Self {
        Self {
            load_delay: delay,
            ..Default::default()
        }
    }

    /// Slow generate calls
    pub fn with_generate_delay(delay: Duration) -> Self {
        Self {
            generate_delay: delay,
            ..Default::default()
        }
    }

    /// Every load fails after `delay`
    pub fn failing(delay: Duration) -> Self {
        Self {
            load_delay: delay,
            fail_loads: true,
            ..Default::default()
        }
    }

    /// Number of loads so far
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for CountingLoader {
    fn name(&self) -> &str {
        "counting"
    }

    async fn load(&self, artifact: &ModelArtifact) -> Result<Box<dyn ModelHandle>, BackendError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.load_delay).await;
        if self.fail_loads {
            return Err(BackendError::InvalidArtifact(
                "tensor shapes do not match".to_string(),
            ));
        }
        Ok(Box::new(CountingHandle {
            model: artifact.id.clone(),
            delay: self.generate_delay,
        }))
    }
}

struct CountingHandle {
    model: ModelId,
    delay: Duration,
}

#[async_trait]
impl ModelHandle for CountingHandle {
    fn model(&self) -> &ModelId {
        &self.model
    }

    async fn generate(&mut self, turns: &[ChatMessage]) -> Result<String, InferenceError> {
        tokio::time::sleep(self.delay).await;
        if turns.iter().any(|turn| turn.content == FAILING_PROMPT) {
            return Err(InferenceError::new("sampler produced NaN logits"));
        }
        Ok(MockHandle::reply(&self.model, turns))
    }
}

/// Pool and timing settings for [`build_server`]
#[derive(Debug, Clone)]
pub struct PoolSetup {
    pub capacity: usize,
    pub checkout_timeout: Duration,
}

impl Default for PoolSetup {
    fn default() -> Self {
        Self {
            capacity: 1,
            checkout_timeout: Duration::from_secs(5),
        }
    }
}

/// Server over `models_dir` using the given backends
pub fn build_server(
    models_dir: &Path,
    downloader: Arc<dyn Downloader>,
    loader: Arc<dyn ModelLoader>,
    pool: PoolSetup,
) -> ApiServer {
    let store = Arc::new(ModelStore::new(models_dir, downloader));
    let pool = InstancePool::new(
        PoolConfig {
            capacity: pool.capacity,
            checkout_timeout: pool.checkout_timeout,
            idle_timeout: None,
        },
        loader,
    );
    let default_model = ModelId::parse(DEFAULT_MODEL).expect("default model is valid");
    ApiServer::with_gateway(
        test_config(models_dir),
        CompletionGateway::new(store, pool, default_model),
    )
}

/// `POST /v1/chat/completions` with one user turn
pub fn chat_request(model: Option<&str>, content: &str) -> Request<Body> {
    let mut body = json!({ "messages": [{ "role": "user", "content": content }] });
    if let Some(model) = model {
        body["model"] = json!(model);
    }
    Request::builder()
        .method(Method::POST)
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

/// `GET uri`
pub fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("valid request")
}

/// Send `request` through `router` and decode the JSON body
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body is readable");
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

/// Content of the first choice of a chat response
pub fn reply_content(body: &Value) -> &str {
    body["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or_default()
}
