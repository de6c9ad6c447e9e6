//! Server bootstrap
//!
//! Builds the store, pool and gateway from a [`GatewayConfig`], owns the
//! background tasks (idle reaper, warm-up) and serves the router.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use modelgate_common::ModelId;
use modelgate_config::{BackendConfig, DownloadConfig, GatewayConfig};
use modelgate_local_models::{
    CommandDownloader, Downloader, ModelStore, OllamaDownloader, SimulatedDownloader,
};
use modelgate_pool::{InstancePool, MockLoader, ModelLoader, OllamaLoader, PoolConfig};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::ServerError;
use crate::gateway::CompletionGateway;
use crate::routes;
use crate::state::{AppState, Readiness};

/// Build the downloader selected by configuration
pub fn build_downloader(config: &DownloadConfig) -> Result<Arc<dyn Downloader>, ServerError> {
    let downloader: Arc<dyn Downloader> = match config {
        DownloadConfig::Simulated { delay_ms } => {
            Arc::new(SimulatedDownloader::with_delay(Duration::from_millis(*delay_ms)))
        }
        DownloadConfig::Command { program, args } => {
            Arc::new(CommandDownloader::new(program.clone(), args.clone()))
        }
        DownloadConfig::Ollama { base_url } => Arc::new(OllamaDownloader::new(base_url.clone())?),
    };
    Ok(downloader)
}

/// Build the inference backend selected by configuration
pub fn build_loader(config: &BackendConfig) -> Result<Arc<dyn ModelLoader>, ServerError> {
    let loader: Arc<dyn ModelLoader> = match config {
        BackendConfig::Mock { latency_ms } => {
            Arc::new(MockLoader::with_latency(Duration::from_millis(*latency_ms)))
        }
        BackendConfig::Ollama {
            base_url,
            timeout_secs,
        } => Arc::new(OllamaLoader::with_timeout(
            base_url.clone(),
            Duration::from_secs(*timeout_secs),
        )?),
    };
    Ok(loader)
}

/// Build the artifact store described by `config`
pub fn build_store(config: &GatewayConfig) -> Result<Arc<ModelStore>, ServerError> {
    let downloader = build_downloader(&config.models.download)?;
    Ok(Arc::new(ModelStore::new(
        config.models.models_dir.clone(),
        downloader,
    )))
}

/// A configured gateway with its background tasks
pub struct ApiServer {
    config: GatewayConfig,
    state: AppState,
    tasks: Vec<JoinHandle<()>>,
}

impl ApiServer {
    /// Wire store, pool and gateway from configuration
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let store = build_store(&config)?;
        let loader = build_loader(&config.backend)?;
        let pool = InstancePool::new(
            PoolConfig {
                capacity: config.pool.capacity,
                checkout_timeout: config.pool.checkout_timeout(),
                idle_timeout: config.pool.idle_timeout(),
            },
            loader,
        );
        let default_model = ModelId::parse(&config.models.default_model)?;
        Ok(Self::with_gateway(
            config,
            CompletionGateway::new(store, pool, default_model),
        ))
    }

    /// Use an already assembled gateway
    pub fn with_gateway(config: GatewayConfig, gateway: CompletionGateway) -> Self {
        let state = AppState::new(Arc::new(gateway), config.server.status_message.clone());
        Self {
            config,
            state,
            tasks: Vec::new(),
        }
    }

    /// Shared handler state
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Configuration the server was built from
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Router serving every endpoint
    pub fn router(&self) -> Router {
        routes::router(self.state.clone(), self.config.server.static_dir.as_deref())
    }

    /// Start the idle reaper and, if configured, the warm-up of the default
    /// model. Readiness becomes `ready` immediately when nothing is preloaded.
    pub fn start_background(&mut self) {
        if self.config.pool.idle_timeout().is_some() {
            let reaper = self
                .state
                .gateway
                .pool()
                .spawn_reaper(self.config.pool.reap_interval());
            self.tasks.push(reaper);
        }

        if self.config.models.preload_default {
            let warm_up = spawn_warm_up(self.state.clone());
            self.tasks.push(warm_up);
        } else {
            self.state.set_readiness(Readiness::Ready);
        }
    }

    /// Bind and serve until ctrl-c
    pub async fn serve(mut self) -> Result<(), ServerError> {
        self.start_background();

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let local: SocketAddr = listener.local_addr()?;
        info!(
            address = %local,
            default_model = %self.state.gateway.default_model(),
            device = %self.config.models.device,
            models_dir = %self.config.models.models_dir.display(),
            downloader = self.state.gateway.store().downloader_name(),
            backend = self.state.gateway.pool().loader_name(),
            capacity = self.config.pool.capacity,
            "ModelGate listening"
        );

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;
        self.shutdown();
        result.map_err(ServerError::from)
    }

    /// Stop background tasks
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Download and load the default model in the background, reporting the
/// outcome through readiness
pub fn spawn_warm_up(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let gateway = Arc::clone(&state.gateway);
        let model = gateway.default_model().clone();
        info!(model = %model, "Warming up default model");

        let outcome = match gateway.store().ensure(&model).await {
            Ok(artifact) => gateway
                .pool()
                .checkout(&artifact)
                .await
                .map(|handle| handle.checkin())
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(()) => {
                state.set_readiness(Readiness::Ready);
                info!(model = %model, "Default model ready");
            }
            Err(cause) => {
                state.set_readiness(Readiness::Degraded);
                error!(model = %model, error = %cause, "Warm-up failed");
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
