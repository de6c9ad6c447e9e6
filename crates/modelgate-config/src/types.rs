//! Core configuration types and data structures

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Model served when a request does not name one
pub const DEFAULT_MODEL: &str = "Llama-2-7b-chat-glm-4b-q0f16_0";

/// Main gateway configuration, built once at startup and passed explicitly to
/// the components that need it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Model resolution and download configuration
    pub models: ModelsConfig,
    /// Instance pool configuration
    pub pool: PoolSettings,
    /// Inference backend configuration
    pub backend: BackendConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Directory of static front-end assets served under `/ui`
    pub static_dir: Option<PathBuf>,
    /// Message returned by `GET /`
    pub status_message: String,
}

/// Model resolution and download configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    /// Identifier substituted when a request omits `model`
    pub default_model: String,
    /// Root directory holding one subdirectory per downloaded model
    pub models_dir: PathBuf,
    /// Device the backend should run on (e.g. "cpu", "cuda")
    pub device: String,
    /// Download and load the default model in the background at startup
    pub preload_default: bool,
    /// How missing models are materialized
    pub download: DownloadConfig,
}

/// Download backend selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadConfig {
    /// Create the model directory locally without fetching anything
    Simulated {
        /// Artificial delay before the download completes
        #[serde(default)]
        delay_ms: u64,
    },
    /// Run an external command; `{model}` and `{dest}` are substituted in args
    Command {
        /// Executable to run
        program: String,
        /// Argument templates
        #[serde(default)]
        args: Vec<String>,
    },
    /// Pull through an Ollama server
    Ollama {
        /// Ollama base URL (e.g. "http://localhost:11434")
        base_url: String,
    },
}

/// Instance pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of loaded model instances
    pub capacity: usize,
    /// How long a checkout may wait for a free instance or capacity
    pub checkout_timeout_ms: u64,
    /// Evict free instances idle for longer than this
    pub idle_timeout_secs: Option<u64>,
    /// How often the idle reaper runs
    pub reap_interval_secs: u64,
}

/// Inference backend selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Placeholder backend that echoes the prompt
    Mock {
        /// Artificial latency per generate call
        #[serde(default)]
        latency_ms: u64,
    },
    /// Generate through an Ollama server's chat endpoint
    Ollama {
        /// Ollama base URL
        base_url: String,
        /// Request timeout in seconds
        #[serde(default = "default_backend_timeout_secs")]
        timeout_secs: u64,
    },
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level when `RUST_LOG` is not set
    pub level: String,
}

fn default_backend_timeout_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            static_dir: None,
            status_message: "MLC-LLM server running".to_string(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            models_dir: default_models_dir(),
            device: "cpu".to_string(),
            preload_default: false,
            download: DownloadConfig::default(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig::Simulated { delay_ms: 0 }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            capacity: 1,
            checkout_timeout_ms: 30_000,
            idle_timeout_secs: None,
            reap_interval_secs: 30,
        }
    }
}

impl PoolSettings {
    /// Checkout wait bound
    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }

    /// Idle eviction threshold, if enabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    /// Reaper period
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Mock { latency_ms: 0 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `~/.mlc/mlc-llm`, or `./.mlc/mlc-llm` when no home directory is known
pub fn default_models_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mlc")
        .join("mlc-llm")
}

/// Configuration manager trait
pub trait ConfigManager {
    /// Load configuration
    fn load_config(&mut self) -> Result<GatewayConfig, crate::error::ConfigError>;
    /// Save configuration
    fn save_config(&self, config: &GatewayConfig) -> Result<(), crate::error::ConfigError>;
    /// Validate configuration
    fn validate_config(&self, config: &GatewayConfig) -> Result<(), crate::error::ConfigError>;
}
