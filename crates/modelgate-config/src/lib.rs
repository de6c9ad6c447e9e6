//! ModelGate Configuration Management
//!
//! Loads the process-wide [`GatewayConfig`] from an optional TOML file layered
//! under `MODELGATE_*` environment variables, validates it, and writes it back.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{ConfigError, Result};
pub use manager::ConfigManager;
pub use types::{
    BackendConfig, ConfigManager as ConfigManagerTrait, DownloadConfig, GatewayConfig,
    LoggingConfig, ModelsConfig, PoolSettings, ServerConfig,
};
