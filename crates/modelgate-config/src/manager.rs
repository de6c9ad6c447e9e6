//! Configuration manager implementation

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use crate::{
    error::{ConfigError, Result},
    types::{BackendConfig, ConfigManager as ConfigManagerTrait, DownloadConfig, GatewayConfig},
};

/// Prefix of environment overrides, e.g. `MODELGATE_POOL__CAPACITY=2`
pub const ENV_PREFIX: &str = "MODELGATE";

/// Configuration manager
pub struct ConfigManager {
    /// Configuration file path
    config_path: PathBuf,
    /// Environment prefix
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Create with custom config path
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: path,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Override the environment prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Path the manager reads from and writes to
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load and validate in one step
    pub fn load(&mut self) -> Result<GatewayConfig> {
        let config = self.load_config()?;
        self.validate_config(&config)?;
        Ok(config)
    }

    /// Get default config path
    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("modelgate")
            .join("config.toml")
    }
}

impl ConfigManagerTrait for ConfigManager {
    fn load_config(&mut self) -> Result<GatewayConfig> {
        debug!(
            path = %self.config_path.display(),
            prefix = %self.env_prefix,
            "Loading configuration"
        );

        let builder = Config::builder()
            .add_source(
                File::from(self.config_path.clone())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        let gateway_config: GatewayConfig = config.try_deserialize()?;
        Ok(gateway_config)
    }

    fn save_config(&self, config: &GatewayConfig) -> Result<()> {
        let toml = toml::to_string_pretty(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, toml)?;
        Ok(())
    }

    fn validate_config(&self, config: &GatewayConfig) -> Result<()> {
        if config.models.default_model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Default model must not be empty".to_string(),
            ));
        }
        if config.pool.capacity == 0 {
            return Err(ConfigError::Validation(
                "Pool capacity must be greater than 0".to_string(),
            ));
        }
        if config.pool.checkout_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "Checkout timeout must be greater than 0".to_string(),
            ));
        }
        if config.pool.idle_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "Idle timeout must be greater than 0 when set".to_string(),
            ));
        }
        if config.pool.reap_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "Reap interval must be greater than 0".to_string(),
            ));
        }
        match &config.models.download {
            DownloadConfig::Command { program, .. } if program.trim().is_empty() => {
                return Err(ConfigError::Validation(
                    "Download command program must not be empty".to_string(),
                ));
            }
            DownloadConfig::Ollama { base_url } if base_url.trim().is_empty() => {
                return Err(ConfigError::Validation(
                    "Ollama download base URL is required".to_string(),
                ));
            }
            _ => {}
        }
        if let BackendConfig::Ollama { base_url, .. } = &config.backend {
            if base_url.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Ollama backend base URL is required".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
