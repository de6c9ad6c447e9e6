//! ModelGate binary
//!
//! `modelgate serve` runs the HTTP gateway; `modelgate download-model`
//! materializes a model through the same store the server uses.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use modelgate::server::{build_store, ApiServer};
use modelgate_common::ModelId;
use modelgate_config::{ConfigManager, ConfigManagerTrait, GatewayConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modelgate")]
#[command(version, about = "Chat-completions gateway for locally materialized models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,

        /// Device the backend runs on
        #[arg(long)]
        device: Option<String>,

        /// Model used when a request omits one
        #[arg(long)]
        default_model: Option<String>,
    },
    /// Download a model into the models directory
    DownloadModel {
        /// Model identifier
        #[arg(long)]
        model_name: String,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<(ConfigManager, GatewayConfig)> {
    let mut manager = match path {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new(),
    };
    let config = manager
        .load()
        .with_context(|| format!("loading {}", manager.config_path().display()))?;
    Ok((manager, config))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            device,
            default_model,
        } => {
            let (manager, mut config) = load_config(config)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(device) = device {
                config.models.device = device;
            }
            if let Some(model) = default_model {
                config.models.default_model = model;
            }
            manager.validate_config(&config)?;

            init_tracing(&config.logging.level);
            let server = ApiServer::new(config).context("building server")?;
            server.serve().await?;
        }
        Commands::DownloadModel { model_name, config } => {
            let (_, config) = load_config(config)?;
            init_tracing(&config.logging.level);

            let model = ModelId::parse(&model_name)?;
            let store = build_store(&config)?;
            tracing::info!(
                model = %model,
                downloader = store.downloader_name(),
                "Downloading model"
            );
            let artifact = store.ensure(&model).await?;
            println!("{}", artifact.path.display());
        }
    }

    Ok(())
}
