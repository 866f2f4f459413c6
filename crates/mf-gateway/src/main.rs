//! mf-gateway - monitoring metrics ingestion gateway.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mf_gateway::{BackendConfig, GatewayConfig, GatewayServer};
use mf_ingest::{ElasticBackend, MemoryBackend, ProvisionMode, SearchBackend};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mf-gateway")]
#[command(about = "Accepts monitoring metrics and stores them in a search backend")]
#[command(version)]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, env = "MF_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "MF_BIND")]
    bind: Option<SocketAddr>,

    /// Base URL used in returned links, e.g. http://mf.example.org:3040/v1
    #[arg(long, env = "MF_PUBLIC_URL")]
    public_url: Option<String>,

    /// Storage backend
    #[arg(long, env = "MF_BACKEND", value_parser = ["memory", "elasticsearch"])]
    backend: Option<String>,

    /// Elasticsearch URL (implies the elasticsearch backend)
    #[arg(long, env = "MF_ELASTIC_URL")]
    elastic_url: Option<String>,

    /// Partition provisioning mode: optimistic or single-flight
    #[arg(long, env = "MF_PROVISIONING")]
    provisioning: Option<ProvisionMode>,

    /// Ensure partitions exist before bulk writes
    #[arg(long, env = "MF_PROVISION_ON_BULK")]
    provision_on_bulk: bool,

    /// Maximum request body size in bytes
    #[arg(long, env = "MF_MAX_BODY_BYTES")]
    max_body_bytes: Option<usize>,

    /// Emit logs as JSON
    #[arg(long, env = "MF_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::from_file(path)?,
            None => GatewayConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(url) = self.public_url {
            config = config.with_public_base_url(url);
        }
        match (self.backend.as_deref(), self.elastic_url) {
            (Some("memory"), _) => config.backend = BackendConfig::Memory,
            (_, Some(url)) => config.backend = BackendConfig::elasticsearch(url),
            (Some("elasticsearch"), None) if config.backend == BackendConfig::Memory => {
                config.backend = BackendConfig::default();
            }
            _ => {}
        }
        if let Some(mode) = self.provisioning {
            config.provisioning = mode;
        }
        if self.provision_on_bulk {
            config.provision_on_bulk = true;
        }
        if let Some(max) = self.max_body_bytes {
            config.max_body_bytes = max;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = cli.into_config()?;
    info!(
        bind = %config.bind_addr,
        provisioning = ?config.provisioning,
        provision_on_bulk = config.provision_on_bulk,
        "Starting mf-gateway"
    );

    match config.elastic_config() {
        Some(elastic) => {
            info!(url = %elastic.url, "Using Elasticsearch backend");
            let backend = ElasticBackend::new(&elastic)?;
            run(config, backend).await
        }
        None => {
            info!("Using in-memory backend");
            run(config, MemoryBackend::new()).await
        }
    }
}

async fn run<B: SearchBackend>(config: GatewayConfig, backend: B) -> anyhow::Result<()> {
    let server = GatewayServer::new(config, Arc::new(backend));
    server.serve_with_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
