//! streamtree server binary
//!
//! Starts the HTTP API over an in-memory store.
//!
//! Usage:
//!   cargo run -- --host 0.0.0.0 --port 3000 --base-url https://streams.example.org

use std::sync::Arc;

use clap::Parser;
use streamtree::{
    config::ServerConfig,
    http::start_server,
    registry::BuildRegistry,
    storage::{MemoryStorage, Storage},
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "streamtree")]
#[command(about = "Serves RDF event streams as fragmented TREE collections", long_about = None)]
struct Args {
    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<String>,

    #[arg(short = 'H', long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Public origin used in hypermedia links
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long)]
    page_size: Option<usize>,

    #[arg(long)]
    bucket_page_size: Option<usize>,

    #[arg(long)]
    progress_interval: Option<u64>,

    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn into_config(self) -> streamtree::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(base_url) = self.base_url {
            config.base_url = Some(base_url);
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        if let Some(bucket_page_size) = self.bucket_page_size {
            config.bucket_page_size = bucket_page_size;
        }
        if let Some(progress_interval) = self.progress_interval {
            config.progress_interval = progress_interval;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Args::parse().into_config()?;

    // Setup logging
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let builds = BuildRegistry::new();

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;

    let running_builds = builds.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received, aborting running builds");
        running_builds.stop_all();
    };

    start_server(listener, storage, builds, &config, shutdown).await?;
    info!("server shut down gracefully");

    Ok(())
}
