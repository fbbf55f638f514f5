mod config;
mod problem;
mod routes;

use anyhow::Context;
use clap::Parser;
use config::{ServerConfig, default_config_path};
use routes::{AppState, HttpImportService, router};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Imports GitLab projects and branches into wharf")]
struct Cli {
    #[arg(long, help = "Path to the JSON config file")]
    config: Option<PathBuf>,
    #[arg(long, help = "Address to listen on, e.g. 0.0.0.0:8080")]
    bind: Option<String>,
    #[arg(long, help = "Base URL of the wharf API")]
    api_url: Option<String>,
    #[arg(long, help = "Answer CORS requests from any origin")]
    allow_all_origins: bool,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<ServerConfig> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => default_config_path()?,
        };
        let mut config = ServerConfig::load(&path)
            .with_context(|| format!("load config from {}", path.display()))?;
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if let Some(api_url) = &self.api_url {
            config.api_url = api_url.clone();
        }
        if self.allow_all_origins {
            config.cors.allow_all_origins = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let addr = config.bind_addr()?;
    if config.cors.allow_all_origins {
        warn!("allowing all origins in CORS");
    }

    let state = AppState::new(Arc::new(HttpImportService::new(&config)));
    let app = router(state, config.cors.allow_all_origins);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, api_url = %config.api_url, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
