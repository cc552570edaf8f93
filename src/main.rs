//! Video provider resilience service.
//!
//! # Architecture Overview
//!
//! ```text
//!   Provider webhooks ──▶ http (verify) ──▶ store
//!                                             ▲
//!   Admin API ──▶ admin ──▶ ResilienceContext ─┤
//!                              │               │
//!                              ▼               │
//!                      retry → breaker → timeout ──▶ Video provider
//!                              ▲
//!                   poller sessions (fallback status checks)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use video_resilience::config::loader::{default_config, load_config};
use video_resilience::config::watcher::ConfigWatcher;
use video_resilience::lifecycle::{wait_for_shutdown_signal, Shutdown};
use video_resilience::observability::{logging, metrics};
use video_resilience::store::AssetStore;
use video_resilience::HttpServer;

#[derive(Parser)]
#[command(name = "video-resilience")]
#[command(about = "Resilient gateway to a video-processing provider", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults plus environment when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable hot reload of the configuration file.
    #[arg(long)]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => default_config()?,
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "video-resilience starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        provider = %config.provider.base_url,
        failure_threshold = config.circuit_breaker.failure_threshold,
        max_attempts = config.retries.max_attempts,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = match &config.store.persistence_path {
        Some(path) => AssetStore::load_from_file(path)?,
        None => AssetStore::new(None),
    };

    // Keep the watcher alive for the lifetime of the server.
    let (_watcher, config_updates) = match (&args.config, args.no_watch) {
        (Some(path), false) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.run()?), rx)
        }
        _ => (None, mpsc::unbounded_channel().1),
    };

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, store.clone(), shutdown.token())?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    wait_for_shutdown_signal().await;
    shutdown.trigger();

    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
        Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
    }

    if let Err(e) = store.save_to_file() {
        tracing::error!(error = %e, "Failed to persist asset store");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
