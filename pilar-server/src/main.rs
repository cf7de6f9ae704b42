// Pilar classification server

use anyhow::Context;
use clap::Parser;
use pilar_core::PilarConfig;
use pilar_server::{bind_listener, build_state, create_router};
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pilar-server")]
#[command(about = "Waste photo classification API", version)]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides server.bind_address
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides server.port
    #[arg(short, long)]
    port: Option<u16>,

    /// Model artifact, overrides model.artifact_path
    #[arg(short, long)]
    model: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PilarConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => PilarConfig::default(),
    };
    config.apply_env();
    if let Some(host) = args.host {
        config.server.bind_address = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(model) = args.model {
        config.model.artifact_path = model;
    }
    config.validate().context("invalid configuration")?;

    init_logging(&config);

    info!("Starting Pilar classification server v{}", env!("CARGO_PKG_VERSION"));
    info!("App mode: {:?}", config.server.app_mode);
    info!("Model artifact: {}", config.model.artifact_path.display());

    let state = build_state(&config).await?;
    let app = create_router(state);

    let listener = bind_listener(&config.server.bind_address, config.server.port).await?;
    let addr = listener.local_addr().context("listener has no local address")?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

fn init_logging(config: &PilarConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .init();
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
