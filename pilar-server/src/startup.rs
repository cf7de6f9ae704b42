// Wiring from configuration to a ready-to-serve API state

use crate::http::ApiState;
use crate::service::PredictionService;
use anyhow::Context;
use pilar_core::{CategoryTable, PilarConfig};
use pilar_vision::ModelRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Category table from `catalog.path`, or the built-in one
pub fn load_catalog(config: &PilarConfig) -> anyhow::Result<CategoryTable> {
    match &config.catalog.path {
        Some(path) => CategoryTable::from_file(path)
            .with_context(|| format!("loading category table from {}", path.display())),
        None => Ok(CategoryTable::builtin()),
    }
}

/// Build the shared state, attempting the one model load.
///
/// A missing or invalid artifact is not fatal: the server still starts,
/// `/health` reports the model as not loaded and predictions answer 503.
pub async fn build_state(config: &PilarConfig) -> anyhow::Result<ApiState> {
    let catalog = Arc::new(load_catalog(config)?);
    let registry = Arc::new(ModelRegistry::new(&config.model.artifact_path));

    let loader = Arc::clone(&registry);
    let loaded = tokio::task::spawn_blocking(move || loader.load().map(|_| ()))
        .await
        .context("model loading task failed")?;
    match loaded {
        Ok(()) => info!("Model ready, serving predictions"),
        Err(e) => error!("Serving without a model: {}", e),
    }

    let service = PredictionService::new(registry, catalog, config);
    Ok(ApiState::new(service, config))
}

/// Bind the HTTP listener. The host may be a name, an IPv4 address or a bare
/// IPv6 address such as `::`.
pub async fn bind_listener(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("failed to bind {} port {}", host, port))
}
