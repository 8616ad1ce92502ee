use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::{
    chunk_store::StoreLayout,
    shard::{ShardRegistry, ShardSettings},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting chunk-store with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize shard registry ---
    let layout = StoreLayout::new(&cfg.storage_dir, cfg.backend);
    let settings = ShardSettings {
        chunk_size: cfg.chunk_size,
        mailbox_capacity: cfg.mailbox_capacity,
        idle_timeout: Duration::from_secs(cfg.idle_timeout_secs),
    };
    let registry = ShardRegistry::new(layout, settings, cfg.default_location_hint.clone());
    tracing::info!(
        backend = cfg.backend.as_str(),
        chunk_size = cfg.chunk_size,
        "Shard registry ready"
    );

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(registry);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
