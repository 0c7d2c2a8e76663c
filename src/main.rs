use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    feed_service::FeedService,
    status_cache::{InMemoryStatusCache, StatusCache, SystemClock},
    storage_service::StorageService,
    url_signer::UrlSigner,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting image-feed with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);

    // --- Schema (idempotent, also applied on every start) ---
    db::run_migrations(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize services ---
    let signer = UrlSigner::new(cfg.signing_secret.clone(), cfg.public_url.clone());
    let storage = StorageService::new(db.clone(), cfg.storage_dir.clone(), signer);

    match &cfg.bucket {
        Some(bucket) => {
            storage.ensure_bucket(bucket).await?;
        }
        None => tracing::warn!("No bucket configured; feed requests will fail until one is set"),
    }

    // The status cache lives as long as the process.
    let store = Arc::new(storage.clone());
    let cache = StatusCache::new(
        store.clone(),
        Arc::new(InMemoryStatusCache::new()),
        Arc::new(SystemClock),
    );
    let feed = FeedService::new(store, cache, cfg.bucket.clone());
    let state = AppState { storage, feed };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

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
