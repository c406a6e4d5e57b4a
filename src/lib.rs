//! Photo gallery service: a revalidating image index built from a blob
//! store listing, a streaming upload endpoint, and the client-side upload
//! queue that feeds it.

pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use anyhow::{Context, Result};
use axum::Router;
use config::AppConfig;
use services::{
    gallery_cache::GalleryCache,
    gallery_index::IndexSettings,
    storage_service::{BlobStore, SqliteBlobStore},
    upload_service::UploadSettings,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use state::AppState;
use std::{path::Path, str::FromStr, sync::Arc};
use tokio::fs;
use tower_http::trace::TraceLayer;

/// Open the SQLite-backed store named by `cfg`, creating directories and
/// schema as needed.
pub async fn open_store(cfg: &AppConfig) -> Result<Arc<SqliteBlobStore>> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir).await?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let db_url = &cfg.database_url;
    let in_memory = db_url.contains(":memory:");
    if !in_memory {
        let db_path = db_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        tracing::debug!("Interpreted SQLite path => {}", db_path);
        if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("parsing database url `{}`", db_url))?
        .create_if_missing(true);
    // Every connection to an in-memory database sees its own empty database.
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 5 })
        .connect_with(options)
        .await
        .context("connecting to SQLite")?;

    let store = SqliteBlobStore::new(Arc::new(pool), cfg.storage_dir.clone());
    store.migrate().await.context("applying schema")?;
    Ok(Arc::new(store))
}

pub fn build_state(cfg: &AppConfig, store: Arc<dyn BlobStore>) -> AppState {
    let gallery = GalleryCache::new(
        store.clone(),
        IndexSettings {
            bucket: cfg.bucket.clone(),
            prefix: cfg.gallery_prefix.clone(),
            metadata_concurrency: cfg.metadata_concurrency,
        },
        cfg.revalidate,
    );

    AppState {
        store,
        gallery,
        uploads: UploadSettings {
            bucket: cfg.bucket.clone(),
            prefix: cfg.upload_prefix.clone(),
            max_bytes: cfg.max_upload_bytes,
        },
        distribution_domain: cfg.distribution_domain.clone(),
    }
}

pub fn build_app(cfg: &AppConfig, state: AppState) -> Router {
    routes::routes::routes(cfg.max_upload_bytes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
