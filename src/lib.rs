//! # Shoebox - Self-Hosted Photo Albums
//!
//! ## Modules
//!
//! - [`handlers`] - HTTP request handlers for albums, photos and stored files
//! - [`middleware`] - Album access control
//! - [`services`] - Storage quota, filename resolution and the upload pipeline
//! - [`models`] - Records, pagination and shared state
//! - [`utils`] - Constants, file helpers and multipart parsing

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::{AppConfig, GalleryMode};
use crate::handlers::*;
use crate::middleware::album_access_middleware;
use crate::models::{Album, AppState};
use crate::utils::constant::DEFAULT_COVER_FILENAME;
use crate::utils::file::FileManager;

/// Creates an Axum router with application routes and state.
///
/// The photo routes depend on `config.mode`: `/api/albums/...` for the
/// albums layout, `/api/photos/...` for the single gallery. Request bodies
/// are capped at `config.max_request_bytes`.
///
/// The upload directory is expected to exist; see [`prepare_storage`].
pub fn app(db_pool: SqlitePool, config: AppConfig) -> Router {
    let max_request_bytes = config.max_request_bytes;
    let mode = config.mode;
    let state = Arc::new(AppState::new(db_pool, config));

    let api_routes = match mode {
        GalleryMode::Albums => album_routes(Arc::clone(&state)),
        GalleryMode::Single => gallery_routes(),
    };

    Router::new()
        .route("/health-check", get(health_check))
        .route("/uploads/{filename}", get(serve_upload))
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn album_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected_routes = Router::new()
        .route(
            "/api/albums/{album_id}",
            get(get_album).put(update_album).delete(delete_album),
        )
        .route(
            "/api/albums/{album_id}/photos",
            get(list_album_photos)
                .post(upload_album_photos)
                .delete(delete_album_photos),
        )
        .route("/api/albums/{album_id}/photos/random", get(random_album_photo))
        .route(
            "/api/albums/{album_id}/photos/{photo_id}",
            patch(update_album_photo).delete(delete_album_photo),
        )
        .route_layer(from_fn_with_state(state, album_access_middleware));

    let public_routes = Router::new()
        .route("/api/albums", get(list_albums).post(create_album))
        .route("/api/albums/{album_id}/authorize", post(authorize_album));

    Router::new().merge(public_routes).merge(protected_routes)
}

fn gallery_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/photos",
            get(list_gallery_photos)
                .post(upload_gallery_photos)
                .delete(delete_gallery_photos),
        )
        .route("/api/photos/random", get(random_gallery_photo))
        .route(
            "/api/photos/{photo_id}",
            patch(update_gallery_photo).delete(delete_gallery_photo),
        )
}

/// Creates the upload directory and, in the albums layout, the placeholder cover.
#[instrument(skip_all, fields(upload_dir = %config.upload_dir.display()))]
pub async fn prepare_storage(config: &AppConfig) -> Result<(), std::io::Error> {
    FileManager::ensure_directory_exists(&config.upload_dir).await?;
    if config.mode == GalleryMode::Albums {
        FileManager::ensure_placeholder_cover(&config.placeholder_cover_path()).await?;
    }
    Ok(())
}

/// Wipes all content: every stored file but the placeholder cover, every
/// record, then recreates the default album.
#[instrument(skip_all, fields(upload_dir = %config.upload_dir.display()))]
pub async fn reset_content(
    db_pool: &SqlitePool,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    FileManager::ensure_directory_exists(&config.upload_dir).await?;
    let removed =
        FileManager::clear_directory_except(&config.upload_dir, DEFAULT_COVER_FILENAME).await?;
    Album::reset_all(db_pool).await?;
    FileManager::ensure_placeholder_cover(&config.placeholder_cover_path()).await?;

    info!(removed_files = removed, "Content reset");
    Ok(())
}
