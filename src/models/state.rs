use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::{AppConfig, GalleryMode};
use crate::services::access::AlbumAccessService;
use crate::services::catalog::SqliteCatalog;
use crate::services::naming::{FilenameResolver, NameScope};
use crate::services::storage::StorageAccountant;
use crate::services::upload::UploadTransaction;

/// Application state shared across requests. Needs to be thread-safe.
pub struct AppState {
    /// The SQLite database connection pool.
    pub db_pool: SqlitePool,
    pub config: AppConfig,
    /// Pipeline for every write into the upload directory.
    pub uploads: UploadTransaction,
    /// Issues and checks album access tokens.
    pub access: AlbumAccessService,
}

impl AppState {
    /// Wires the upload pipeline and token service from `config`.
    pub fn new(db_pool: SqlitePool, config: AppConfig) -> Self {
        info!(mode = ?config.mode, upload_dir = %config.upload_dir.display(), "Initializing application state");
        debug!(
            max_total_storage_bytes = config.max_total_storage_bytes,
            max_request_bytes = config.max_request_bytes,
            "Storage limits"
        );

        let catalog = Arc::new(SqliteCatalog::new(db_pool.clone()));
        let accountant =
            StorageAccountant::new(config.upload_dir.clone(), config.max_total_storage_bytes);
        let resolver = FilenameResolver::new(config.upload_dir.clone(), catalog.clone());
        let uploads = UploadTransaction::new(accountant, resolver, catalog);
        let access = AlbumAccessService::new(&config.album_token_secret);

        Self {
            db_pool,
            config,
            uploads,
            access,
        }
    }

    /// Collision domain for photo uploads in the configured layout.
    pub fn photo_scope(&self) -> NameScope<'static> {
        match self.config.mode {
            GalleryMode::Albums => NameScope::PhotosAndCovers,
            GalleryMode::Single => NameScope::Photos,
        }
    }
}
