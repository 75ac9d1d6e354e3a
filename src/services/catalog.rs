//! # Catalog
//!
//! The record side of an upload: name lookups for the resolver and the
//! inserts/updates the upload pipeline commits after a file is written.
//! [`SqliteCatalog`] is the production implementation; the pipeline only
//! sees the [`Catalog`] and [`NameRegistry`] traits so that tests can inject
//! faults.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::models::{Album, AlbumChanges, NewAlbum, Photo};
use crate::services::naming::NameRegistry;

/// Record writes performed by the upload pipeline.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns true if an album other than `except_album` is titled `title`.
    async fn album_title_taken(
        &self,
        title: &str,
        except_album: Option<i64>,
    ) -> Result<bool, sqlx::Error>;

    async fn insert_photo(
        &self,
        album_id: Option<i64>,
        filename: &str,
        caption: Option<&str>,
    ) -> Result<Photo, sqlx::Error>;

    async fn insert_album(
        &self,
        new_album: &NewAlbum,
        cover_filename: &str,
    ) -> Result<Album, sqlx::Error>;

    async fn update_album(
        &self,
        album_id: i64,
        changes: &AlbumChanges,
    ) -> Result<Album, sqlx::Error>;
}

/// Catalog backed by the application's SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    db_pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl NameRegistry for SqliteCatalog {
    async fn photo_name_taken(&self, filename: &str) -> Result<bool, sqlx::Error> {
        Photo::name_taken(&self.db_pool, filename).await
    }

    async fn cover_name_taken(
        &self,
        filename: &str,
        except_album: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        Album::cover_taken(&self.db_pool, filename, except_album).await
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn album_title_taken(
        &self,
        title: &str,
        except_album: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        Album::title_taken(&self.db_pool, title, except_album).await
    }

    async fn insert_photo(
        &self,
        album_id: Option<i64>,
        filename: &str,
        caption: Option<&str>,
    ) -> Result<Photo, sqlx::Error> {
        Photo::insert(&self.db_pool, album_id, filename, caption).await
    }

    async fn insert_album(
        &self,
        new_album: &NewAlbum,
        cover_filename: &str,
    ) -> Result<Album, sqlx::Error> {
        Album::insert(&self.db_pool, new_album, cover_filename).await
    }

    async fn update_album(
        &self,
        album_id: i64,
        changes: &AlbumChanges,
    ) -> Result<Album, sqlx::Error> {
        Album::update(&self.db_pool, album_id, changes).await
    }
}
