//! # Album Records
//!
//! Albums group photos behind a cover image and an optional password. The
//! album titled [`DEFAULT_ALBUM_TITLE`] is created by the first migration,
//! always sorts first and can be neither deleted nor renamed.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use crate::utils::constant::{DEFAULT_ALBUM_TITLE, DEFAULT_COVER_FILENAME};

/// An album row, password hash included. Never serialized directly; see [`AlbumView`].
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Album {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub cover_filename: String,
    pub password_hash: Option<String>,
}

/// Public representation of an album.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumView {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub cover_filename: String,
    pub cover_url: String,
    pub has_password: bool,
    pub is_default: bool,
}

/// Fields of an album about to be created.
#[derive(Debug, Clone)]
pub struct NewAlbum {
    pub title: String,
    pub description: Option<String>,
    pub password_hash: Option<String>,
}

/// Column updates for an existing album. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct AlbumChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub password_hash: Option<Option<String>>,
    pub cover_filename: Option<String>,
}

impl AlbumChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.password_hash.is_none()
            && self.cover_filename.is_none()
    }
}

impl Album {
    #[inline]
    pub fn is_default(&self) -> bool {
        self.title == DEFAULT_ALBUM_TITLE
    }

    #[inline]
    pub fn is_protected(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Returns true if the cover is the shared placeholder rather than a file of its own.
    #[inline]
    pub fn has_placeholder_cover(&self) -> bool {
        self.cover_filename == DEFAULT_COVER_FILENAME
    }

    pub fn view(&self) -> AlbumView {
        AlbumView {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            cover_filename: self.cover_filename.clone(),
            cover_url: format!("/uploads/{}", self.cover_filename),
            has_password: self.is_protected(),
            is_default: self.is_default(),
        }
    }

    pub async fn find(db_pool: &SqlitePool, album_id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Album>(
            "SELECT id, title, description, cover_filename, password_hash FROM albums WHERE id = ?",
        )
        .bind(album_id)
        .fetch_optional(db_pool)
        .await
    }

    /// Checks whether another album already uses `title`.
    pub async fn title_taken(
        db_pool: &SqlitePool,
        title: &str,
        except_album: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM albums WHERE title = ? AND id IS NOT ?)",
        )
        .bind(title)
        .bind(except_album)
        .fetch_one(db_pool)
        .await
    }

    /// Checks whether an album cover holds `filename`, optionally ignoring one album.
    pub async fn cover_taken(
        db_pool: &SqlitePool,
        filename: &str,
        except_album: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM albums WHERE cover_filename = ? AND id IS NOT ?)",
        )
        .bind(filename)
        .bind(except_album)
        .fetch_one(db_pool)
        .await
    }

    pub async fn count(db_pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(id) FROM albums")
            .fetch_one(db_pool)
            .await
    }

    /// Lists one page of albums, default album first, then by title.
    pub async fn list_page(
        db_pool: &SqlitePool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Album>(
            r#"
            SELECT id, title, description, cover_filename, password_hash
            FROM albums
            ORDER BY
                CASE WHEN title = ? THEN 0 ELSE 1 END,
                title ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(DEFAULT_ALBUM_TITLE)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(db_pool)
        .await
    }

    #[instrument(skip_all, fields(title = %new_album.title, cover = %cover_filename))]
    pub async fn insert(
        db_pool: &SqlitePool,
        new_album: &NewAlbum,
        cover_filename: &str,
    ) -> Result<Self, sqlx::Error> {
        let album = sqlx::query_as::<_, Album>(
            r#"
            INSERT INTO albums (title, description, cover_filename, password_hash)
            VALUES (?, ?, ?, ?)
            RETURNING id, title, description, cover_filename, password_hash
            "#,
        )
        .bind(&new_album.title)
        .bind(&new_album.description)
        .bind(cover_filename)
        .bind(&new_album.password_hash)
        .fetch_one(db_pool)
        .await?;

        debug!(album_id = album.id, "Album record inserted");
        Ok(album)
    }

    /// Applies `changes` and returns the updated row. Empty changes just reload the row.
    #[instrument(skip(db_pool, changes))]
    pub async fn update(
        db_pool: &SqlitePool,
        album_id: i64,
        changes: &AlbumChanges,
    ) -> Result<Self, sqlx::Error> {
        if !changes.is_empty() {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE albums SET ");
            let mut set = builder.separated(", ");

            if let Some(title) = &changes.title {
                set.push("title = ").push_bind_unseparated(title.clone());
            }
            if let Some(description) = &changes.description {
                set.push("description = ")
                    .push_bind_unseparated(description.clone());
            }
            if let Some(password_hash) = &changes.password_hash {
                set.push("password_hash = ")
                    .push_bind_unseparated(password_hash.clone());
            }
            if let Some(cover) = &changes.cover_filename {
                set.push("cover_filename = ")
                    .push_bind_unseparated(cover.clone());
            }

            builder.push(" WHERE id = ").push_bind(album_id);
            let result = builder.build().execute(db_pool).await?;
            if result.rows_affected() == 0 {
                return Err(sqlx::Error::RowNotFound);
            }
            debug!("Album record updated");
        }

        Self::find(db_pool, album_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Deletes the album and all of its photo records in one transaction.
    ///
    /// Returns the filenames of the deleted photos so the caller can remove the files.
    #[instrument(skip(db_pool))]
    pub async fn delete_with_photos(
        db_pool: &SqlitePool,
        album_id: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        let mut tx = db_pool.begin().await?;

        let filenames =
            sqlx::query_scalar::<_, String>("SELECT filename FROM photos WHERE album_id = ?")
                .bind(album_id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM photos WHERE album_id = ?")
            .bind(album_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM albums WHERE id = ?")
            .bind(album_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        tx.commit().await?;
        debug!(photo_records = filenames.len(), "Album and photo records deleted");
        Ok(filenames)
    }

    /// Removes every album and photo record and recreates the default album.
    pub async fn reset_all(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
        let mut tx = db_pool.begin().await?;
        sqlx::query("DELETE FROM photos").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM albums").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM sqlite_sequence WHERE name IN ('albums', 'photos')")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO albums (title, description, cover_filename) VALUES (?, ?, ?)",
        )
        .bind(DEFAULT_ALBUM_TITLE)
        .bind("Photos that do not belong to any other album.")
        .bind(DEFAULT_COVER_FILENAME)
        .execute(&mut *tx)
        .await?;
        tx.commit().await
    }
}
