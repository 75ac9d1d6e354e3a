use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::{debug, instrument};

/// A stored photo. `album_id` is `None` in the single-gallery layout.
///
/// Every query below scopes by album with `album_id IS ?`, which matches
/// `NULL` for the single gallery and the id otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Photo {
    pub id: i64,
    pub album_id: Option<i64>,
    pub filename: String,
    pub caption: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
}

/// A photo as returned by the API, with the URL it is served from.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoView {
    #[serde(flatten)]
    pub photo: Photo,
    pub url: String,
}

impl From<Photo> for PhotoView {
    fn from(photo: Photo) -> Self {
        let url = photo.url();
        Self { photo, url }
    }
}

impl Photo {
    pub fn url(&self) -> String {
        format!("/uploads/{}", self.filename)
    }

    pub async fn find(db_pool: &SqlitePool, photo_id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Photo>(
            "SELECT id, album_id, filename, caption, uploaded_at FROM photos WHERE id = ?",
        )
        .bind(photo_id)
        .fetch_optional(db_pool)
        .await
    }

    pub async fn name_taken(db_pool: &SqlitePool, filename: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM photos WHERE filename = ?)")
            .bind(filename)
            .fetch_one(db_pool)
            .await
    }

    #[instrument(skip(db_pool, caption))]
    pub async fn insert(
        db_pool: &SqlitePool,
        album_id: Option<i64>,
        filename: &str,
        caption: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let photo = sqlx::query_as::<_, Photo>(
            r#"
            INSERT INTO photos (album_id, filename, caption, uploaded_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, album_id, filename, caption, uploaded_at
            "#,
        )
        .bind(album_id)
        .bind(filename)
        .bind(caption)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(db_pool)
        .await?;

        debug!(photo_id = photo.id, "Photo record inserted");
        Ok(photo)
    }

    pub async fn count_in(db_pool: &SqlitePool, album_id: Option<i64>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(id) FROM photos WHERE album_id IS ?")
            .bind(album_id)
            .fetch_one(db_pool)
            .await
    }

    /// Lists one page of photos, newest first.
    pub async fn page_in(
        db_pool: &SqlitePool,
        album_id: Option<i64>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Photo>(
            r#"
            SELECT id, album_id, filename, caption, uploaded_at
            FROM photos
            WHERE album_id IS ?
            ORDER BY uploaded_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(album_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(db_pool)
        .await
    }

    pub async fn random_in(
        db_pool: &SqlitePool,
        album_id: Option<i64>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Photo>(
            r#"
            SELECT id, album_id, filename, caption, uploaded_at
            FROM photos
            WHERE album_id IS ?
            ORDER BY RANDOM()
            LIMIT 1
            "#,
        )
        .bind(album_id)
        .fetch_optional(db_pool)
        .await
    }

    pub async fn update_caption(
        db_pool: &SqlitePool,
        photo_id: i64,
        caption: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Photo>(
            r#"
            UPDATE photos SET caption = ?
            WHERE id = ?
            RETURNING id, album_id, filename, caption, uploaded_at
            "#,
        )
        .bind(caption)
        .bind(photo_id)
        .fetch_one(db_pool)
        .await
    }

    pub async fn delete(db_pool: &SqlitePool, photo_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM photos WHERE id = ?")
            .bind(photo_id)
            .execute(db_pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every photo record of one album (or of the single gallery).
    ///
    /// Returns the filenames of the deleted records.
    #[instrument(skip(db_pool))]
    pub async fn delete_all_in(
        db_pool: &SqlitePool,
        album_id: Option<i64>,
    ) -> Result<Vec<String>, sqlx::Error> {
        let mut tx = db_pool.begin().await?;

        let filenames =
            sqlx::query_scalar::<_, String>("SELECT filename FROM photos WHERE album_id IS ?")
                .bind(album_id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM photos WHERE album_id IS ?")
            .bind(album_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(deleted = filenames.len(), "Photo records deleted");
        Ok(filenames)
    }
}
