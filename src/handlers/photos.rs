//! # Photo Handlers
//!
//! Photo management for one album (`/api/albums/{album_id}/photos...`) or for
//! the single gallery (`/api/photos...`). Both layouts share the same
//! operations; the album handlers receive the [`Album`] loaded by
//! [`crate::middleware::album_access_middleware`], the single gallery passes
//! no album.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Multipart, Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::models::{Album, AppState, PageQuery, Paginated, PaginationInfo, Photo, PhotoView};
use crate::services::upload::{PhotoUpload, UploadReport};
use crate::utils::constant::ITEMS_PER_PAGE;
use crate::utils::file::FileManager;
use crate::utils::multipart::MultipartForm;

/// Request payload for editing a caption
#[derive(Debug, Deserialize)]
pub struct CaptionRequest {
    #[serde(default)]
    pub caption: Option<String>,
}

/// Response of the delete endpoints
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub deleted: usize,
    /// Files whose record is gone but which could not be removed from disk.
    pub warnings: Vec<String>,
}

// ---- albums layout ----

/// GET /api/albums/{album_id}/photos?page=
#[instrument(skip_all, fields(album_id = album.id, request_id = %uuid::Uuid::new_v4()))]
pub async fn list_album_photos(
    State(state): State<Arc<AppState>>,
    Extension(album): Extension<Album>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Paginated<PhotoView>>> {
    list_photos(&state, Some(album.id), &query).await
}

/// POST /api/albums/{album_id}/photos MultipartForm
///
/// Fields: `photos` (repeated files) and `captions` (repeated text, same
/// count as `photos` when present).
///
/// # Returns
///
/// - `200 OK` - Batch processed; per-item outcomes in the [`UploadReport`]
/// - `400 Bad Request` - No photos, or photo and caption counts differ
/// - `413 Payload Too Large` - Request body over the cap
/// - `507 Insufficient Storage` - The batch does not fit in the storage quota
#[instrument(skip_all, fields(album_id = album.id, request_id = %uuid::Uuid::new_v4()))]
pub async fn upload_album_photos(
    State(state): State<Arc<AppState>>,
    Extension(album): Extension<Album>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadReport>> {
    upload_photos(&state, Some(album.id), &mut multipart).await
}

/// DELETE /api/albums/{album_id}/photos
#[instrument(skip_all, fields(album_id = album.id, request_id = %uuid::Uuid::new_v4()))]
pub async fn delete_album_photos(
    State(state): State<Arc<AppState>>,
    Extension(album): Extension<Album>,
) -> AppResult<Json<DeleteResponse>> {
    delete_all_photos(&state, Some(album.id)).await
}

/// GET /api/albums/{album_id}/photos/random
#[instrument(skip_all, fields(album_id = album.id))]
pub async fn random_album_photo(
    State(state): State<Arc<AppState>>,
    Extension(album): Extension<Album>,
) -> AppResult<Json<Option<PhotoView>>> {
    random_photo(&state, Some(album.id)).await
}

/// PATCH /api/albums/{album_id}/photos/{photo_id}
#[instrument(skip_all, fields(album_id = album.id, photo_id = photo_id, request_id = %uuid::Uuid::new_v4()))]
pub async fn update_album_photo(
    State(state): State<Arc<AppState>>,
    Extension(album): Extension<Album>,
    Path((_, photo_id)): Path<(i64, i64)>,
    Json(payload): Json<CaptionRequest>,
) -> AppResult<Json<PhotoView>> {
    update_caption(&state, Some(album.id), photo_id, payload).await
}

/// DELETE /api/albums/{album_id}/photos/{photo_id}
#[instrument(skip_all, fields(album_id = album.id, photo_id = photo_id, request_id = %uuid::Uuid::new_v4()))]
pub async fn delete_album_photo(
    State(state): State<Arc<AppState>>,
    Extension(album): Extension<Album>,
    Path((_, photo_id)): Path<(i64, i64)>,
) -> AppResult<Json<DeleteResponse>> {
    delete_photo(&state, Some(album.id), photo_id).await
}

// ---- single gallery ----

/// GET /api/photos?page=
#[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn list_gallery_photos(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Paginated<PhotoView>>> {
    list_photos(&state, None, &query).await
}

/// POST /api/photos MultipartForm
#[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn upload_gallery_photos(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadReport>> {
    upload_photos(&state, None, &mut multipart).await
}

/// DELETE /api/photos
#[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn delete_gallery_photos(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<DeleteResponse>> {
    delete_all_photos(&state, None).await
}

/// GET /api/photos/random
#[instrument(skip_all)]
pub async fn random_gallery_photo(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Option<PhotoView>>> {
    random_photo(&state, None).await
}

/// PATCH /api/photos/{photo_id}
#[instrument(skip(state, payload), fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn update_gallery_photo(
    State(state): State<Arc<AppState>>,
    Path(photo_id): Path<i64>,
    Json(payload): Json<CaptionRequest>,
) -> AppResult<Json<PhotoView>> {
    update_caption(&state, None, photo_id, payload).await
}

/// DELETE /api/photos/{photo_id}
#[instrument(skip(state), fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn delete_gallery_photo(
    State(state): State<Arc<AppState>>,
    Path(photo_id): Path<i64>,
) -> AppResult<Json<DeleteResponse>> {
    delete_photo(&state, None, photo_id).await
}

// ---- shared operations ----

async fn list_photos(
    state: &AppState,
    album_id: Option<i64>,
    query: &PageQuery,
) -> AppResult<Json<Paginated<PhotoView>>> {
    let total = Photo::count_in(&state.db_pool, album_id).await?;
    let pagination = PaginationInfo::new(query.requested(), ITEMS_PER_PAGE, total);
    let photos = Photo::page_in(
        &state.db_pool,
        album_id,
        pagination.limit,
        pagination.offset(),
    )
    .await?;

    debug!(page = pagination.page, total, "Listed photos");
    Ok(Json(Paginated {
        data: photos.into_iter().map(PhotoView::from).collect(),
        pagination,
    }))
}

async fn upload_photos(
    state: &AppState,
    album_id: Option<i64>,
    multipart: &mut Multipart,
) -> AppResult<Json<UploadReport>> {
    let mut form = MultipartForm::read(multipart, state.config.max_request_bytes).await?;
    let files = form.take_files("photos");
    if files.is_empty() {
        warn!("No photos in upload request");
        return Err(AppError::BadRequest("No photos selected!"));
    }

    let captions = form.texts("captions");
    if form.has_field("captions") && captions.len() != files.len() {
        warn!(
            photos = files.len(),
            captions = captions.len(),
            "Photo and caption counts differ"
        );
        return Err(AppError::BadRequest(
            "Mismatch between number of photos and captions.",
        ));
    }

    let items = files
        .into_iter()
        .enumerate()
        .map(|(i, file)| PhotoUpload {
            file,
            caption: captions
                .get(i)
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        })
        .collect();

    let report = state
        .uploads
        .upload_photos(album_id, state.photo_scope(), items)
        .await?;
    Ok(Json(report))
}

async fn random_photo(
    state: &AppState,
    album_id: Option<i64>,
) -> AppResult<Json<Option<PhotoView>>> {
    let photo = Photo::random_in(&state.db_pool, album_id).await?;
    Ok(Json(photo.map(PhotoView::from)))
}

/// Loads a photo and checks that it belongs to `album_id`.
async fn find_owned_photo(
    state: &AppState,
    album_id: Option<i64>,
    photo_id: i64,
) -> AppResult<Photo> {
    let Some(photo) = Photo::find(&state.db_pool, photo_id).await? else {
        debug!(photo_id, "Photo not found");
        return Err(AppError::NotFound("Photo not found"));
    };

    if photo.album_id != album_id {
        warn!(photo_id, owner = ?photo.album_id, "Photo belongs to another album");
        return Err(AppError::Forbidden("Photo does not belong to this album"));
    }
    Ok(photo)
}

async fn update_caption(
    state: &AppState,
    album_id: Option<i64>,
    photo_id: i64,
    payload: CaptionRequest,
) -> AppResult<Json<PhotoView>> {
    find_owned_photo(state, album_id, photo_id).await?;

    let caption = payload
        .caption
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let photo = Photo::update_caption(&state.db_pool, photo_id, caption).await?;

    info!(photo_id, "Caption updated");
    Ok(Json(photo.into()))
}

async fn delete_photo(
    state: &AppState,
    album_id: Option<i64>,
    photo_id: i64,
) -> AppResult<Json<DeleteResponse>> {
    let photo = find_owned_photo(state, album_id, photo_id).await?;

    if !Photo::delete(&state.db_pool, photo_id).await? {
        return Err(AppError::NotFound("Photo not found"));
    }
    let warnings =
        remove_stored_files(state.uploads.upload_dir(), std::slice::from_ref(&photo.filename))
            .await;

    info!(photo_id, filename = %photo.filename, "Photo deleted");
    Ok(Json(DeleteResponse {
        message: "Photo deleted.".to_string(),
        deleted: 1,
        warnings,
    }))
}

async fn delete_all_photos(
    state: &AppState,
    album_id: Option<i64>,
) -> AppResult<Json<DeleteResponse>> {
    let filenames = Photo::delete_all_in(&state.db_pool, album_id).await?;
    let warnings = remove_stored_files(state.uploads.upload_dir(), &filenames).await;

    info!(deleted = filenames.len(), failed_files = warnings.len(), "Photos deleted");
    Ok(Json(DeleteResponse {
        message: format!("Deleted {} photos.", filenames.len()),
        deleted: filenames.len(),
        warnings,
    }))
}

/// Removes files whose records are already gone.
///
/// Missing files are fine; any other failure is logged and returned as a warning.
pub(crate) async fn remove_stored_files(upload_dir: &FsPath, filenames: &[String]) -> Vec<String> {
    let mut warnings = Vec::new();
    for filename in filenames {
        if let Err(e) = FileManager::remove_file(&upload_dir.join(filename)).await {
            warn!(%filename, error = %e, "Failed to delete file");
            warnings.push(format!("Failed to delete file '{filename}'."));
        }
    }
    warnings
}
