//! # Album Handlers
//!
//! Album listing, creation, editing, deletion and password authorization.
//! Covers are written through the upload pipeline, so they share the quota
//! and the filename namespace with photos.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::handlers::photos::{DeleteResponse, remove_stored_files};
use crate::models::{
    Album, AlbumChanges, AlbumView, AppState, NewAlbum, PageQuery, Paginated, PaginationInfo,
};
use crate::services::access::AccessGrant;
use crate::services::naming::RenamedFile;
use crate::services::password::{hash_password, verify_password};
use crate::services::upload::AlbumOutcome;
use crate::utils::constant::{ALBUMS_PER_PAGE, MAX_TITLE_LENGTH};
use crate::utils::multipart::MultipartForm;

/// Album title as submitted in a create or edit form
#[derive(Debug, Validate)]
struct TitleInput {
    #[validate(length(min = 1, max = MAX_TITLE_LENGTH))]
    title: String,
}

/// Request payload for unlocking a protected album
#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    pub password: String,
}

/// Response of album create and edit
#[derive(Debug, Serialize)]
pub struct AlbumResponse {
    pub album: AlbumView,
    /// Set when the cover had to be stored under another name.
    pub cover_renamed: Option<RenamedFile>,
    pub warnings: Vec<String>,
}

impl From<AlbumOutcome> for AlbumResponse {
    fn from(outcome: AlbumOutcome) -> Self {
        Self {
            album: outcome.album.view(),
            cover_renamed: outcome.cover_renamed,
            warnings: outcome.warnings,
        }
    }
}

/// Checks a submitted title and returns it trimmed.
fn validated_title(raw: Option<&str>) -> AppResult<String> {
    let title = raw.map(str::trim).unwrap_or_default();
    if title.is_empty() {
        warn!("Album title missing");
        return Err(AppError::BadRequest("Album title is required."));
    }
    let input = TitleInput {
        title: title.to_string(),
    };
    if let Err(e) = input.validate() {
        warn!(error = %e, "Invalid album title");
        return Err(AppError::Validation(format!(
            "Album title must be at most {MAX_TITLE_LENGTH} characters."
        )));
    }
    Ok(input.title)
}

/// The `password` field as typed. Blank means no password.
fn submitted_password(form: &MultipartForm) -> Option<&str> {
    form.text("password").filter(|p| !p.trim().is_empty())
}

/// Lists albums.
///
/// GET /api/albums?page=
///
/// The default album always comes first, the rest by title.
#[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn list_albums(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Paginated<AlbumView>>> {
    let total = Album::count(&state.db_pool).await?;
    let pagination = PaginationInfo::new(query.requested(), ALBUMS_PER_PAGE, total);
    let albums = Album::list_page(&state.db_pool, pagination.limit, pagination.offset()).await?;

    debug!(page = pagination.page, total, "Listed albums");
    Ok(Json(Paginated {
        data: albums.iter().map(Album::view).collect(),
        pagination,
    }))
}

/// Creates an album.
///
/// POST /api/albums MultipartForm
///
/// Fields: `title` (required), `description`, `password` (empty means none)
/// and `cover` (required image).
///
/// # Returns
///
/// - `201 Created` - Album created
/// - `400 Bad Request` - Missing title or cover, invalid cover
/// - `409 Conflict` - Title taken, or no free name for the cover
/// - `507 Insufficient Storage` - Cover does not fit in the storage quota
#[instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn create_album(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<AlbumResponse>)> {
    let mut form = MultipartForm::read(&mut multipart, state.config.max_request_bytes).await?;

    let title = validated_title(form.text("title"))?;
    let Some(cover) = form.take_file("cover") else {
        warn!("Album cover missing");
        return Err(AppError::BadRequest("Album cover image is required."));
    };

    let new_album = NewAlbum {
        title,
        description: form.trimmed("description").map(str::to_string),
        password_hash: submitted_password(&form)
            .map(hash_password)
            .transpose()
            .map_err(|_| AppError::Internal)?,
    };
    let outcome = state.uploads.create_album(new_album, cover).await?;

    info!(album_id = outcome.album.id, "Album created");
    Ok((StatusCode::CREATED, Json(outcome.into())))
}

/// Unlocks a protected album.
///
/// POST /api/albums/{album_id}/authorize JSON `{ "password": ... }`
///
/// A valid token in the `Authorization` header is extended with this album,
/// so one token can hold every album the client has unlocked.
///
/// # Returns
///
/// - `200 OK` - [`AccessGrant`] with the new token
/// - `401 Unauthorized` - Wrong password
/// - `404 Not Found` - Unknown album
#[instrument(skip(state, headers, payload), fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn authorize_album(
    State(state): State<Arc<AppState>>,
    Path(album_id): Path<i64>,
    headers: HeaderMap,
    Json(payload): Json<AuthorizeRequest>,
) -> AppResult<Json<AccessGrant>> {
    let Some(album) = Album::find(&state.db_pool, album_id).await? else {
        return Err(AppError::NotFound("Album not found"));
    };

    if let Some(hash) = &album.password_hash
        && !verify_password(&payload.password, hash)
    {
        warn!("Incorrect album password");
        return Err(AppError::Unauthorized("Incorrect password"));
    }

    let previous = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let grant = state.access.grant(album_id, previous).map_err(|e| {
        warn!(error = %e, "Failed to issue access token");
        AppError::Internal
    })?;

    info!("Album unlocked");
    Ok(Json(grant))
}

/// GET /api/albums/{album_id}
#[instrument(skip_all, fields(album_id = album.id))]
pub async fn get_album(Extension(album): Extension<Album>) -> Json<AlbumView> {
    Json(album.view())
}

/// Edits an album.
///
/// PUT /api/albums/{album_id} MultipartForm
///
/// Fields, all optional: `title`, `description` (empty clears it), `password`
/// (non-empty sets a new one), `clear_password` (`true`/`on`/`1` removes
/// protection) and `cover` (replacement image).
///
/// # Returns
///
/// - `200 OK` - Album after the edit; old-cover removal problems in `warnings`
/// - `400 Bad Request` - Empty or overlong title, invalid cover
/// - `403 Forbidden` - Renaming the default album
/// - `409 Conflict` - Title taken, or no free name for the cover
/// - `507 Insufficient Storage` - New cover does not fit in the storage quota
#[instrument(skip_all, fields(album_id = album.id, request_id = %uuid::Uuid::new_v4()))]
pub async fn update_album(
    State(state): State<Arc<AppState>>,
    Extension(album): Extension<Album>,
    mut multipart: Multipart,
) -> AppResult<Json<AlbumResponse>> {
    let mut form = MultipartForm::read(&mut multipart, state.config.max_request_bytes).await?;
    let mut changes = AlbumChanges::default();

    if form.has_field("title") {
        let title = validated_title(form.text("title"))?;
        if album.is_default() && title != album.title {
            warn!("Attempt to rename the default album");
            return Err(AppError::Forbidden("The default album cannot be renamed"));
        }
        changes.title = Some(title);
    }

    if form.has_field("description") {
        changes.description = Some(form.trimmed("description").map(str::to_string));
    }

    let clear_password = form
        .text("clear_password")
        .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "on" | "1"));
    if clear_password {
        changes.password_hash = Some(None);
    } else if let Some(password) = submitted_password(&form) {
        let hash = hash_password(password).map_err(|_| AppError::Internal)?;
        changes.password_hash = Some(Some(hash));
    }

    let cover = form.take_file("cover");
    let outcome = state.uploads.update_album(&album, changes, cover).await?;

    if outcome.changed {
        info!("Album edited");
    } else {
        debug!("Album edit without changes");
    }
    Ok(Json(outcome.into()))
}

/// Deletes an album, its photos and their files.
///
/// DELETE /api/albums/{album_id}
///
/// Records go first, in one transaction; then the files. A file that cannot
/// be removed is reported in `warnings`.
///
/// # Returns
///
/// - `200 OK` - Album deleted
/// - `403 Forbidden` - The default album
#[instrument(skip_all, fields(album_id = album.id, request_id = %uuid::Uuid::new_v4()))]
pub async fn delete_album(
    State(state): State<Arc<AppState>>,
    Extension(album): Extension<Album>,
) -> AppResult<Json<DeleteResponse>> {
    if album.is_default() {
        warn!("Attempt to delete the default album");
        return Err(AppError::Forbidden("The default album cannot be deleted"));
    }

    let filenames = Album::delete_with_photos(&state.db_pool, album.id).await?;
    let photo_count = filenames.len();
    let mut stored = filenames;
    if !album.has_placeholder_cover() {
        stored.push(album.cover_filename.clone());
    }
    let warnings = remove_stored_files(state.uploads.upload_dir(), &stored).await;

    info!(photos = photo_count, failed_files = warnings.len(), "Album deleted");
    Ok(Json(DeleteResponse {
        message: format!("Album '{}' deleted.", album.title),
        deleted: photo_count,
        warnings,
    }))
}
