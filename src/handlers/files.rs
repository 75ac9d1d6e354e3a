//! # Stored File Handler
//!
//! Serves photos and covers from the upload directory.

use std::path::{Component, Path as FsPath};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::Request,
    response::{IntoResponse, Response},
};
use tower_http::services::ServeFile;
use tracing::{debug, error, instrument, warn};

use crate::error::AppError;
use crate::models::AppState;
use crate::utils::file::FileManager;

/// Serve a stored file
///
/// GET /uploads/{filename}
///
/// The name must be a single plain path component, so no path outside the
/// upload directory can be addressed.
///
/// # Returns
///
/// - `200 OK` - File contents
/// - `400 Bad Request` - Name has path separators or is `.`/`..`
/// - `404 Not Found` - No such file
#[instrument(skip(state, req))]
pub async fn serve_upload(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    req: Request<Body>,
) -> Response {
    if !is_plain_file_name(&filename) {
        warn!("Rejected unsafe filename");
        return AppError::BadRequest("Invalid filename").into_response();
    }

    let file_path = state.uploads.upload_dir().join(&filename);
    match FileManager::is_file(&file_path).await {
        Ok(true) => {}
        Ok(false) => {
            debug!("Stored file not found");
            return AppError::NotFound("File not found").into_response();
        }
        Err(e) => return AppError::Io(e).into_response(),
    }

    let mut service = ServeFile::new(file_path);
    match service.try_call(req).await {
        Ok(res) => res.into_response(),
        Err(e) => {
            error!("Failed to serve file: {}", e);
            AppError::Internal.into_response()
        }
    }
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = FsPath::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}
