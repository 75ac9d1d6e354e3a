//! # Album Access Middleware
//!
//! Guards every `/api/albums/{album_id}/...` route except `authorize`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, trace, warn};

use crate::error::{AppError, AppResult};
use crate::models::{Album, AppState};

/// Loads the album named by the `album_id` path segment and checks access.
///
/// # Access Flow
///
/// 1. Parses `album_id` from the path and loads the album
/// 2. Open albums pass straight through
/// 3. Protected albums require `Authorization: Bearer <token>` whose claims list the album
/// 4. Inserts the loaded [`Album`] into request extensions for the handlers
///
/// # Returns
///
/// - **Success**: Continues to next handler with the album in extensions
/// - **Failure**: `404 Not Found` for unknown albums, `401 Unauthorized` for missing access
#[instrument(
    skip_all,
    fields(
        method = %req.method(),
        uri = %req.uri(),
        request_id = %uuid::Uuid::new_v4()
    )
)]
pub async fn album_access_middleware(
    State(state): State<Arc<AppState>>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> AppResult<Response> {
    let Some(album_id) = params.get("album_id").and_then(|raw| raw.parse::<i64>().ok()) else {
        warn!("Missing or malformed album id in path");
        return Err(AppError::NotFound("Album not found"));
    };

    let Some(album) = Album::find(&state.db_pool, album_id).await? else {
        debug!(album_id, "Album not found");
        return Err(AppError::NotFound("Album not found"));
    };

    if album.is_protected() {
        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "));

        let Some(token) = token else {
            warn!(album_id, "Protected album requested without access token");
            return Err(AppError::Unauthorized("Album password required"));
        };

        match state.access.validate(token) {
            Ok(claims) if claims.grants(album_id) => {
                trace!(album_id, "Album access granted");
            }
            Ok(_) => {
                warn!(album_id, "Access token does not unlock this album");
                return Err(AppError::Unauthorized("Album password required"));
            }
            Err(e) => {
                warn!(album_id, error = %e, "Token validation failed");
                return Err(AppError::Unauthorized("Album password required"));
            }
        }
    }

    req.extensions_mut().insert(album);
    Ok(next.run(req).await)
}
