use axum::http::StatusCode;
use tracing::{debug, instrument};

/// Liveness probe.
///
/// GET /health-check
///
/// Touches neither the database nor the upload directory; always `200 OK`
/// with an empty body.
#[instrument]
pub async fn health_check() -> StatusCode {
    debug!("Health check endpoint accessed");
    StatusCode::OK
}
