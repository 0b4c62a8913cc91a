//! Health check endpoint.

use axum::{Extension, http::StatusCode};

use crate::AppResources;

/// Tag for OpenAPI documentation.
pub const MISC_TAG: &str = "Miscellaneous";

/// Health check endpoint. Also pings the database.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    method(get, head),
    path = "/healthz",
    tag = MISC_TAG,
    operation_id = "Health Check",
    summary = "Service health check",
    description = "Returns `ok` while the service is accepting requests and its database answers a ping.\n\n\
                   Supports both GET and HEAD methods for compatibility with various health check systems.",
    responses(
        (status = 200, description = "Service is healthy", body = str, content_type = "text/plain", example = "ok"),
        (status = 503, description = "Database unreachable", body = str, content_type = "text/plain")
    )
)]
pub async fn health(
    Extension(resources): Extension<AppResources>,
) -> (StatusCode, &'static str) {
    match resources.db.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!("Database ping failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}
