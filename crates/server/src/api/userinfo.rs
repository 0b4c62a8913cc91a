//! `/api/userinfo`: the issuer's userinfo document for the browser session.

use axum::{Extension, Json};

use crate::{AppResources, error::ApiError, oidc::WebSession};

/// Tag for OpenAPI documentation.
pub const USER_TAG: &str = "User Info";

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/api/userinfo",
    tag = USER_TAG,
    operation_id = "User Info",
    summary = "Userinfo of the logged-in browser session",
    description = "Proxies the issuer's userinfo endpoint using the session's access token. Requires the session cookie.",
    responses(
        (status = 200, description = "Userinfo claims as returned by the issuer", content_type = "application/json"),
        (status = 303, description = "Not logged in, redirect to login"),
        (status = 502, description = "Identity provider unavailable", body = crate::error::ErrorBody),
    )
)]
pub async fn userinfo(
    Extension(resources): Extension<AppResources>,
    WebSession(session): WebSession,
) -> Result<Json<serde_json::Value>, ApiError> {
    let info = resources.oidc.userinfo(&session.access_token).await?;
    Ok(Json(info))
}
