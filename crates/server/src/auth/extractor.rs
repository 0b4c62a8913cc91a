use axum::{extract::FromRequestParts, http::request::Parts};

use super::claims::TokenClaims;
use crate::{AppResources, error::ApiError, error::VerifyError};

/// Axum extractor that verifies the `Authorization` header and yields its claims.
///
/// Identity and roles are resolved afterwards by [`RoleGate::authorize`](super::RoleGate::authorize),
/// which checks the role before the email.
///
/// ```ignore
/// async fn handler(ApiCredential(claims): ApiCredential) -> String {
///     claims.sub.unwrap_or_default()
/// }
/// ```
pub struct ApiCredential(pub TokenClaims);

impl<S> FromRequestParts<S> for ApiCredential
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = parts
            .extensions
            .get::<AppResources>()
            .cloned()
            .ok_or_else(|| {
                tracing::error!("AppResources not found in extensions");
                ApiError::Internal
            })?;

        let raw = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(VerifyError::MissingCredential)?;

        let claims = resources.verifier.verify(raw).await?;
        tracing::debug!(sub = ?claims.sub, "bearer token accepted");
        Ok(ApiCredential(claims))
    }
}
