//! Browser login flow: `/login`, `/oidc/callback`, `/logout`, `/logout_sso`
//! and `/refresh_token`.

use axum::{
    Extension, Json,
    extract::Query,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use oauth2::{CsrfToken, PkceCodeChallenge};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::OIDC_TAG;
use super::client::IdTokenClaims;
use super::session::{
    LOGIN_FLOW_COOKIE, LoginFlow, SessionData, WebSession, read_cookie, sanitize_return_to,
    with_cookies,
};
use crate::{
    AppResources,
    auth::decode_unverified_expiry,
    error::{ApiError, OidcError},
    web::format_timestamp,
};

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(login))
        .routes(routes!(callback))
        .routes(routes!(logout))
        .routes(routes!(logout_sso))
        .routes(routes!(refresh_token))
}

#[derive(Deserialize, IntoParams)]
struct LoginQuery {
    /// Local path to return to after login.
    return_to: Option<String>,
}

#[tracing::instrument(skip(resources, query))]
#[utoipa::path(
    get,
    path = "/login",
    tag = OIDC_TAG,
    operation_id = "Start Login",
    summary = "Start the OpenID Connect authorization-code flow",
    description = "Generates state, PKCE verifier and nonce, stores them in a signed short-lived cookie and \
                   redirects the browser to the issuer's authorization endpoint.",
    params(LoginQuery),
    responses(
        (status = 303, description = "Redirect to the identity provider"),
    )
)]
async fn login(
    Extension(resources): Extension<AppResources>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, ApiError> {
    let state = CsrfToken::new_random();
    let nonce = CsrfToken::new_random();
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

    let flow = LoginFlow {
        state: state.secret().clone(),
        pkce_verifier: verifier.secret().clone(),
        nonce: nonce.secret().clone(),
        return_to: sanitize_return_to(query.return_to.as_deref()),
    };
    let flow_jwt = resources.sessions.encode_flow(&flow).map_err(|e| {
        tracing::error!("Failed to sign login flow: {}", e);
        ApiError::Internal
    })?;

    let auth_url = resources
        .oidc
        .authorization_url(state.secret(), challenge.as_str(), nonce.secret())?;

    with_cookies(
        Redirect::to(&auth_url).into_response(),
        &[resources.sessions.flow_cookie(&flow_jwt)],
    )
}

#[derive(Deserialize, IntoParams)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/oidc/callback",
    tag = OIDC_TAG,
    operation_id = "Login Callback",
    summary = "Complete the authorization-code flow",
    description = "Checks the returned state against the login-flow cookie, exchanges the code (with the PKCE verifier), \
                   verifies the ID token's signature, audience and nonce, then sets the session cookie and \
                   redirects to the original page.",
    params(CallbackQuery),
    responses(
        (status = 303, description = "Logged in, redirect to the original page"),
        (status = 400, description = "Missing or mismatched state, or the issuer returned an error", body = crate::error::ErrorBody),
        (status = 502, description = "Identity provider unavailable", body = crate::error::ErrorBody),
    )
)]
async fn callback(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    if let Some(error) = query.error {
        tracing::warn!(%error, description = ?query.error_description, "issuer returned an authorization error");
        return Err(ApiError::BadRequest(format!(
            "Login failed: {}",
            query.error_description.unwrap_or(error)
        )));
    }

    let flow = read_cookie(&headers, LOGIN_FLOW_COOKIE)
        .and_then(|value| resources.sessions.decode_flow(value).ok())
        .ok_or_else(|| ApiError::BadRequest("Login flow expired, please sign in again".into()))?;

    if query.state.as_deref() != Some(flow.state.as_str()) {
        tracing::warn!("OIDC state mismatch");
        return Err(ApiError::BadRequest("State mismatch".into()));
    }
    let code = query
        .code
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".into()))?;

    let tokens = match resources.oidc.exchange_code(&code, &flow.pkce_verifier).await {
        Ok(tokens) => tokens,
        Err(OidcError::Http { status, .. }) if status.is_client_error() => {
            return Err(ApiError::BadRequest("Authorization code was rejected".into()));
        }
        Err(e) => return Err(e.into()),
    };
    let id_token = tokens
        .id_token
        .as_deref()
        .ok_or_else(|| ApiError::UpstreamUnavailable("Token response has no id_token".into()))?;

    let client_id = resources.oidc.client_id().to_string();
    let issuer = resources.oidc.metadata().issuer.clone();
    let claims: IdTokenClaims = resources
        .token_keys
        .decode_verified(id_token, |validation| {
            validation.validate_aud = true;
            validation.set_audience(&[client_id.as_str()]);
            validation.set_issuer(&[issuer.as_str()]);
        })
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "ID token verification failed");
            ApiError::Unauthenticated("ID token verification failed".into())
        })?;
    if claims.nonce.as_deref() != Some(flow.nonce.as_str()) {
        tracing::warn!("ID token nonce mismatch");
        return Err(ApiError::Unauthenticated("ID token nonce mismatch".into()));
    }

    let session = SessionData {
        sub: claims.sub,
        email: claims.email,
        name: claims.name,
        preferred_username: claims.preferred_username,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        id_token: tokens.id_token,
    };
    let session_jwt = resources.sessions.encode_session(&session).map_err(|e| {
        tracing::error!("Failed to sign session: {}", e);
        ApiError::Internal
    })?;
    tracing::info!(email = ?session.email, "user logged in");

    let mut cookies = resources.sessions.session_cookies(&session_jwt);
    cookies.push(resources.sessions.clear_flow_cookie());
    with_cookies(Redirect::to(&flow.return_to).into_response(), &cookies)
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/logout",
    tag = OIDC_TAG,
    operation_id = "Logout",
    summary = "Clear the local session",
    responses((status = 303, description = "Redirect to the home page"))
)]
async fn logout(Extension(resources): Extension<AppResources>) -> Result<Response, ApiError> {
    with_cookies(
        Redirect::to("/").into_response(),
        &resources.sessions.clear_session_cookies(),
    )
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/logout_sso",
    tag = OIDC_TAG,
    operation_id = "Logout SSO",
    summary = "Clear the local session and end the session at the issuer",
    description = "Redirects to the issuer's end-session endpoint with `client_id` and `post_logout_redirect_uri`. \
                   Falls back to the home page if the issuer has no end-session endpoint.",
    responses((status = 303, description = "Redirect to the issuer's logout page"))
)]
async fn logout_sso(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let id_token = resources
        .sessions
        .session_from_headers(&headers)
        .ok()
        .and_then(|s| s.id_token);

    let target = match resources.oidc.end_session_url(id_token.as_deref()) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(error = %e, "cannot build end-session URL, logging out locally");
            "/".to_string()
        }
    };
    with_cookies(
        Redirect::to(&target).into_response(),
        &resources.sessions.clear_session_cookies(),
    )
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    /// New access-token expiry in the configured display offset.
    pub token_expiry: String,
    pub access_token: String,
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/refresh_token",
    tag = OIDC_TAG,
    operation_id = "Refresh Token",
    summary = "Run the refresh-token grant for the current session",
    responses(
        (status = 200, description = "Token refreshed; the session cookie is re-issued", body = RefreshResponse),
        (status = 400, description = "No refresh token, or the issuer rejected it", body = crate::error::ErrorBody),
        (status = 303, description = "Not logged in, redirect to login"),
    )
)]
async fn refresh_token(
    Extension(resources): Extension<AppResources>,
    WebSession(session): WebSession,
) -> Result<Response, ApiError> {
    let refresh = session
        .refresh_token
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("No refresh token available".into()))?;

    let tokens = match resources.oidc.refresh(refresh).await {
        Ok(tokens) => tokens,
        Err(OidcError::Http { status, body }) => {
            tracing::warn!(%status, "refresh token rejected by issuer");
            return Err(ApiError::BadRequest(format!(
                "Failed to refresh the token: {body}"
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let offset = resources.config.web.display_offset().map_err(|e| {
        tracing::error!("{}", e);
        ApiError::Internal
    })?;
    let token_expiry = format_timestamp(decode_unverified_expiry(&tokens.access_token), offset);

    let access_token = tokens.access_token.clone();
    let refreshed = session.refreshed(tokens);
    let session_jwt = resources.sessions.encode_session(&refreshed).map_err(|e| {
        tracing::error!("Failed to sign session: {}", e);
        ApiError::Internal
    })?;
    tracing::info!(%token_expiry, "token refreshed");

    with_cookies(
        Json(RefreshResponse {
            token_expiry,
            access_token,
        })
        .into_response(),
        &resources.sessions.session_cookies(&session_jwt),
    )
}
