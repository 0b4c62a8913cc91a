use askama::Template;
use axum::{Extension, extract::Query, response::Response};
use serde::Deserialize;
use utoipa::IntoParams;

use super::{WEB_TAG, format_timestamp, render};
use crate::{
    AppResources,
    auth::decode_unverified_expiry,
    error::ApiError,
    oidc::{MaybeSession, WebSession},
};

#[derive(Deserialize, IntoParams)]
pub struct NoticeQuery {
    /// Info message to display.
    pub message: Option<String>,
    /// Error message to display.
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    logged_in: bool,
    display_name: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "public.html")]
struct PublicTemplate {
    logged_in: bool,
}

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfileTemplate {
    logged_in: bool,
    sub: String,
    email: String,
    name: String,
    preferred_username: String,
    access_token: String,
    token_expiry: String,
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/",
    tag = WEB_TAG,
    operation_id = "Home Page",
    summary = "Home page showing the login state",
    params(NoticeQuery),
    responses((status = 200, description = "Home page HTML", content_type = "text/html"))
)]
pub async fn home(MaybeSession(session): MaybeSession, Query(notice): Query<NoticeQuery>) -> Response {
    let display_name = session.as_ref().and_then(|s| {
        s.name
            .clone()
            .or_else(|| s.preferred_username.clone())
            .or_else(|| s.email.clone())
    });
    render(&HomeTemplate {
        logged_in: session.is_some(),
        display_name,
        message: notice.message,
        error: notice.error,
    })
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/public",
    tag = WEB_TAG,
    operation_id = "Public Page",
    summary = "Page reachable without login",
    responses((status = 200, description = "Public page HTML", content_type = "text/html"))
)]
pub async fn public(MaybeSession(session): MaybeSession) -> Response {
    render(&PublicTemplate {
        logged_in: session.is_some(),
    })
}

#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/profile",
    tag = WEB_TAG,
    operation_id = "Profile Page",
    summary = "Profile of the logged-in user",
    description = "Shows the ID token profile, the current access token and its expiry. The expiry is read \
                   without signature verification and is display-only.",
    responses(
        (status = 200, description = "Profile page HTML", content_type = "text/html"),
        (status = 303, description = "Not logged in, redirect to login"),
    )
)]
pub async fn profile(
    Extension(resources): Extension<AppResources>,
    WebSession(session): WebSession,
) -> Result<Response, ApiError> {
    let offset = resources.config.web.display_offset().map_err(|e| {
        tracing::error!("{}", e);
        ApiError::Internal
    })?;
    let token_expiry = format_timestamp(decode_unverified_expiry(&session.access_token), offset);

    Ok(render(&ProfileTemplate {
        logged_in: true,
        sub: session.sub,
        email: session.email.unwrap_or_default(),
        name: session.name.unwrap_or_default(),
        preferred_username: session.preferred_username.unwrap_or_default(),
        access_token: session.access_token,
        token_expiry,
    }))
}
