//! Server-rendered pages: home, public, profile and the scholarships app.

pub mod pages;
pub mod scholarships;

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use time::{OffsetDateTime, UtcOffset, macros::format_description};
use utoipa_axum::{router::OpenApiRouter, routes};

/// OpenAPI tag for HTML pages
pub const WEB_TAG: &str = "Web Pages";

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(pages::home))
        .routes(routes!(pages::public))
        .routes(routes!(pages::profile))
        .routes(routes!(scholarships::list))
        .routes(routes!(scholarships::add_form, scholarships::add_submit))
        .routes(routes!(scholarships::edit_form, scholarships::edit_submit))
        .routes(routes!(scholarships::delete))
}

/// Render a unix timestamp as `YYYY-MM-DD HH:MM:SS` in the given offset,
/// or `Unknown` when absent or out of range.
pub fn format_timestamp(timestamp: Option<i64>, offset: UtcOffset) -> String {
    timestamp
        .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok())
        .and_then(|dt| {
            dt.to_offset(offset)
                .format(format_description!(
                    "[year]-[month]-[day] [hour]:[minute]:[second]"
                ))
                .ok()
        })
        .unwrap_or_else(|| "Unknown".to_string())
}

pub(crate) fn render<T: Template>(template: &T) -> Response {
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Failed to render template: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// `path?key=value` with the value form-encoded.
pub(crate) fn with_query(path: &str, key: &str, value: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
    format!("{path}?{key}={encoded}")
}
