//! HTTP surface of the service.
//!
//! - `resource` - Student resource API (/api/resource)
//! - `userinfo` - Issuer userinfo for the browser session (/api/userinfo)
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration
//!
//! The browser pages and login flow live in [`crate::web`] and [`crate::oidc`].

pub mod health;
pub mod openapi;
pub mod resource;
pub mod userinfo;

pub use health::MISC_TAG;
pub use resource::STUDENT_TAG;

use crate::{AppResources, oidc, web};
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Build the full application router with middleware and API docs.
pub fn router(app_resources: AppResources) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .routes(routes!(
            resource::get_resource,
            resource::post_resource,
            resource::put_resource,
            resource::delete_resource
        ))
        .routes(routes!(userinfo::userinfo))
        .merge(oidc::router())
        .merge(web::router())
        .routes(routes!(health::health))
        .layer(axum::Extension(app_resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(app_resources))]
pub async fn start_webserver(app_resources: AppResources) -> color_eyre::Result<()> {
    let addr = app_resources.config.socket_addr()?;
    let router = router(app_resources);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server running");
    axum::serve(listener, router)
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
