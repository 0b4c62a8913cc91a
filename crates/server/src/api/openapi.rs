//! OpenAPI/Utoipa configuration.

use crate::api::{health::MISC_TAG, resource::STUDENT_TAG, userinfo::USER_TAG};
use crate::oidc::OIDC_TAG;
use crate::web::WEB_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        // The header carries either the bare token or `Bearer <token>`.
        let bearer = ApiKey::Header(ApiKeyValue::with_description(
            "Authorization",
            "Access token issued by the SSO realm, optionally prefixed with `Bearer `.",
        ));
        components.add_security_scheme("Bearer", SecurityScheme::ApiKey(bearer));
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Campus SSO API",
        version = "1.0.0",
        description = "Student resource API protected by SSO bearer tokens, plus the scholarships web app."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = STUDENT_TAG, description = "Student records of the token holder"),
        (name = USER_TAG, description = "Userinfo for the browser session"),
        (name = OIDC_TAG, description = "OpenID Connect login flow"),
        (name = WEB_TAG, description = "Server-rendered pages")
    )
)]
pub struct ApiDoc;
