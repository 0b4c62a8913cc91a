//! SSO-protected campus services.
//!
//! A student resource API guarded by bearer tokens (introspection or local
//! JWT verification plus a client-role check) and a scholarships web app using
//! an OpenID Connect login with a signed cookie session.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;

use crate::auth::keys::{JwksCache, SigningKeys, fetch_realm_public_key};
use crate::auth::{CredentialVerifier, LocalVerifier, introspection::IntrospectionVerifier};
use crate::config::{AppConfig, KeySource, VerificationMode};
use crate::error::{OidcError, StartupError};
use crate::oidc::{OidcClient, SessionCodec};

pub mod api;
pub mod auth;
pub mod config;
pub mod entity;
pub mod error;
pub mod oidc;
pub mod store;
pub mod web;

#[derive(Clone)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub oidc: Arc<OidcClient>,
    /// Verifier for `/api/resource` bearer tokens.
    pub verifier: Arc<CredentialVerifier>,
    /// Local signature verification, used for browser-session tokens regardless of API mode.
    pub token_keys: Arc<LocalVerifier>,
    pub sessions: Arc<SessionCodec>,
}

impl AppResources {
    /// Discover the issuer, load its signing keys and wire up the verifiers.
    #[tracing::instrument(skip_all, fields(issuer = %config.oidc.issuer_url))]
    pub async fn initialize(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
    ) -> Result<Self, StartupError> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("campus-sso/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(OidcError::from)?;

        let metadata = oidc::discover(&http, &config.oidc.issuer_url).await?;

        let keys = match config.api.key_source {
            KeySource::Realm => SigningKeys::Realm(
                fetch_realm_public_key(
                    &http,
                    &config.oidc.issuer_url,
                    config.api.key_fetch_retries,
                    Duration::from_secs(config.api.key_fetch_delay_secs),
                )
                .await?,
            ),
            KeySource::Jwks => {
                let jwks_uri = metadata.jwks_uri.clone().ok_or_else(|| {
                    OidcError::InvalidResponse("discovery document has no jwks_uri".into())
                })?;
                SigningKeys::Jwks(Arc::new(JwksCache::new(http.clone(), jwks_uri)))
            }
        };
        let token_keys = Arc::new(LocalVerifier::new(keys));

        let verifier = match config.api.verification {
            VerificationMode::Local => CredentialVerifier::Local(token_keys.clone()),
            VerificationMode::Introspection => {
                let endpoint = metadata.introspection_endpoint.clone().ok_or_else(|| {
                    OidcError::InvalidResponse(
                        "discovery document has no introspection_endpoint".into(),
                    )
                })?;
                CredentialVerifier::Introspection(IntrospectionVerifier::new(
                    http.clone(),
                    endpoint,
                    config.oidc.client_id.clone(),
                    config.oidc.client_secret.clone(),
                ))
            }
        };
        tracing::info!(
            verification = ?config.api.verification,
            key_source = ?config.api.key_source,
            "credential verifier ready"
        );

        let sessions = SessionCodec::new(
            &config.web.session_secret,
            config.web.session_ttl_secs,
            config.web.cookie_secure,
        );
        let oidc = OidcClient::new(http, metadata, &config.oidc);

        Ok(Self {
            db,
            config,
            oidc: Arc::new(oidc),
            verifier: Arc::new(verifier),
            token_keys,
            sessions: Arc::new(sessions),
        })
    }
}
