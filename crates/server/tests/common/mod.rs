//! Shared fixtures: a wiremock identity provider, RS256 token signing and an
//! in-memory database with migrations applied.
#![allow(dead_code)]

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::TestServer;
use campus_sso::{
    AppResources,
    config::{ApiConfig, AppConfig, KeySource, OidcConfig, VerificationMode, WebConfig},
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const REALM_PATH: &str = "/realms/demo";
pub const API_CLIENT_ID: &str = "first.example.org";
pub const WEB_CLIENT_ID: &str = "second.example.org";
pub const KEY_ID: &str = "test-key";
pub const SESSION_SECRET: &str = "0123456789abcdef0123456789abcdef";

pub const PRIVATE_KEY: &str = include_str!("../fixtures/test_rsa_private.pem");
pub const OTHER_PRIVATE_KEY: &str = include_str!("../fixtures/other_rsa_private.pem");
const REALM_PUBLIC_KEY: &str = include_str!("../fixtures/test_realm_public_key.txt");
const JWK_MODULUS: &str = include_str!("../fixtures/test_rsa_jwk_n.txt");

/// Keycloak-shaped identity provider with discovery, realm document and JWKS mounted.
pub struct MockIdp {
    pub server: MockServer,
}

impl MockIdp {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let issuer = format!("{}{}", server.uri(), REALM_PATH);
        let endpoints = format!("{issuer}/protocol/openid-connect");

        Mock::given(method("GET"))
            .and(path(format!("{REALM_PATH}/.well-known/openid-configuration")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{endpoints}/auth"),
                "token_endpoint": format!("{endpoints}/token"),
                "userinfo_endpoint": format!("{endpoints}/userinfo"),
                "jwks_uri": format!("{endpoints}/certs"),
                "introspection_endpoint": format!("{endpoints}/token/introspect"),
                "end_session_endpoint": format!("{endpoints}/logout"),
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(REALM_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "realm": "demo",
                "public_key": REALM_PUBLIC_KEY.trim(),
                "token-service": endpoints.clone(),
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(format!("{REALM_PATH}/protocol/openid-connect/certs")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "keys": [{
                    "kid": KEY_ID,
                    "kty": "RSA",
                    "alg": "RS256",
                    "use": "sig",
                    "n": JWK_MODULUS.trim(),
                    "e": "AQAB",
                }]
            })))
            .mount(&server)
            .await;

        Self { server }
    }

    pub fn issuer(&self) -> String {
        format!("{}{}", self.server.uri(), REALM_PATH)
    }

    pub fn endpoint(&self, suffix: &str) -> String {
        format!("{REALM_PATH}/protocol/openid-connect/{suffix}")
    }

    /// Answer every introspection call with the given body.
    pub async fn introspection_returns(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path(self.endpoint("token/introspect")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer every token-endpoint call with the given status and body.
    pub async fn token_endpoint_returns(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path(self.endpoint("token")))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

pub fn test_config(issuer: &str, verification: VerificationMode, key_source: KeySource) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        bind_address: "127.0.0.1:5001".into(),
        run_migrations: true,
        oidc: OidcConfig {
            issuer_url: issuer.to_string(),
            client_id: WEB_CLIENT_ID.into(),
            client_secret: "web-secret".into(),
            redirect_uri: "http://localhost:5001/oidc/callback".into(),
            post_logout_redirect_uri: "http://localhost:5001/".into(),
            scopes: vec!["openid".into(), "email".into(), "profile".into()],
        },
        api: ApiConfig {
            client_id: API_CLIENT_ID.into(),
            required_role: "Student".into(),
            verification,
            key_source,
            key_fetch_retries: 1,
            key_fetch_delay_secs: 0,
        },
        web: WebConfig {
            session_secret: SESSION_SECRET.into(),
            session_ttl_secs: 3600,
            cookie_secure: false,
            privileged_role: "lecturer".into(),
            display_utc_offset: "+07:00".into(),
        },
    }
}

pub async fn test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect to in-memory sqlite");
    Migrator::up(&db, None).await.expect("apply migrations");
    db
}

pub async fn test_resources(config: AppConfig) -> AppResources {
    AppResources::initialize(Arc::new(config), Arc::new(test_db().await))
        .await
        .expect("initialize app resources")
}

pub fn test_server(resources: AppResources) -> TestServer {
    TestServer::new(campus_sso::api::router(resources)).expect("create test server")
}

pub fn now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Sign claims as the identity provider would (RS256, `kid` = [`KEY_ID`]).
pub fn sign_token(claims: &Value) -> String {
    sign_with(PRIVATE_KEY, claims)
}

pub fn sign_with(private_pem: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(KEY_ID.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("fixture key"),
    )
    .expect("sign token")
}

/// Access-token claims carrying a client role for the resource API.
pub fn api_claims(email: &str, client_roles: &[&str]) -> Value {
    json!({
        "sub": format!("sub-{email}"),
        "email": email,
        "preferred_username": email.split('@').next().unwrap_or(email),
        "exp": now() + 300,
        "resource_access": { API_CLIENT_ID: { "roles": client_roles } },
    })
}

/// Access-token claims carrying realm roles for the web app.
pub fn web_claims(email: &str, realm_roles: &[&str]) -> Value {
    json!({
        "sub": format!("sub-{email}"),
        "email": email,
        "exp": now() + 300,
        "realm_access": { "roles": realm_roles },
    })
}

pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).expect("header value"),
    )
}

pub fn cookie(name: &str, value: &str) -> (HeaderName, HeaderValue) {
    (
        header::COOKIE,
        HeaderValue::from_str(&format!("{name}={value}")).expect("header value"),
    )
}

/// Value of the named cookie in a response's `Set-Cookie` headers.
pub fn set_cookie_value(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| {
            let first = v.split(';').next()?;
            let (key, value) = first.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
}

pub fn set_cookie_headers(headers: &axum::http::HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}
