//! Signed client-side session.
//!
//! The session (token set + profile) and the short-lived login-flow state are
//! HS256 JWTs stored in `HttpOnly` cookies. Nothing is kept in server memory.
//!
//! Browsers drop any cookie over 4096 bytes, and a session holding Keycloak's
//! access, refresh and ID tokens is larger than that. The session JWT is
//! therefore split across `session`, `session.1`, `session.2`, ... cookies.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;

use super::client::TokenResponse;
use crate::{AppResources, error::ApiError, error::SessionError};

pub const SESSION_COOKIE: &str = "session";
pub const LOGIN_FLOW_COOKIE: &str = "login_flow";

const SESSION_AUDIENCE: &str = "campus-sso:session";
const LOGIN_FLOW_AUDIENCE: &str = "campus-sso:login-flow";
const LOGIN_FLOW_TTL_SECS: i64 = 600;

/// Largest cookie value written per chunk. Leaves room for name and attributes.
const SESSION_CHUNK_LEN: usize = 3800;
const MAX_SESSION_CHUNKS: usize = 6;

/// Everything the browser flow needs between requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl SessionData {
    /// Session after a refresh-token grant. Tokens the issuer did not reissue are kept.
    pub fn refreshed(&self, tokens: TokenResponse) -> SessionData {
        SessionData {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.or_else(|| self.refresh_token.clone()),
            id_token: tokens.id_token.or_else(|| self.id_token.clone()),
            ..self.clone()
        }
    }
}

/// State carried from `/login` to `/oidc/callback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginFlow {
    pub state: String,
    pub pkce_verifier: String,
    pub nonce: String,
    pub return_to: String,
}

#[derive(Serialize, Deserialize)]
struct Signed<T> {
    aud: String,
    exp: i64,
    #[serde(flatten)]
    data: T,
}

pub struct SessionCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
    secure: bool,
}

impl SessionCodec {
    pub fn new(secret: &str, ttl_secs: i64, secure: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
            secure,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    fn sign<T: Serialize>(&self, audience: &str, ttl: i64, data: &T) -> Result<String, SessionError> {
        let exp = OffsetDateTime::now_utc().unix_timestamp() + ttl;
        let claims = Signed {
            aud: audience.to_string(),
            exp,
            data,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    fn open<T: DeserializeOwned>(&self, audience: &str, value: &str) -> Result<T, SessionError> {
        let mut validation = Validation::default();
        validation.set_audience(&[audience]);
        validation.leeway = 0;
        Ok(decode::<Signed<T>>(value, &self.decoding, &validation)?
            .claims
            .data)
    }

    pub fn encode_session(&self, data: &SessionData) -> Result<String, SessionError> {
        let jwt = self.sign(SESSION_AUDIENCE, self.ttl_secs, data)?;
        if jwt.len() > SESSION_CHUNK_LEN * MAX_SESSION_CHUNKS {
            return Err(SessionError::TooLarge(jwt.len()));
        }
        Ok(jwt)
    }

    pub fn decode_session(&self, value: &str) -> Result<SessionData, SessionError> {
        self.open(SESSION_AUDIENCE, value)
    }

    pub fn encode_flow(&self, flow: &LoginFlow) -> Result<String, SessionError> {
        self.sign(LOGIN_FLOW_AUDIENCE, LOGIN_FLOW_TTL_SECS, flow)
    }

    pub fn decode_flow(&self, value: &str) -> Result<LoginFlow, SessionError> {
        self.open(LOGIN_FLOW_AUDIENCE, value)
    }

    /// Reassemble and verify the session cookies from request headers.
    pub fn session_from_headers(&self, headers: &HeaderMap) -> Result<SessionData, SessionError> {
        let mut jwt = read_cookie(headers, SESSION_COOKIE)
            .ok_or(SessionError::Missing)?
            .to_string();
        for index in 1..MAX_SESSION_CHUNKS {
            match read_cookie(headers, &session_chunk_name(index)) {
                Some(chunk) => jwt.push_str(chunk),
                None => break,
            }
        }
        self.decode_session(&jwt)
    }

    /// `Set-Cookie` values for the session JWT, one per chunk. Unused chunk
    /// slots are cleared so a shorter session never picks up a stale tail.
    pub fn session_cookies(&self, jwt: &str) -> Vec<String> {
        // The JWT is ASCII, so byte chunks are valid strings.
        let chunks: Vec<&str> = jwt
            .as_bytes()
            .chunks(SESSION_CHUNK_LEN)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok())
            .collect();
        (0..MAX_SESSION_CHUNKS)
            .map(|index| match chunks.get(index) {
                Some(chunk) => self.cookie(&session_chunk_name(index), chunk, self.ttl_secs),
                None => self.cookie(&session_chunk_name(index), "", 0),
            })
            .collect()
    }

    pub fn clear_session_cookies(&self) -> Vec<String> {
        (0..MAX_SESSION_CHUNKS)
            .map(|index| self.cookie(&session_chunk_name(index), "", 0))
            .collect()
    }

    pub fn flow_cookie(&self, jwt: &str) -> String {
        self.cookie(LOGIN_FLOW_COOKIE, jwt, LOGIN_FLOW_TTL_SECS)
    }

    pub fn clear_flow_cookie(&self) -> String {
        self.cookie(LOGIN_FLOW_COOKIE, "", 0)
    }

    fn cookie(&self, name: &str, value: &str, max_age: i64) -> String {
        let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Append `Set-Cookie` headers to a response.
pub(crate) fn with_cookies(mut response: Response, cookies: &[String]) -> Result<Response, ApiError> {
    for cookie in cookies {
        let value = HeaderValue::from_str(cookie).map_err(|e| {
            tracing::error!("Invalid Set-Cookie value: {}", e);
            ApiError::Internal
        })?;
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(response)
}

fn session_chunk_name(index: usize) -> String {
    match index {
        0 => SESSION_COOKIE.to_string(),
        n => format!("{SESSION_COOKIE}.{n}"),
    }
}

/// Find a cookie value in the `Cookie` request header(s).
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.trim().is_empty())
        .map(|(_, value)| value.trim())
}

/// Only same-site absolute paths are accepted as post-login targets.
pub fn sanitize_return_to(candidate: Option<&str>) -> String {
    match candidate {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.contains(['\r', '\n']) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

/// `/login?return_to=<path>` for the given path and query.
pub fn login_redirect_target(path_and_query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(path_and_query.as_bytes()).collect();
    format!("/login?return_to={encoded}")
}

/// Rejection for pages that need a login: redirect to `/login`, or a server error.
pub enum SessionRejection {
    Login(String),
    Internal,
}

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        match self {
            SessionRejection::Login(target) => Redirect::to(&target).into_response(),
            SessionRejection::Internal => ApiError::Internal.into_response(),
        }
    }
}

fn resources_from(parts: &Parts) -> Option<AppResources> {
    let resources = parts.extensions.get::<AppResources>().cloned();
    if resources.is_none() {
        tracing::error!("AppResources not found in extensions");
    }
    resources
}

/// Extractor for pages that require a browser session.
///
/// Missing, tampered or expired cookies redirect to `/login?return_to=<current path>`.
pub struct WebSession(pub SessionData);

impl<S> FromRequestParts<S> for WebSession
where
    S: Send + Sync,
{
    type Rejection = SessionRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = resources_from(parts).ok_or(SessionRejection::Internal)?;

        match resources.sessions.session_from_headers(&parts.headers) {
            Ok(session) => Ok(WebSession(session)),
            Err(e) => {
                tracing::debug!(error = %e, path = %parts.uri.path(), "no valid session, redirecting to login");
                let current = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                Err(SessionRejection::Login(login_redirect_target(current)))
            }
        }
    }
}

/// Session if present and valid; never rejects.
pub struct MaybeSession(pub Option<SessionData>);

impl<S> FromRequestParts<S> for MaybeSession
where
    S: Send + Sync,
{
    type Rejection = SessionRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = resources_from(parts).ok_or(SessionRejection::Internal)?;
        Ok(MaybeSession(
            resources.sessions.session_from_headers(&parts.headers).ok(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn session() -> SessionData {
        SessionData {
            sub: "f3c1".into(),
            email: Some("ann@x.edu".into()),
            name: Some("Ann".into()),
            preferred_username: Some("ann".into()),
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            id_token: None,
        }
    }

    #[test]
    fn refresh_keeps_tokens_the_issuer_did_not_reissue() {
        let refreshed = session().refreshed(TokenResponse {
            access_token: "access-2".into(),
            expires_in: Some(300),
            refresh_token: None,
            id_token: Some("id-2".into()),
        });
        assert_eq!(refreshed.access_token, "access-2");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(refreshed.id_token.as_deref(), Some("id-2"));
        assert_eq!(refreshed.email, session().email);
    }

    #[test]
    fn session_round_trips() {
        let codec = SessionCodec::new(SECRET, 3600, false);
        let jwt = codec.encode_session(&session()).unwrap();
        assert_eq!(codec.decode_session(&jwt).unwrap(), session());
    }

    #[test]
    fn other_secret_is_rejected() {
        let jwt = SessionCodec::new(SECRET, 3600, false)
            .encode_session(&session())
            .unwrap();
        let other = SessionCodec::new("ffffffffffffffffffffffffffffffff", 3600, false);
        assert!(matches!(
            other.decode_session(&jwt),
            Err(SessionError::Invalid(_))
        ));
    }

    #[test]
    fn expired_session_is_rejected() {
        let codec = SessionCodec::new(SECRET, -10, false);
        let jwt = codec.encode_session(&session()).unwrap();
        assert!(codec.decode_session(&jwt).is_err());
    }

    #[test]
    fn flow_cookie_cannot_stand_in_for_session() {
        let codec = SessionCodec::new(SECRET, 3600, false);
        let flow = LoginFlow {
            state: "s".into(),
            pkce_verifier: "v".into(),
            nonce: "n".into(),
            return_to: "/".into(),
        };
        let jwt = codec.encode_flow(&flow).unwrap();
        assert!(codec.decode_session(&jwt).is_err());
        assert_eq!(codec.decode_flow(&jwt).unwrap(), flow);
    }

    fn token_of(len: usize) -> String {
        "x".repeat(len)
    }

    fn request_headers(set_cookies: &[String]) -> HeaderMap {
        let pairs: Vec<&str> = set_cookies
            .iter()
            .filter(|c| !c.contains("Max-Age=0"))
            .filter_map(|c| c.split(';').next())
            .collect();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&pairs.join("; ")).unwrap());
        headers
    }

    #[test]
    fn large_session_is_split_under_the_browser_cookie_limit() {
        let codec = SessionCodec::new(SECRET, 3600, true);
        let data = SessionData {
            access_token: token_of(1400),
            refresh_token: Some(token_of(800)),
            id_token: Some(token_of(1300)),
            ..session()
        };
        let jwt = codec.encode_session(&data).unwrap();
        let cookies = codec.session_cookies(&jwt);

        for cookie in &cookies {
            assert!(cookie.len() <= 4096, "Set-Cookie is {} bytes", cookie.len());
        }
        assert!(cookies.iter().filter(|c| !c.contains("Max-Age=0")).count() >= 2);
        assert_eq!(codec.session_from_headers(&request_headers(&cookies)).unwrap(), data);
    }

    #[test]
    fn small_session_clears_unused_chunks() {
        let codec = SessionCodec::new(SECRET, 3600, false);
        let jwt = codec.encode_session(&session()).unwrap();
        let cookies = codec.session_cookies(&jwt);

        assert_eq!(cookies.len(), MAX_SESSION_CHUNKS);
        assert!(cookies[0].starts_with(&format!("session={jwt};")));
        assert!(cookies[1].starts_with("session.1=;"));
        assert!(cookies[1].contains("Max-Age=0"));
        assert_eq!(codec.session_from_headers(&request_headers(&cookies)).unwrap(), session());
    }

    #[test]
    fn oversized_session_is_refused() {
        let codec = SessionCodec::new(SECRET, 3600, false);
        let data = SessionData {
            access_token: token_of(SESSION_CHUNK_LEN * MAX_SESSION_CHUNKS),
            ..session()
        };
        assert!(matches!(
            codec.encode_session(&data),
            Err(SessionError::TooLarge(_))
        ));
    }

    #[test]
    fn cookie_attributes() {
        let codec = SessionCodec::new(SECRET, 3600, true);
        assert_eq!(
            codec.session_cookies("abc")[0],
            "session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600; Secure"
        );
        assert!(
            codec
                .clear_session_cookies()
                .iter()
                .all(|c| c.contains("Max-Age=0"))
        );
        assert!(codec.clear_flow_cookie().starts_with("login_flow=; "));
        assert!(codec.clear_flow_cookie().contains("Max-Age=0"));
    }

    #[test]
    fn read_cookie_finds_named_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session= abc.def ; other=1"),
        );
        assert_eq!(read_cookie(&headers, "session"), Some("abc.def"));
        assert_eq!(read_cookie(&headers, "login_flow"), None);
    }

    #[test]
    fn return_to_must_be_local() {
        assert_eq!(sanitize_return_to(Some("/scholarships?x=1")), "/scholarships?x=1");
        assert_eq!(sanitize_return_to(Some("//evil.example")), "/");
        assert_eq!(sanitize_return_to(Some("https://evil.example")), "/");
        assert_eq!(sanitize_return_to(None), "/");
    }

    #[test]
    fn login_target_encodes_path() {
        assert_eq!(
            login_redirect_target("/scholarship/edit/3"),
            "/login?return_to=%2Fscholarship%2Fedit%2F3"
        );
    }
}
