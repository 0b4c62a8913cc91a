//! Relying-party calls against the issuer: authorization URL, code exchange,
//! refresh grant, userinfo and RP-initiated logout.

use serde::Deserialize;
use url::Url;

use super::discovery::ProviderMetadata;
use crate::config::OidcConfig;
use crate::error::OidcError;

/// Raw response from the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Claims this service reads from the ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

pub struct OidcClient {
    http: reqwest::Client,
    metadata: ProviderMetadata,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    post_logout_redirect_uri: String,
    scopes: Vec<String>,
}

impl OidcClient {
    pub fn new(http: reqwest::Client, metadata: ProviderMetadata, config: &OidcConfig) -> Self {
        Self {
            http,
            metadata,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            post_logout_redirect_uri: config.post_logout_redirect_uri.clone(),
            scopes: config.scopes.clone(),
        }
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Authorization-code request with PKCE (S256) and nonce.
    pub fn authorization_url(
        &self,
        state: &str,
        code_challenge: &str,
        nonce: &str,
    ) -> Result<String, OidcError> {
        let mut url = Url::parse(&self.metadata.authorization_endpoint)?;
        url.query_pairs_mut()
            .append_pair("client_id", self.client_id.as_str())
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        Ok(url.to_string())
    }

    /// RP-initiated logout URL. The id token hint is added when available.
    pub fn end_session_url(&self, id_token_hint: Option<&str>) -> Result<String, OidcError> {
        let endpoint = self.metadata.end_session_endpoint.as_deref().ok_or_else(|| {
            OidcError::InvalidResponse("issuer does not advertise end_session_endpoint".into())
        })?;
        let mut url = Url::parse(endpoint)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", self.client_id.as_str())
                .append_pair("post_logout_redirect_uri", &self.post_logout_redirect_uri);
            if let Some(hint) = id_token_hint {
                pairs.append_pair("id_token_hint", hint);
            }
        }
        Ok(url.to_string())
    }

    #[tracing::instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, OidcError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ])
        .await
    }

    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, OidcError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, OidcError> {
        let resp = self
            .http
            .post(&self.metadata.token_endpoint)
            .form(params)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, "token endpoint rejected the request");
            return Err(OidcError::Http { status, body });
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| OidcError::InvalidResponse(format!("token response: {e}")))
    }

    /// Fetch the issuer's userinfo document for the access token.
    #[tracing::instrument(skip_all)]
    pub async fn userinfo(&self, access_token: &str) -> Result<serde_json::Value, OidcError> {
        let endpoint = self.metadata.userinfo_endpoint.as_deref().ok_or_else(|| {
            OidcError::InvalidResponse("issuer does not advertise userinfo_endpoint".into())
        })?;
        let resp = self
            .http
            .get(endpoint)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(OidcError::Http { status, body });
        }
        resp.json()
            .await
            .map_err(|e| OidcError::InvalidResponse(format!("userinfo response: {e}")))
    }
}
