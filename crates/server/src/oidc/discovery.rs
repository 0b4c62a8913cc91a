//! OIDC discovery: fetching `.well-known/openid-configuration`.

use serde::Deserialize;

use crate::error::OidcError;

/// Endpoints discovered from the issuer's `.well-known/openid-configuration`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub introspection_endpoint: Option<String>,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

/// Fetch the discovery document from `{issuer}/.well-known/openid-configuration`.
#[tracing::instrument(skip(http))]
pub async fn discover(http: &reqwest::Client, issuer: &str) -> Result<ProviderMetadata, OidcError> {
    let url = format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    );
    let resp = http.get(&url).send().await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(OidcError::Http { status, body });
    }

    let metadata = resp.json::<ProviderMetadata>().await.map_err(|e| {
        OidcError::InvalidResponse(format!("failed to parse discovery document: {e}"))
    })?;
    tracing::info!(issuer = %metadata.issuer, "OIDC discovery complete");
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keycloak_document_parses() {
        let doc = r#"{
            "issuer": "https://sso.example.org/realms/demo",
            "authorization_endpoint": "https://sso.example.org/realms/demo/protocol/openid-connect/auth",
            "token_endpoint": "https://sso.example.org/realms/demo/protocol/openid-connect/token",
            "introspection_endpoint": "https://sso.example.org/realms/demo/protocol/openid-connect/token/introspect",
            "end_session_endpoint": "https://sso.example.org/realms/demo/protocol/openid-connect/logout",
            "grant_types_supported": ["authorization_code", "refresh_token"]
        }"#;
        let metadata: ProviderMetadata = serde_json::from_str(doc).unwrap();
        assert!(metadata.introspection_endpoint.is_some());
        assert!(metadata.jwks_uri.is_none());
    }
}
