//! Issuer signing keys for local token verification.
//!
//! Two sources are supported: the single realm key published in the Keycloak
//! realm document, and a JWKS document cached by `kid`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

use crate::error::VerifyError;

/// Minimum interval between JWKS refreshes (5 minutes).
const JWKS_REFRESH_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
struct RealmDocument {
    public_key: Option<String>,
}

/// Wrap the realm's base64 DER `public_key` into a PEM document.
pub fn realm_key_to_pem(public_key: &str) -> String {
    let body: String = public_key.split_whitespace().collect();
    let mut pem = String::from("-----BEGIN PUBLIC KEY-----\n");
    for chunk in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

async fn fetch_realm_key_once(
    http: &reqwest::Client,
    issuer_url: &str,
) -> Result<DecodingKey, VerifyError> {
    let resp = http
        .get(issuer_url)
        .send()
        .await
        .map_err(|e| VerifyError::Upstream(format!("realm key fetch failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(VerifyError::Upstream(format!(
            "realm key fetch returned HTTP {}",
            resp.status()
        )));
    }

    let doc: RealmDocument = resp
        .json()
        .await
        .map_err(|e| VerifyError::InvalidResponse(format!("realm document: {e}")))?;
    let public_key = doc
        .public_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| VerifyError::InvalidResponse("realm document has no public_key".into()))?;

    DecodingKey::from_rsa_pem(realm_key_to_pem(&public_key).as_bytes())
        .map_err(|e| VerifyError::InvalidResponse(format!("realm public_key: {e}")))
}

/// Fetch the realm public key, retrying while the issuer is still starting up.
#[tracing::instrument(skip(http))]
pub async fn fetch_realm_public_key(
    http: &reqwest::Client,
    issuer_url: &str,
    attempts: u32,
    delay: Duration,
) -> Result<DecodingKey, VerifyError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match fetch_realm_key_once(http, issuer_url).await {
            Ok(key) => {
                tracing::info!(attempt, "fetched realm public key");
                return Ok(key);
            }
            Err(e) if attempt < attempts => {
                tracing::warn!(attempt, attempts, error = %e, "realm public key fetch failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(attempts, error = %e, "failed to fetch realm public key");
                return Err(e);
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<JwkEntry>,
}

/// JWKS keys keyed by `kid`, refreshed on a miss at most once per interval.
///
/// Only successful fetches count towards the interval. Concurrent misses
/// share one in-flight fetch.
pub struct JwksCache {
    http: reqwest::Client,
    jwks_url: String,
    keys: RwLock<HashMap<String, (Algorithm, DecodingKey)>>,
    last_refresh: RwLock<Option<Instant>>,
    refresh_guard: Mutex<()>,
}

impl JwksCache {
    pub fn new(http: reqwest::Client, jwks_url: String) -> Self {
        Self {
            http,
            jwks_url,
            keys: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(None),
            refresh_guard: Mutex::new(()),
        }
    }

    async fn cached(&self, kid: &str) -> Option<(Algorithm, DecodingKey)> {
        let keys = self.keys.read().await;
        keys.get(kid).map(|(alg, key)| (*alg, key.clone()))
    }

    pub async fn get_key(&self, kid: &str) -> Result<(Algorithm, DecodingKey), VerifyError> {
        if let Some(found) = self.cached(kid).await {
            return Ok(found);
        }

        {
            let _guard = self.refresh_guard.lock().await;
            // Another caller may have refreshed while we waited.
            if let Some(found) = self.cached(kid).await {
                return Ok(found);
            }
            self.refresh().await?;
        }

        self.cached(kid)
            .await
            .ok_or_else(|| VerifyError::UnknownKey(Some(kid.to_string())))
    }

    /// Caller must hold `refresh_guard`.
    #[tracing::instrument(skip(self), fields(jwks_url = %self.jwks_url))]
    async fn refresh(&self) -> Result<(), VerifyError> {
        {
            let last = self.last_refresh.read().await;
            if last.is_some_and(|t| t.elapsed().as_secs() < JWKS_REFRESH_INTERVAL_SECS) {
                return Ok(());
            }
        }

        let resp = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| VerifyError::Upstream(format!("JWKS fetch failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(VerifyError::Upstream(format!(
                "JWKS fetch returned HTTP {}",
                resp.status()
            )));
        }
        let doc: JwksDocument = resp
            .json()
            .await
            .map_err(|e| VerifyError::InvalidResponse(format!("JWKS document: {e}")))?;

        let mut new_keys = HashMap::new();
        for jwk in &doc.keys {
            let Some(kid) = jwk.kid.clone() else {
                continue;
            };
            let parsed = match jwk.kty.as_str() {
                "RSA" => match (jwk.n.as_deref(), jwk.e.as_deref()) {
                    (Some(n), Some(e)) => DecodingKey::from_rsa_components(n, e),
                    _ => continue,
                },
                "EC" => match (jwk.x.as_deref(), jwk.y.as_deref()) {
                    (Some(x), Some(y)) => DecodingKey::from_ec_components(x, y),
                    _ => continue,
                },
                _ => continue,
            };
            match parsed {
                Ok(key) => {
                    new_keys.insert(kid, (jwk_algorithm(jwk), key));
                }
                Err(e) => tracing::warn!(%kid, error = %e, "skipping malformed JWK"),
            }
        }

        tracing::debug!(keys = new_keys.len(), "JWKS refreshed");
        *self.keys.write().await = new_keys;
        *self.last_refresh.write().await = Some(Instant::now());
        Ok(())
    }
}

fn jwk_algorithm(jwk: &JwkEntry) -> Algorithm {
    match jwk.alg.as_deref() {
        Some("RS384") => Algorithm::RS384,
        Some("RS512") => Algorithm::RS512,
        Some("PS256") => Algorithm::PS256,
        Some("ES256") => Algorithm::ES256,
        Some("ES384") => Algorithm::ES384,
        Some("RS256") => Algorithm::RS256,
        _ => match (jwk.kty.as_str(), jwk.crv.as_deref()) {
            ("EC", Some("P-384")) => Algorithm::ES384,
            ("EC", _) => Algorithm::ES256,
            _ => Algorithm::RS256,
        },
    }
}

/// Key material used by the local verifier.
pub enum SigningKeys {
    /// The realm's single RS256 key.
    Realm(DecodingKey),
    Jwks(Arc<JwksCache>),
}

impl SigningKeys {
    pub async fn key_for(&self, kid: Option<&str>) -> Result<(Algorithm, DecodingKey), VerifyError> {
        match self {
            SigningKeys::Realm(key) => Ok((Algorithm::RS256, key.clone())),
            SigningKeys::Jwks(cache) => {
                let kid = kid.ok_or(VerifyError::UnknownKey(None))?;
                cache.get_key(kid).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[test]
    fn pem_wraps_at_64_columns() {
        let body = "A".repeat(150);
        let pem = realm_key_to_pem(&body);
        let lines: Vec<&str> = pem.lines().collect();
        assert_eq!(lines[0], "-----BEGIN PUBLIC KEY-----");
        assert_eq!(lines[1].len(), 64);
        assert_eq!(lines[2].len(), 64);
        assert_eq!(lines[3].len(), 22);
        assert_eq!(lines[4], "-----END PUBLIC KEY-----");
    }

    #[test]
    fn realm_fixture_key_parses() {
        let body = include_str!("../../tests/fixtures/test_realm_public_key.txt");
        assert!(DecodingKey::from_rsa_pem(realm_key_to_pem(body).as_bytes()).is_ok());
    }

    #[test]
    fn jwk_algorithm_defaults_by_key_type() {
        let jwk: JwkEntry =
            serde_json::from_str(r#"{"kid":"a","kty":"EC","crv":"P-384"}"#).unwrap();
        assert_eq!(jwk_algorithm(&jwk), Algorithm::ES384);
        let jwk: JwkEntry = serde_json::from_str(r#"{"kid":"b","kty":"RSA"}"#).unwrap();
        assert_eq!(jwk_algorithm(&jwk), Algorithm::RS256);
    }

    const JWK_MODULUS: &str = include_str!("../../tests/fixtures/test_rsa_jwk_n.txt");

    fn jwks_body(keys: serde_json::Value) -> serde_json::Value {
        serde_json::json!({ "keys": keys })
    }

    fn good_jwk(kid: &str) -> serde_json::Value {
        serde_json::json!({ "kid": kid, "kty": "RSA", "alg": "RS256", "n": JWK_MODULUS.trim(), "e": "AQAB" })
    }

    async fn cache_for(server: &MockServer) -> JwksCache {
        JwksCache::new(reqwest::Client::new(), format!("{}/certs", server.uri()))
    }

    #[tokio::test]
    async fn concurrent_misses_wait_for_the_inflight_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks_body(serde_json::json!([good_jwk("k1")])))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let cache = cache_for(&server).await;

        let first = cache.get_key("k1");
        let second = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cache.get_key("k1").await
        };
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_ok());
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn failed_fetch_does_not_block_the_next_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(jwks_body(serde_json::json!([good_jwk("k1")]))),
            )
            .mount(&server)
            .await;
        let cache = cache_for(&server).await;

        assert!(matches!(cache.get_key("k1").await, Err(VerifyError::Upstream(_))));
        assert!(cache.get_key("k1").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_kid_after_refresh_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(jwks_body(serde_json::json!([good_jwk("k1")]))),
            )
            .expect(1)
            .mount(&server)
            .await;
        let cache = cache_for(&server).await;

        assert!(cache.get_key("k1").await.is_ok());
        assert!(matches!(cache.get_key("k2").await, Err(VerifyError::UnknownKey(_))));
        assert!(matches!(cache.get_key("k3").await, Err(VerifyError::UnknownKey(_))));
    }

    #[tokio::test]
    async fn malformed_jwk_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(serde_json::json!([
                { "kid": "broken", "kty": "RSA", "n": "!!not-base64!!", "e": "AQAB" },
                good_jwk("k1"),
            ]))))
            .mount(&server)
            .await;
        let cache = cache_for(&server).await;

        assert!(cache.get_key("k1").await.is_ok());
        assert!(matches!(cache.get_key("broken").await, Err(VerifyError::UnknownKey(_))));
    }

    #[tokio::test]
    async fn realm_keys_ignore_kid() {
        let body = include_str!("../../tests/fixtures/test_realm_public_key.txt");
        let key = DecodingKey::from_rsa_pem(realm_key_to_pem(body).as_bytes()).unwrap();
        let keys = SigningKeys::Realm(key);
        let (alg, _) = keys.key_for(Some("whatever")).await.unwrap();
        assert_eq!(alg, Algorithm::RS256);
    }
}
