use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, de::DeserializeOwned};

use super::claims::TokenClaims;
use super::introspection::IntrospectionVerifier;
use super::keys::SigningKeys;
use crate::error::VerifyError;

/// Strip an optional `Bearer ` prefix (any case) from an `Authorization` value.
pub fn strip_bearer(raw: &str) -> &str {
    let raw = raw.trim();
    match raw.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer") => {
            let rest = &raw[6..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                rest.trim()
            } else {
                raw
            }
        }
        _ => raw,
    }
}

/// Verifies JWT signatures locally against the issuer's keys.
pub struct LocalVerifier {
    keys: SigningKeys,
}

impl LocalVerifier {
    pub fn new(keys: SigningKeys) -> Self {
        Self { keys }
    }

    /// Verify signature and expiry; audience is not checked.
    pub async fn verify(&self, token: &str) -> Result<TokenClaims, VerifyError> {
        self.decode_verified(token, |_| {}).await
    }

    /// Verify signature and expiry, letting the caller tighten the validation
    /// (audience, issuer) before decoding.
    pub async fn decode_verified<T, F>(&self, token: &str, configure: F) -> Result<T, VerifyError>
    where
        T: DeserializeOwned,
        F: FnOnce(&mut Validation),
    {
        let header = decode_header(token)?;
        let (alg, key) = self.keys.key_for(header.kid.as_deref()).await?;

        let mut validation = Validation::new(alg);
        validation.validate_aud = false;
        configure(&mut validation);

        Ok(decode::<T>(token, &key, &validation)?.claims)
    }
}

/// Bearer-token verification strategy, chosen once from configuration.
pub enum CredentialVerifier {
    Introspection(IntrospectionVerifier),
    Local(std::sync::Arc<LocalVerifier>),
}

impl CredentialVerifier {
    pub async fn verify(&self, raw: &str) -> Result<TokenClaims, VerifyError> {
        let token = strip_bearer(raw);
        if token.is_empty() {
            return Err(VerifyError::MissingCredential);
        }
        match self {
            CredentialVerifier::Introspection(v) => v.verify(token).await,
            CredentialVerifier::Local(v) => v.verify(token).await,
        }
    }
}

#[derive(Deserialize)]
struct ExpiryOnly {
    exp: Option<i64>,
}

/// Read `exp` without verifying the signature. Display only: never feed the
/// result into an access decision.
pub fn decode_unverified_expiry(token: &str) -> Option<i64> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<ExpiryOnly>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .and_then(|data| data.claims.exp)
}
