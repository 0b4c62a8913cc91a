use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::VerifyError;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RoleSet {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims read from a verified access token or an introspection response.
///
/// Only the fields this service makes decisions on are modelled; everything
/// else in the token is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub realm_access: Option<RoleSet>,
    #[serde(default)]
    pub resource_access: HashMap<String, RoleSet>,
}

impl TokenClaims {
    /// Roles granted for one client (`resource_access.<client_id>.roles`).
    pub fn client_roles(&self, client_id: &str) -> &[String] {
        self.resource_access
            .get(client_id)
            .map(|r| r.roles.as_slice())
            .unwrap_or_default()
    }

    /// Realm-wide roles (`realm_access.roles`).
    pub fn realm_roles(&self) -> &[String] {
        self.realm_access
            .as_ref()
            .map(|r| r.roles.as_slice())
            .unwrap_or_default()
    }
}

/// Which claim the caller's roles are read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleSource<'a> {
    Client(&'a str),
    Realm,
}

/// The authenticated caller, derived fresh from each verified credential.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    /// Ownership key for every record.
    pub email: String,
    pub subject: Option<String>,
    pub roles: Vec<String>,
    pub expires_at: Option<i64>,
}

impl Principal {
    pub fn from_claims(claims: &TokenClaims, source: RoleSource<'_>) -> Result<Self, VerifyError> {
        let email = claims
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(VerifyError::MissingEmail)?;

        let roles = match source {
            RoleSource::Client(client_id) => claims.client_roles(client_id),
            RoleSource::Realm => claims.realm_roles(),
        };

        Ok(Self {
            email: email.to_string(),
            subject: claims.sub.clone(),
            roles: roles.to_vec(),
            expires_at: claims.exp,
        })
    }

    /// Exact, case-sensitive role match.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
