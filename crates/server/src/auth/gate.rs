use std::collections::HashMap;

use super::claims::{Principal, RoleSource, TokenClaims};
use crate::error::ApiError;

/// Operations on the caller's own resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
}

/// Static role requirement per operation. Exact string match only.
#[derive(Clone, Debug)]
pub struct RoleGate {
    required: HashMap<Operation, String>,
}

impl RoleGate {
    /// Every operation requires the same role.
    pub fn uniform(role: &str) -> Self {
        let required = [
            Operation::Read,
            Operation::Create,
            Operation::Update,
            Operation::Delete,
        ]
        .into_iter()
        .map(|op| (op, role.to_string()))
        .collect();
        Self { required }
    }

    pub fn with_requirement(mut self, operation: Operation, role: &str) -> Self {
        self.required.insert(operation, role.to_string());
        self
    }

    pub fn required_role(&self, operation: Operation) -> Option<&str> {
        self.required.get(&operation).map(String::as_str)
    }

    pub fn check(&self, principal: &Principal, operation: Operation) -> Result<(), ApiError> {
        self.check_roles(&principal.roles, operation).inspect_err(|_| {
            tracing::warn!(email = %principal.email, ?operation, "role check denied")
        })
    }

    /// Role check first, identity second: a token without the role is
    /// forbidden even when it also lacks an email.
    pub fn authorize(
        &self,
        claims: &TokenClaims,
        source: RoleSource<'_>,
        operation: Operation,
    ) -> Result<Principal, ApiError> {
        let roles = match source {
            RoleSource::Client(client_id) => claims.client_roles(client_id),
            RoleSource::Realm => claims.realm_roles(),
        };
        self.check_roles(roles, operation).inspect_err(|_| {
            tracing::warn!(sub = ?claims.sub, ?operation, "role check denied")
        })?;
        Ok(Principal::from_claims(claims, source)?)
    }

    fn check_roles(&self, roles: &[String], operation: Operation) -> Result<(), ApiError> {
        match self.required_role(operation) {
            Some(role) if !roles.iter().any(|r| r == role) => {
                Err(ApiError::Forbidden("Insufficient permissions".into()))
            }
            _ => Ok(()),
        }
    }
}
