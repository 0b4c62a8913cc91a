//! Bearer-token verification and role gating for the resource API.

pub mod claims;
pub mod extractor;
pub mod gate;
pub mod introspection;
pub mod keys;
pub mod verifier;

pub use claims::{Principal, RoleSource, TokenClaims};
pub use extractor::ApiCredential;
pub use gate::{Operation, RoleGate};
pub use verifier::{CredentialVerifier, LocalVerifier, decode_unverified_expiry, strip_bearer};
