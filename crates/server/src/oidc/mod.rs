//! OpenID Connect relying party for the browser flow.

pub mod client;
pub mod discovery;
pub mod handlers;
pub mod session;

pub use client::{IdTokenClaims, OidcClient, TokenResponse};
pub use discovery::{ProviderMetadata, discover};
pub use handlers::router;
pub use session::{MaybeSession, SessionCodec, SessionData, WebSession};

/// OpenAPI tag for the login flow endpoints
pub const OIDC_TAG: &str = "Login";
