use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::ConfigError;

/// Failures while turning a raw credential into verified claims.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Missing Authorization header")]
    MissingCredential,
    #[error("Token is not active")]
    Inactive,
    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
    #[error("No signing key found for kid {0:?}")]
    UnknownKey(Option<String>),
    #[error("Email not found in token")]
    MissingEmail,
    #[error("Identity provider unreachable: {0}")]
    Upstream(String),
    #[error("Invalid identity provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum OidcError {
    #[error("Request to identity provider failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Identity provider returned HTTP {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Invalid identity provider response: {0}")]
    InvalidResponse(String),
    #[error("ID token rejected: {0}")]
    IdToken(String),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Record {id} belongs to another user")]
    NotOwner { id: i32 },
    #[error("{0}")]
    Invalid(String),
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No session cookie")]
    Missing,
    #[error("Invalid session cookie: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("Session of {0} bytes does not fit in the session cookies")]
    TooLarge(usize),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Oidc(#[from] OidcError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

/// Error body returned by every JSON endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Error code (e.g. "invalid_token", "forbidden")
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Request-level failure, mapped onto an HTTP status and [`ErrorBody`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    UpstreamUnavailable(String),
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "invalid_token",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::UpstreamUnavailable(_) => "upstream_unavailable",
            ApiError::Internal => "server_error",
        }
    }

    pub fn body(&self) -> ErrorBody {
        let description = match self {
            ApiError::Internal => None,
            other => Some(other.to_string()),
        };
        ErrorBody {
            error: self.code().to_string(),
            error_description: description,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<VerifyError> for ApiError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::MissingCredential => {
                ApiError::Unauthenticated("Missing Authorization header".into())
            }
            VerifyError::MissingEmail => {
                ApiError::Unauthenticated("Email not found in token".into())
            }
            VerifyError::Upstream(reason) => {
                tracing::warn!(%reason, "token verification failed upstream");
                ApiError::Unauthenticated("Invalid or expired token".into())
            }
            other => {
                tracing::debug!(error = %other, "token rejected");
                ApiError::Unauthenticated("Invalid or expired token".into())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::NotOwner { .. } => ApiError::Forbidden("Unauthorized access".into()),
            StoreError::Invalid(msg) => ApiError::BadRequest(msg),
            StoreError::Db(e) => {
                tracing::error!("Database error: {}", e);
                ApiError::Internal
            }
        }
    }
}

impl From<OidcError> for ApiError {
    fn from(err: OidcError) -> Self {
        tracing::error!(error = %err, "identity provider call failed");
        ApiError::UpstreamUnavailable("Identity provider unavailable".into())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Missing => ApiError::Unauthenticated("Login required".into()),
            SessionError::Invalid(e) => {
                tracing::debug!(error = %e, "session cookie rejected");
                ApiError::Unauthenticated("Session expired, please log in again".into())
            }
            SessionError::TooLarge(len) => {
                tracing::error!(len, "session does not fit in cookies");
                ApiError::Internal
            }
        }
    }
}
