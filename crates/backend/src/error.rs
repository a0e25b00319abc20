//! Unified error handling for the backend API.
//!
//! Component errors (`TokenError`, `OAuthError`, `StoreError`) convert into
//! [`ApiError`], which decides the status code and the JSON body. Browser
//! redirects for the OAuth callback are handled in the callback handler and
//! never pass through here.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use shared_types::ErrorResponse;
use thiserror::Error;

use crate::auth::google::OAuthError;
use crate::auth::jwt::TokenError;
use crate::auth::service::CurrentUserError;
use crate::repository::StoreError;

pub const CREDENTIALS_ERROR: &str = "Could not validate credentials";

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, malformed, expired or otherwise unacceptable token
    #[error("Could not validate credentials")]
    Unauthorized,

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Unique constraint hit
    #[error("{0}")]
    Conflict(String),

    /// Building the provider consent URL failed
    #[error("Failed to generate authorization URL")]
    AuthorizationUrl(#[source] OAuthError),

    #[error(transparent)]
    Store(StoreError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        ApiError::NotFound(resource.into())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Unauthorized => ApiError::Unauthorized,
            TokenError::Signing(e) => ApiError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(email) => {
                ApiError::Conflict(format!("User with email {} already exists", email))
            }
            other => ApiError::Store(other),
        }
    }
}

impl From<CurrentUserError> for ApiError {
    fn from(err: CurrentUserError) -> Self {
        match err {
            CurrentUserError::Unauthorized => ApiError::Unauthorized,
            CurrentUserError::NotFound => ApiError::not_found("User"),
            CurrentUserError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::Unauthorized => {
                let body = Json(ErrorResponse {
                    error: CREDENTIALS_ERROR.to_string(),
                    details: None,
                });
                return (
                    StatusCode::UNAUTHORIZED,
                    [(header::WWW_AUTHENTICATE, "Bearer")],
                    body,
                )
                    .into_response();
            }
            ApiError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, format!("{} not found", resource))
            }
            ApiError::Conflict(msg) => {
                tracing::warn!("Conflict: {}", msg);
                (StatusCode::CONFLICT, msg.clone())
            }
            ApiError::AuthorizationUrl(e) => {
                tracing::error!("Failed to generate Google login URL: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to generate authorization URL".to_string(),
                )
            }
            ApiError::Store(StoreError::ConnectionPool(e)) => {
                tracing::error!("Connection pool error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Database connection unavailable".to_string(),
                )
            }
            ApiError::Store(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database operation failed".to_string(),
                )
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details: None,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
