// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.
//!
//! The sync engine distinguishes failure classes so callers can
//! pattern-match instead of parsing messages: rate limits defer an
//! account to the next sweep, refresh failures require the user to
//! reconnect, and transient transport errors are retried a bounded
//! number of times.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("No provider connection for user {0}")]
    NotConnected(String),

    #[error("Credential refresh failed: {0}")]
    CredentialRefreshFailed(String),

    #[error("Provider rate limit hit")]
    RateLimited,

    #[error("Provider rejected credentials: {0}")]
    ProviderAuth(String),

    #[error("Transient network error: {0}")]
    Transient(String),

    #[error("Strava API error: {0}")]
    StravaApi(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for errors that a bounded automatic retry may resolve.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NotConnected(user) => (
                StatusCode::NOT_FOUND,
                "not_connected",
                Some(format!("user {} has no provider connection", user)),
            ),
            AppError::CredentialRefreshFailed(msg) => (
                StatusCode::CONFLICT,
                "reconnect_required",
                Some(msg.clone()),
            ),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", None),
            AppError::ProviderAuth(msg) => {
                (StatusCode::BAD_GATEWAY, "provider_auth", Some(msg.clone()))
            }
            AppError::Transient(msg) => {
                (StatusCode::BAD_GATEWAY, "transient_error", Some(msg.clone()))
            }
            AppError::StravaApi(msg) => {
                (StatusCode::BAD_GATEWAY, "strava_error", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
