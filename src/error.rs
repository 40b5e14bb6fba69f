use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::reset::{CarrierError, TokenError};

/// Message returned for every reset-token failure, whatever the cause.
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired reset link";

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    BadRequest(String),
    Conflict(String),
    RateLimited { message: String, retry_after: u64 },
    InvalidToken,
    Hashing(String),
    Transport(String),
    Storage(String),
    Internal(String),
    Database(sqlx::Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not Found: {msg}"),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {msg}"),
            AppError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            AppError::RateLimited { message, .. } => write!(f, "Rate Limited: {message}"),
            AppError::InvalidToken => write!(f, "Invalid Token"),
            AppError::Hashing(msg) => write!(f, "Hashing Error: {msg}"),
            AppError::Transport(msg) => write!(f, "Mail Transport Error: {msg}"),
            AppError::Storage(msg) => write!(f, "Storage Error: {msg}"),
            AppError::Internal(msg) => write!(f, "Internal Error: {msg}"),
            AppError::Database(err) => write!(f, "Database Error: {err}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::RateLimited { message, .. } => (StatusCode::TOO_MANY_REQUESTS, message.clone()),
            AppError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                INVALID_TOKEN_MESSAGE.to_string(),
            ),
            AppError::Hashing(msg) => {
                tracing::error!("Password hashing failed: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Transport(msg) => {
                tracing::error!("Mail delivery failed: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "Could not send email, please try again later".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Object storage failed: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "Could not store avatar, please try again later".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = json!({ "error": message });
        let mut response = (status, axum::Json(body)).into_response();
        if let AppError::RateLimited { retry_after, .. } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => AppError::Internal(format!("Reset token signing: {msg}")),
            other => {
                tracing::debug!("Reset token rejected: {other}");
                AppError::InvalidToken
            }
        }
    }
}

impl From<CarrierError> for AppError {
    fn from(err: CarrierError) -> Self {
        tracing::debug!("Reset carrier rejected: {err}");
        AppError::InvalidToken
    }
}
