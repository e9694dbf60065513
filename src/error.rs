use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Kind label attached to every error response.
///
/// The instrumentation middleware reads it back from the response extensions
/// to key the error counter, since by then the `AppError` itself is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorKind(pub &'static str);

impl ErrorKind {
    pub const PANIC: ErrorKind = ErrorKind("Panic");
    pub const CANCELLED: ErrorKind = ErrorKind("Cancelled");
}

/// Gateway error type
///
/// Auth and validation failures are produced locally and never reach a backend.
/// Backend failures are relayed as-is, with the backend's status and body.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Authentication =====
    #[error("Missing or malformed bearer token")]
    TokenMissing,

    #[error("Token verification failed: {0}")]
    TokenInvalid(String),

    #[error("Verified identity carries no user id")]
    MissingUserId,

    // ===== Client input =====
    #[error("{0}")]
    Validation(String),

    #[error("Malformed multipart body: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    // ===== Backend =====
    #[error("Backend responded with {status}")]
    Backend {
        status: StatusCode,
        content_type: Option<HeaderValue>,
        body: Bytes,
    },

    #[error("Backend request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Backend {0} did not respond in time")]
    UpstreamTimeout(String),

    #[error("Download stream failed: {0}")]
    Stream(String),

    // ===== Internal =====
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::TokenMissing | AppError::TokenInvalid(_) => StatusCode::UNAUTHORIZED,
            AppError::MissingUserId => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Multipart(e) => e.status(),
            AppError::Backend { status, .. } => *status,
            AppError::Upstream(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            AppError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream(_) | AppError::Stream(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a user-friendly error message (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::TokenMissing => "Missing or malformed bearer token".to_string(),
            AppError::TokenInvalid(_) => "Invalid or expired token".to_string(),
            AppError::MissingUserId => "Token does not identify a user".to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Multipart(e) => e.body_text(),
            AppError::Backend { status, .. } => status
                .canonical_reason()
                .unwrap_or("Backend error")
                .to_string(),
            AppError::Upstream(e) if e.is_timeout() => "Backend service timed out".to_string(),
            AppError::UpstreamTimeout(_) => "Backend service timed out".to_string(),
            AppError::Upstream(_) => "Backend service unavailable".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::TokenMissing => "TOKEN_MISSING",
            AppError::TokenInvalid(_) => "TOKEN_INVALID",
            AppError::MissingUserId => "USER_ID_MISSING",
            AppError::Validation(_) | AppError::Multipart(_) => "VALIDATION_ERROR",
            AppError::Backend { .. } => "BACKEND_ERROR",
            AppError::Upstream(e) if e.is_timeout() => "UPSTREAM_TIMEOUT",
            AppError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Stream(_) => "STREAM_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Error kind label for the error counter
    pub fn kind(&self) -> ErrorKind {
        ErrorKind(match self {
            AppError::TokenMissing => "TokenMissing",
            AppError::TokenInvalid(_) => "TokenInvalid",
            AppError::MissingUserId => "MissingUserId",
            AppError::Validation(_) | AppError::Multipart(_) => "ValidationError",
            AppError::Backend { .. } => "BackendError",
            AppError::Upstream(_) | AppError::UpstreamTimeout(_) => "UpstreamError",
            AppError::Stream(_) => "StreamError",
            AppError::Internal(_) => "InternalError",
        })
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let status = self.status_code();
        let code = self.error_code();

        if status.is_server_error() {
            tracing::error!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                error = %self,
                error_code = %code,
                "Authentication failed"
            );
        } else {
            tracing::debug!(
                error = %self,
                error_code = %code,
                status = %status.as_u16(),
                "Client error occurred"
            );
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let kind = self.kind();
        let status = self.status_code();

        let mut response = match self {
            // Relay the backend's own diagnostic body untouched
            AppError::Backend {
                status,
                content_type,
                body,
            } => {
                let mut response = (status, body).into_response();
                match content_type {
                    Some(ct) => {
                        response.headers_mut().insert(header::CONTENT_TYPE, ct);
                    }
                    None => {
                        response.headers_mut().remove(header::CONTENT_TYPE);
                    }
                }
                response
            }
            other => {
                let body = json!({
                    "error": other.user_message(),
                    "error_code": other.error_code(),
                    "status": status.as_u16(),
                });
                (status, axum::Json(body)).into_response()
            }
        };

        response.extensions_mut().insert(kind);
        response
    }
}
