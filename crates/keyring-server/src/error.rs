//! API error types and handling.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use custody_core::Error as CoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// API error type.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Custody RPC proxy is not configured")]
    ProxyNotConfigured,

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Invalid JSON: {0}")]
    JsonRejection(String),
}

impl ApiError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unsupported(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::ProxyNotConfigured => StatusCode::PRECONDITION_FAILED,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::JsonRejection(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Get the error code string.
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unsupported(_) => "UNSUPPORTED",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::ProxyNotConfigured => "PROXY_NOT_CONFIGURED",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::JsonRejection(_) => "INVALID_JSON",
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        let message = error.to_string();
        match error {
            CoreError::Validation(_) | CoreError::TypedData(_) => ApiError::Validation(message),
            CoreError::UnsupportedMethod(_) | CoreError::UnsupportedTransactionType(_) => {
                ApiError::Unsupported(message)
            }
            CoreError::AccountNotFound(_) | CoreError::RequestNotFound(_) => {
                ApiError::NotFound(message)
            }
            CoreError::RequestAlreadyFinalized(_) => ApiError::Conflict(message),
            CoreError::MissingCredential(_) | CoreError::RefreshFailed { .. } => {
                ApiError::Unauthorized(message)
            }
            CoreError::ProxyNotConfigured => ApiError::ProxyNotConfigured,
            CoreError::Unreachable(_)
            | CoreError::BadStatus(_)
            | CoreError::RemoteError(_)
            | CoreError::Protocol(_) => ApiError::Upstream(message),
            CoreError::InvalidSignatureLength(_)
            | CoreError::SignatureAddressMismatch { .. }
            | CoreError::KeyVault(_)
            | CoreError::Json(_)
            | CoreError::Config { .. }
            | CoreError::Host { .. } => ApiError::Internal(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!(error = %rejection, "JSON parsing failed");
        ApiError::JsonRejection(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(
                error_code = self.error_code(),
                error = %self,
                "Internal server error"
            );
        }

        let body = ErrorResponse::new(self.error_code(), self.to_string());

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_core_error_mapping() {
        let cases = [
            (CoreError::Validation("bad".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (CoreError::UnsupportedMethod("eth_sign".into()), StatusCode::BAD_REQUEST),
            (CoreError::AccountNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (CoreError::RequestAlreadyFinalized(Uuid::nil()), StatusCode::CONFLICT),
            (
                CoreError::RefreshFailed {
                    organization_id: "org".into(),
                },
                StatusCode::UNAUTHORIZED,
            ),
            (CoreError::ProxyNotConfigured, StatusCode::PRECONDITION_FAILED),
            (CoreError::BadStatus(500), StatusCode::BAD_GATEWAY),
            (CoreError::InvalidSignatureLength(3), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status_code(), status);
        }
    }
}
