use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Outcome errors of the request registry.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The supplied identifier is not a well-formed request id.
    #[error("invalid request ID format")]
    BadId,

    /// No live entry: never existed, already decided, or already purged.
    #[error("request not found")]
    NotFound,

    /// The entry aged past the request timeout and has been removed.
    #[error("request has expired")]
    Expired,

    /// The entry is live but still awaiting a decision.
    #[error("request not approved yet")]
    NotApproved,
}

/// Why an authorization gate turned a caller away.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization header is required")]
    MissingCredential,

    #[error("invalid authorization key")]
    InvalidCredential,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("invalid request body")]
    InvalidBody,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::Registry(RegistryError::BadId) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_request_id",
                self.to_string(),
            ),
            AppError::Registry(RegistryError::NotFound) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "request_not_found",
                self.to_string(),
            ),
            AppError::Registry(RegistryError::Expired) => (
                StatusCode::GONE,
                "expired_error",
                "request_expired",
                self.to_string(),
            ),
            AppError::Registry(RegistryError::NotApproved) => (
                StatusCode::FORBIDDEN,
                "permission_error",
                "request_not_approved",
                self.to_string(),
            ),
            AppError::Unauthorized(AuthError::MissingCredential) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "missing_authorization",
                self.to_string(),
            ),
            AppError::Unauthorized(AuthError::InvalidCredential) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                "invalid_authorization",
                self.to_string(),
            ),
            AppError::InvalidBody => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_body",
                "invalid request".to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        let mut response = (status, body).into_response();

        // A pending request is worth polling again; tell the client when.
        if matches!(self, AppError::Registry(RegistryError::NotApproved)) {
            response.headers_mut().insert(
                "retry-after",
                axum::http::HeaderValue::from_static("5"),
            );
        }

        response
    }
}
