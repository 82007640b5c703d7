//! Gateway error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Bodies use the flat `{"error": <kind>, "message": <text>}` shape. Messages
//! returned to clients are generic; details are logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gateway error type.
///
/// Maps to HTTP status codes:
/// - Unauthenticated: 401 Unauthorized
/// - PermissionDenied: 403 Forbidden
/// - Validation: 400 Bad Request
/// - NotFound: 404 Not Found
/// - PayloadTooLarge: 413 Payload Too Large
/// - ForwardUnreachable: 502 Bad Gateway
/// - ForwardTimeout: 504 Gateway Timeout
/// - Database, Crypto, KeyPersistence, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Permission denied: route mask {required}, principal mask {provided}")]
    PermissionDenied { required: u32, provided: u32 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: limit {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Key persistence failed: {0}")]
    KeyPersistence(String),

    #[error("Upstream timed out: {0}")]
    ForwardTimeout(String),

    #[error("Upstream unreachable: {0}")]
    ForwardUnreachable(String),

    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Unauthenticated => 401,
            GatewayError::PermissionDenied { .. } => 403,
            GatewayError::Validation(_) => 400,
            GatewayError::NotFound(_) => 404,
            GatewayError::PayloadTooLarge { .. } => 413,
            GatewayError::ForwardUnreachable(_) => 502,
            GatewayError::ForwardTimeout(_) => 504,
            GatewayError::Database(_)
            | GatewayError::Crypto(_)
            | GatewayError::KeyPersistence(_)
            | GatewayError::Internal => 500,
        }
    }
}

/// Error body returned for gateway-originated failures.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            GatewayError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                "Please login".to_string(),
            ),
            GatewayError::PermissionDenied { .. } => {
                (StatusCode::FORBIDDEN, "Forbidden", "Access denied".to_string())
            }
            GatewayError::Validation(reason) => {
                (StatusCode::BAD_REQUEST, "BadRequest", reason.clone())
            }
            GatewayError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NotFound", resource.clone())
            }
            GatewayError::PayloadTooLarge { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PayloadTooLarge",
                format!("Request body exceeds {} bytes", limit),
            ),
            GatewayError::ForwardUnreachable(target) => {
                tracing::warn!(target: "gw.proxy", upstream = %target, "Upstream unreachable");
                (
                    StatusCode::BAD_GATEWAY,
                    "BadGateway",
                    "The upstream service is unavailable".to_string(),
                )
            }
            GatewayError::ForwardTimeout(target) => {
                tracing::warn!(target: "gw.proxy", upstream = %target, "Upstream timed out");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "GatewayTimeout",
                    "The upstream service did not respond in time".to_string(),
                )
            }
            GatewayError::Database(err) => {
                tracing::error!(target: "gw.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError",
                    "An internal database error occurred".to_string(),
                )
            }
            GatewayError::Crypto(err) => {
                tracing::error!(target: "gw.crypto", error = %err, "Cryptographic operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError",
                    "An internal cryptographic error occurred".to_string(),
                )
            }
            GatewayError::KeyPersistence(err) => {
                tracing::error!(target: "gw.keys", error = %err, "Signing key persistence failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError",
                    "Signing key could not be persisted".to_string(),
                )
            }
            GatewayError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError",
                "An internal error occurred".to_string(),
            ),
        };

        let body = ErrorBody {
            error: kind.to_string(),
            message,
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"gateway\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        GatewayError::Database(err.to_string())
    }
}
