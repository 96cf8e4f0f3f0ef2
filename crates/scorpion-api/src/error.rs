//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping internal errors to appropriate HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use scorpion_chat::ChatError;
use scorpion_core::error::ScorpionError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured details about the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// 404 Not Found - resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// 413 Payload Too Large - message or attachment over the limit.
    #[error("payload of {size} exceeds the limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
    /// 422 Unprocessable Entity - valid syntax but semantic validation failure.
    #[error("unprocessable: {0}")]
    UnprocessableEntity(String),
    /// 500 Internal Server Error - unexpected server error.
    #[error("internal: {0}")]
    Internal(String),
    /// 503 Service Unavailable - component not ready.
    #[error("unavailable: {0}")]
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::PayloadTooLarge { size, limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                format!("Payload of {} exceeds the limit of {}", size, limit),
                Some(serde_json::json!({ "size": size, "limit": limit })),
            ),
            ApiError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "unprocessable_entity",
                msg,
                None,
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg,
                None,
            ),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::AttachmentTooLarge { size, limit } => {
                ApiError::PayloadTooLarge { size, limit }
            }
            ChatError::InvalidAttachment(_) => ApiError::UnprocessableEntity(err.to_string()),
            ChatError::VoiceUnsupported => ApiError::ServiceUnavailable(err.to_string()),
            ChatError::BridgeError(_) => ApiError::ServiceUnavailable(err.to_string()),
            ChatError::VoiceError(_) | ChatError::GatewayError(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<ScorpionError> for ApiError {
    fn from(err: ScorpionError) -> Self {
        match err {
            ScorpionError::Config(msg) => ApiError::BadRequest(msg),
            ScorpionError::PayloadTooLarge { size, limit } => {
                ApiError::PayloadTooLarge { size, limit }
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}
