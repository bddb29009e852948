//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jacktrack_core::JackTrackError;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - Another scan or connection owns the radio.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Whether retrying later may succeed.
        retryable: bool,
    },

    /// 424 Failed Dependency - Permissions missing or adapter not started.
    FailedDependency {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<serde_json::Value>,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details (not exposed to client in production).
        details: Option<String>,
    },

    /// 503 Service Unavailable - Bluetooth adapter or link unavailable.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional additional details.
        details: Option<String>,
    },

    /// 504 Gateway Timeout - The peripheral did not answer in time.
    Timeout {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "scan_in_progress",
    "message": "A scan is already in progress. Wait for it to finish before scanning again.",
    "details": {"retryable": true}
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "peripheral_not_found").
    #[schema(example = "peripheral_not_found")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Peripheral not found: 'ZZ:ZZ'.")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::BadRequest { error_code, message } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::NotFound { error_code, message } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::Conflict {
                error_code,
                message,
                retryable,
            } => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: Some(serde_json::json!({ "retryable": retryable })),
                },
            ),

            Self::FailedDependency {
                error_code,
                message,
                details,
            } => (
                StatusCode::FAILED_DEPENDENCY,
                ErrorResponse {
                    error: error_code,
                    message,
                    details,
                },
            ),

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: error_code,
                        message,
                        details: details.map(|d| serde_json::json!(d)),
                    },
                )
            }

            Self::ServiceUnavailable {
                error_code,
                message,
                details,
            } => {
                tracing::warn!(error_code = %error_code, message = %message, "Bluetooth unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse {
                        error: error_code,
                        message,
                        details: details.map(|d| serde_json::json!(d)),
                    },
                )
            }

            Self::Timeout { error_code, message } => (
                StatusCode::GATEWAY_TIMEOUT,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::FailedDependency { message, .. } => {
                write!(f, "Failed Dependency: {message}")
            }
            Self::InternalError { message, .. } => {
                write!(f, "Internal Error: {message}")
            }
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
            Self::Timeout { message, .. } => write!(f, "Timeout: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    /// HTTP status this error responds with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::FailedDependency { .. } => StatusCode::FAILED_DEPENDENCY,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// Convert from jacktrack_core errors.
///
/// The status comes from [`JackTrackError::http_status_code`]; the error code
/// is the core code in lower case.
impl From<JackTrackError> for ApiError {
    fn from(err: JackTrackError) -> Self {
        let error_code = err.error_code().to_ascii_lowercase();
        let message = err.to_string();
        let status = err.http_status_code();
        if status >= 500 {
            error!(category = err.category(), code = %error_code, status, "{message}");
        } else {
            debug!(category = err.category(), code = %error_code, status, "{message}");
        }

        match status {
            400 | 422 => Self::BadRequest {
                error_code,
                message,
            },
            404 => Self::NotFound {
                error_code,
                message,
            },
            409 => Self::Conflict {
                error_code,
                message,
                retryable: err.is_recoverable(),
            },
            424 => {
                let details = match &err {
                    JackTrackError::PermissionDenied(missing) => {
                        Some(serde_json::json!({ "missing": missing }))
                    }
                    _ => None,
                };
                Self::FailedDependency {
                    error_code,
                    message,
                    details,
                }
            }
            503 => Self::ServiceUnavailable {
                error_code,
                message,
                details: None,
            },
            504 => Self::Timeout {
                error_code,
                message,
            },
            _ => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

impl From<jacktrack_core::SessionError> for ApiError {
    fn from(err: jacktrack_core::SessionError) -> Self {
        Self::from(JackTrackError::from(err))
    }
}

impl From<jacktrack_core::RoundError> for ApiError {
    fn from(err: jacktrack_core::RoundError) -> Self {
        Self::from(JackTrackError::from(err))
    }
}

impl From<jacktrack_core::StoreError> for ApiError {
    fn from(err: jacktrack_core::StoreError) -> Self {
        Self::from(JackTrackError::from(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest {
            error_code: "invalid_request_body".to_string(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest {
            error_code: "invalid_query".to_string(),
            message: rejection.body_text(),
        }
    }
}
