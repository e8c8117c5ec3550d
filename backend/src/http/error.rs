//! HTTP error handling and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, ConfigError, ErrorContext, ValidationError};

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

fn with_context(error: ApiError, context: &ErrorContext) -> ApiError {
    if context.is_empty() {
        error
    } else {
        error.with_details(context.to_string())
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Resource not found
    NotFound(String),
    /// Invalid request (validation error)
    BadRequest(String),
    /// Error raised by the service layer
    Access(AccessError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg))
            }
            AppError::Access(e) => match e {
                AccessError::Validation(e) => (
                    StatusCode::BAD_REQUEST,
                    with_context(ApiError::new("VALIDATION_ERROR", e.message), &e.context),
                ),
                AccessError::Config(e) => (
                    StatusCode::BAD_REQUEST,
                    with_context(ApiError::new("CONFIG_ERROR", e.message), &e.context),
                ),
                AccessError::NotFound { message, .. } => {
                    (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", message))
                }
                AccessError::Provider(e) => (
                    StatusCode::BAD_GATEWAY,
                    ApiError::new("ROUTING_ERROR", e.to_string()),
                ),
            },
        };

        (status, Json(error)).into_response()
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        AppError::Access(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Access(err.into())
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Access(err.into())
    }
}
