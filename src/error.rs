//! Error types for the mongo reader.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each variant carries enough context to produce an actionable message for the
//! client or for the log line written at the interception boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mongodb::error::ErrorKind;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MountError {
    #[error("Invalid value for '{field}': {value:?} ({message})")]
    Validation {
        field: String,
        value: String,
        message: String,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database '{database}' does not exist: {hint}")]
    Configuration { database: String, hint: String },

    #[error("Streaming failed: {message}")]
    Streaming { message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// Server error code, e.g. 2 for BadValue
        code: Option<i32>,
    },

    #[error("Item not found: {resource_id}")]
    NotFound { resource_id: String },

    #[error("Permission denied: {operation} - {reason}")]
    Permission { operation: String, reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MountError {
    /// Create a validation error naming the offending field and value.
    pub fn validation(
        field: impl Into<String>,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create a validation error for a required field that was not supplied.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            value: String::new(),
            message: "field is required".to_string(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a configuration error for a database missing on the server.
    pub fn configuration(database: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Configuration {
            database: database.into(),
            hint: hint.into(),
        }
    }

    /// Create a mid-stream failure.
    pub fn streaming(message: impl Into<String>) -> Self {
        Self::Streaming {
            message: message.into(),
        }
    }

    /// Create a database error with an optional server error code.
    pub fn database(message: impl Into<String>, code: Option<i32>) -> Self {
        Self::Database {
            message: message.into(),
            code,
        }
    }

    /// Create a not found error.
    pub fn not_found(resource_id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_id: resource_id.into(),
        }
    }

    /// Create a permission error.
    pub fn permission(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permission {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Configuration { hint, .. } => Some(hint),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Machine-readable error code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Connection { .. } => "connection_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Streaming { .. } => "streaming_failure",
            Self::Database { .. } => "database_error",
            Self::NotFound { .. } => "not_found",
            Self::Permission { .. } => "permission_denied",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// HTTP status for this error when it can still be reported as a response.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::Configuration { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Permission { .. } => StatusCode::FORBIDDEN,
            Self::Connection { .. } => StatusCode::BAD_GATEWAY,
            Self::Database { .. } | Self::Streaming { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Convert driver errors to MountError.
impl From<mongodb::error::Error> for MountError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::ServerSelection { message, .. } => MountError::connection(
                format!("Server selection failed: {}", message),
                "Check that the MongoDB server is running and reachable",
            ),
            ErrorKind::DnsResolve { message, .. } => MountError::connection(
                format!("DNS resolution failed: {}", message),
                "Check the mount host name",
            ),
            ErrorKind::Io(io_err) => MountError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            ErrorKind::Authentication { message, .. } => MountError::connection(
                format!("Authentication failed: {}", message),
                "Verify the server accepts unauthenticated reads",
            ),
            ErrorKind::InvalidArgument { message, .. } => {
                MountError::internal(format!("Invalid driver argument: {}", message))
            }
            ErrorKind::Command(cmd) => MountError::database(cmd.message.clone(), Some(cmd.code)),
            _ => MountError::database(err.to_string(), None),
        }
    }
}

/// Result type alias for mount operations.
pub type MountResult<T> = Result<T, MountError>;

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

impl IntoResponse for MountError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                suggestion: self.suggestion().map(String::from),
            },
        };
        (status, axum::Json(body)).into_response()
    }
}
