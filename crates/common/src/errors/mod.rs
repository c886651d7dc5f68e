//! Error types for YouBook services
//!
//! Every failure is converted into an HTTP response at the request boundary.
//! The body carries the numeric status and a human-readable message only;
//! clients get no error codes beyond the HTTP status.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Session expired")]
    ExpiredSession,

    // Authorization errors
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("User not found: {id}")]
    UserNotFound { id: String },

    #[error("No entry at sequence {input_count} of book {book_id}")]
    SlotNotFound { book_id: String, input_count: i32 },

    // Conflict errors
    #[error("Sequence slot already taken: {message}")]
    SlotConflict { message: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Transaction error: {message}")]
    Transaction { message: String },

    // External service errors
    #[error("Transformer service error: {message}")]
    TransformerError { message: String },

    #[error("Transformer timeout after {timeout_ms}ms")]
    TransformerTimeout { timeout_ms: u64 },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFormat { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. } | AppError::ExpiredSession => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound { .. }
            | AppError::UserNotFound { .. }
            | AppError::SlotNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::SlotConflict { .. } => StatusCode::CONFLICT,

            // 500 Internal Server Error, upstream failures included
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Transaction { .. }
            | AppError::TransformerError { .. }
            | AppError::TransformerTimeout { .. }
            | AppError::HttpClient(_)
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// True when the underlying database error is a primary-key/unique violation
    pub fn is_unique_violation(&self) -> bool {
        let AppError::Database(err) = self else {
            return false;
        };
        if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
            return true;
        }
        // older SQLite builds report primary-key conflicts without the extended code
        let message = err.to_string();
        message.contains("UNIQUE constraint failed")
            || message.contains("duplicate key value violates unique constraint")
    }

    /// True for failures of the generative-text service
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AppError::TransformerError { .. }
                | AppError::TransformerTimeout { .. }
                | AppError::HttpClient(_)
        )
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            status: status.as_u16(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::ConnectionAcquire(e) => AppError::DatabaseConnection {
                message: e.to_string(),
            },
            other => AppError::Database(other),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

/// Unreadable, mistyped or non-JSON bodies are all client errors
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidFormat {
            message: rejection.body_text(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}
