/**
 * Application Error Types
 *
 * This module defines the error taxonomy used across the server. Every
 * handler returns `Result<_, AppError>`; subsystem errors convert into it
 * with `?`.
 *
 * # Policy
 *
 * - Validation and business errors surface to the HTTP caller with a
 *   machine-readable code.
 * - Broadcast, cache, and rate-limit errors are swallowed after logging at
 *   their call sites and never reach this type from a request path.
 * - Upstream-transient failures (store unreachable, DB timeout) map to 503.
 */

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that can surface from a request or job execution path
#[derive(Debug, Error)]
pub enum AppError {
    /// Input failed validation; carries the offending field path
    #[error("validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    /// The addressed resource does not exist
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// A uniqueness or state conflict
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Shared store (Redis) failure
    #[error("store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Outbound HTTP failure
    #[error("upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    /// JSON encoding/decoding failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else; logged with detail, surfaced without internals
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a validation error for a specific field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error for a resource kind (and optionally an id)
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The HTTP status code this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Database(sqlx::Error::PoolTimedOut) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Store(_) | Self::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Database(e) if is_unique_violation(e) => "conflict",
            Self::Database(_) => "database_error",
            Self::Store(_) => "store_unavailable",
            Self::Upstream(_) => "upstream_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal { .. } => "internal_error",
        }
    }
}

/// True when a sqlx error is a Postgres unique-constraint violation (23505)
fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_422() {
        let err = AppError::validation("email", "must not be empty");
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = AppError::not_found("users/42");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let err = AppError::conflict("email already registered");
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }
}
