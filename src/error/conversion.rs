/**
 * Error Conversion
 *
 * Converts `AppError` into HTTP responses so handlers can return it
 * directly with `?`.
 *
 * # Response Format
 *
 * ```json
 * {
 *   "error": "validation_error",
 *   "message": "validation failed for 'email': must not be empty",
 *   "field": "email"
 * }
 * ```
 *
 * `error` is the stable machine-readable code; `message` is the humanized
 * rendering. Internal errors are logged with full detail but surfaced as a
 * generic message so nothing leaks.
 */

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::types::AppError;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut body = serde_json::json!({
            "error": code,
            "message": message,
        });

        if let AppError::Validation { field, .. } = &self {
            body["field"] = serde_json::Value::String(field.clone());
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_response_carries_field() {
        let response = AppError::validation("limit", "must be <= 1000").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_internal_error_is_opaque() {
        let response = AppError::internal("lock poisoned in channel registry").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
