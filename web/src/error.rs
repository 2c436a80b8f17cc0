//! Error types for web handlers.
//!
//! [`AppError`] is the REST-side error: a status, a stable code and a
//! user-facing message, rendered as JSON. GraphQL resolvers use
//! [`graphql_error`] instead, which carries the same code in the error's
//! `extensions`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use catalog_core::CatalogError;
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: &'static str) -> Self {
        Self {
            status,
            message,
            code,
        }
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST")
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into(), "UNAUTHORIZED")
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message.into(), "FORBIDDEN")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message.into(), "NOT_FOUND")
    }

    /// Create a 409 Conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message.into(), "CONFLICT")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.into(), "INTERNAL_ERROR")
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, code = self.code, message = %self.message, "Internal server error");
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match &err {
            CatalogError::NotFound { .. } => Self::not_found(err.to_string()),
            CatalogError::Validation(msg) => Self::bad_request(msg),
            CatalogError::Conflict(msg) => Self::conflict(msg),
            CatalogError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage failure");
                Self::internal("An internal error occurred")
            },
        }
    }
}

/// Convert a [`CatalogError`] into a GraphQL error with an `extensions.code`.
///
/// Storage failures are logged and reported with a generic message.
#[must_use]
pub fn graphql_error(err: CatalogError) -> async_graphql::Error {
    let code = err.code();
    let message = match &err {
        CatalogError::Storage(detail) => {
            tracing::error!(error = %detail, "Storage failure");
            "An internal error occurred".to_string()
        },
        _ => err.to_string(),
    };
    coded_error(message, code)
}

/// GraphQL error with `extensions.code` set to `code`.
#[must_use]
pub fn coded_error(message: impl Into<String>, code: &'static str) -> async_graphql::Error {
    use async_graphql::ErrorExtensions;

    async_graphql::Error::new(message).extend_with(|_, ext| ext.set("code", code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn catalog_errors_map_to_statuses() {
        let err = AppError::from(CatalogError::product_not_found(3));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "[NOT_FOUND] Product not found with id: 3");

        let err = AppError::from(CatalogError::Storage("socket closed".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("socket closed"));
    }

    #[test]
    fn graphql_errors_carry_codes() {
        let err = graphql_error(CatalogError::category_not_found(9));
        assert_eq!(err.message, "Category not found with id: 9");
        let code = err.extensions.as_ref().and_then(|ext| ext.get("code")).cloned();
        assert_eq!(code, Some(async_graphql::Value::from("NOT_FOUND")));
    }
}
