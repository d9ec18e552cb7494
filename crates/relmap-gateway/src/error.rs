//! Error handling for the gateway.

use thiserror::Error;
use tracing::error;

use relmap_core::{Error as CoreError, FieldViolation};

use crate::request::Response;

/// Stable error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed identifying parameters.
    BadRequest,
    /// Unknown entity type, relationship, or absent record.
    NotFound,
    /// A Restrict cascade found active dependents.
    Conflict,
    /// Field-level validation failures.
    Unprocessable,
    /// Unexpected persistence failure.
    Internal,
}

impl ErrorKind {
    /// The response status for this kind.
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Unprocessable => 422,
            ErrorKind::Internal => 500,
        }
    }

    /// The stable code string for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Unprocessable => "UNPROCESSABLE_ENTITY",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Gateway error carrying a stable kind plus a human-readable message.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApiError {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Field-level details for Unprocessable errors.
    pub violations: Vec<FieldViolation>,
}

impl ApiError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            violations: Vec::new(),
        }
    }

    /// Create a bad-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create an unprocessable-entity error from a violation list.
    pub fn unprocessable(violations: Vec<FieldViolation>) -> Self {
        Self {
            kind: ErrorKind::Unprocessable,
            message: format!("validation failed for {} field(s)", violations.len()),
            violations,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Render the error as a response body.
    pub fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "error": {
                "code": self.kind.code(),
                "message": self.message,
            }
        });
        if !self.violations.is_empty() {
            body["error"]["violations"] = serde_json::json!(self.violations);
        }
        Response {
            status: self.kind.status(),
            body,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::BadRequest(message) => ApiError::bad_request(message),
            CoreError::NotFound(message) => ApiError::not_found(message),
            CoreError::Validation { violations } => ApiError::unprocessable(violations),
            restrict @ CoreError::RestrictViolation { .. } => {
                ApiError::conflict(restrict.to_string())
            }
            // Raw store errors are logged with context, never leaked
            internal => {
                error!(error = %internal, "internal persistence failure");
                ApiError::internal("internal persistence failure")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_code() {
        assert_eq!(ErrorKind::BadRequest.status(), 400);
        assert_eq!(ErrorKind::NotFound.status(), 404);
        assert_eq!(ErrorKind::Conflict.status(), 409);
        assert_eq!(ErrorKind::Unprocessable.status(), 422);
        assert_eq!(ErrorKind::Internal.status(), 500);
        assert_eq!(ErrorKind::Conflict.code(), "CONFLICT");
    }

    #[test]
    fn test_core_error_mapping() {
        let err: ApiError = CoreError::not_found("unknown entity type 'x'").into();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err: ApiError = CoreError::RestrictViolation {
            entity: "Movie".to_string(),
            relationship: "movie_quotes".to_string(),
            count: 2,
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(err.message.contains("movie_quotes"));

        let err: ApiError = CoreError::validation(vec![FieldViolation::new("title", "is required")])
            .into();
        assert_eq!(err.kind, ErrorKind::Unprocessable);
        assert_eq!(err.violations.len(), 1);

        let err: ApiError = CoreError::Metadata("broken".to_string()).into();
        assert_eq!(err.kind, ErrorKind::Internal);
        // The original detail is not leaked
        assert!(!err.message.contains("broken"));
    }

    #[test]
    fn test_error_response_shape() {
        let response = ApiError::unprocessable(vec![FieldViolation::new("title", "is required")])
            .into_response();

        assert_eq!(response.status, 422);
        assert_eq!(response.body["error"]["code"], "UNPROCESSABLE_ENTITY");
        assert_eq!(response.body["error"]["violations"][0]["field"], "title");
    }
}
