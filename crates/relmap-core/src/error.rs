//! Core error types.

use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Field the failure applies to.
    pub field: String,
    /// Human-readable description of the failure.
    pub message: String,
}

impl FieldViolation {
    /// Create a new field violation.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Backing store error.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Malformed identifying parameter (entity name, id, relationship name).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Unknown entity type, relationship, or absent record.
    #[error("not found: {0}")]
    NotFound(String),

    /// A Restrict cascade found active dependents.
    #[error(
        "cannot delete {entity} record: {count} active row(s) in relationship '{relationship}'"
    )]
    RestrictViolation {
        /// Entity type being deleted.
        entity: String,
        /// Relationship holding the active rows.
        relationship: String,
        /// Number of active rows found.
        count: usize,
    },

    /// Field-level validation failures.
    #[error("validation failed for {} field(s)", violations.len())]
    Validation {
        /// The individual failures.
        violations: Vec<FieldViolation>,
    },

    /// A schema statement failed to apply.
    #[error("schema statement failed: {statement}")]
    Ddl {
        /// The statement that failed.
        statement: String,
        /// Underlying store error.
        #[source]
        source: rusqlite::Error,
    },

    /// Invalid metadata descriptors.
    #[error("invalid metadata: {0}")]
    Metadata(String),
}

impl Error {
    /// Create a bad-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    /// Create a validation error from a violation list.
    pub fn validation(violations: Vec<FieldViolation>) -> Self {
        Error::Validation { violations }
    }
}
