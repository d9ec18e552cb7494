//! Field definitions for entities and relationships.

use serde::{Deserialize, Serialize};

use super::types::ScalarType;

/// A field definition within an entity or relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    pub field_type: ScalarType,
    /// Whether the field is required (non-nullable at the application level).
    pub required: bool,
    /// Whether this field should be indexed.
    pub indexed: bool,
}

impl FieldDef {
    /// Create a new required field.
    pub fn new(name: impl Into<String>, field_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            indexed: false,
        }
    }

    /// Create an optional field (required = false).
    pub fn optional(name: impl Into<String>, field_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            indexed: false,
        }
    }

    /// Mark as indexed.
    pub fn with_index(mut self) -> Self {
        self.indexed = true;
        self
    }
}
