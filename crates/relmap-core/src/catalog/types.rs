//! Core type definitions for the catalog.

use serde::{Deserialize, Serialize};

/// Scalar data types supported for record fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 64-bit signed integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// UTF-8 string.
    Text,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
    /// UUID-format string identifier.
    Uuid,
}

impl ScalarType {
    /// The SQLite column type this scalar maps to.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ScalarType::Bool | ScalarType::Int | ScalarType::Timestamp => "INTEGER",
            ScalarType::Float => "REAL",
            ScalarType::Text | ScalarType::Uuid => "TEXT",
        }
    }

    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int | ScalarType::Float | ScalarType::Timestamp
        )
    }

    /// Check if this type is stored as text.
    pub fn is_text_like(&self) -> bool {
        matches!(self, ScalarType::Text | ScalarType::Uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_mapping() {
        assert_eq!(ScalarType::Bool.sql_type(), "INTEGER");
        assert_eq!(ScalarType::Timestamp.sql_type(), "INTEGER");
        assert_eq!(ScalarType::Float.sql_type(), "REAL");
        assert_eq!(ScalarType::Uuid.sql_type(), "TEXT");
    }

    #[test]
    fn test_classification() {
        assert!(ScalarType::Int.is_numeric());
        assert!(!ScalarType::Text.is_numeric());
        assert!(ScalarType::Uuid.is_text_like());
    }
}
