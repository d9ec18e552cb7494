//! Entity definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::field::FieldDef;
use super::relationship::truncate_identifier;
use super::types::ScalarType;

/// An entity definition (table schema).
///
/// The identity column and the audit/soft-delete columns are implicit on
/// every entity; `fields` lists only the declared business fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within the metadata bundle).
    pub name: String,
    /// Declared field definitions.
    pub fields: Vec<FieldDef>,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field to the entity.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add multiple fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Get a field by name.
    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get all indexed fields.
    pub fn indexed_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.indexed)
    }

    /// The physical table name backing this entity.
    pub fn table_name(&self) -> String {
        truncate_identifier(&self.name.to_lowercase())
    }

    /// Map of declared field names to scalar types, for row decoding.
    pub(crate) fn field_types(&self) -> BTreeMap<String, ScalarType> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.field_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_builder() {
        let entity = EntityDef::new("Movie")
            .with_field(FieldDef::new("title", ScalarType::Text))
            .with_field(FieldDef::optional("year", ScalarType::Int));

        assert_eq!(entity.name, "Movie");
        assert_eq!(entity.fields.len(), 2);
        assert!(entity.get_field("title").is_some());
        assert!(entity.get_field("nonexistent").is_none());
    }

    #[test]
    fn test_table_name_lowercased() {
        let entity = EntityDef::new("Movie");
        assert_eq!(entity.table_name(), "movie");
    }

    #[test]
    fn test_indexed_fields() {
        let entity = EntityDef::new("Movie")
            .with_field(FieldDef::new("title", ScalarType::Text).with_index())
            .with_field(FieldDef::new("year", ScalarType::Int));

        let indexed: Vec<_> = entity.indexed_fields().collect();
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[0].name, "title");
    }
}
