//! The metadata bundle: every entity and relationship descriptor, validated.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::entity::EntityDef;
use super::relationship::RelationshipDef;
use crate::error::Error;
use crate::record::is_reserved_column;

/// Check whether a name is usable as an entity, field, or relationship name.
///
/// Names must start with an ASCII letter and contain only ASCII letters,
/// digits, and underscores. Generated table and column names are built from
/// these, so the pattern doubles as SQL-identifier safety.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The full set of entity and relationship descriptors.
///
/// Injected read-only at startup; `validate` must pass before anything else
/// consumes the bundle (fail fast on invalid descriptors).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Entity definitions keyed by name.
    pub entities: HashMap<String, EntityDef>,
    /// Relationship definitions keyed by name.
    pub relationships: HashMap<String, RelationshipDef>,
}

impl Metadata {
    /// Create an empty metadata bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Add a relationship.
    pub fn with_relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships
            .insert(relationship.name.clone(), relationship);
        self
    }

    /// Get an entity by exact name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Get an entity by exact name, or a NotFound error.
    pub fn entity(&self, name: &str) -> Result<&EntityDef, Error> {
        self.get_entity(name)
            .ok_or_else(|| Error::not_found(format!("unknown entity type '{}'", name)))
    }

    /// Find an entity by case-insensitive name (route segments are lowercase).
    pub fn find_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities
            .values()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Get a relationship by exact name.
    pub fn get_relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.get(name)
    }

    /// Get a relationship by exact name, or a NotFound error.
    pub fn relationship(&self, name: &str) -> Result<&RelationshipDef, Error> {
        self.get_relationship(name)
            .ok_or_else(|| Error::not_found(format!("unknown relationship '{}'", name)))
    }

    /// Find a relationship by case-insensitive name.
    pub fn find_relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships
            .values()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// All relationships the given entity participates in.
    pub fn relationships_for(&self, entity: &str) -> Vec<&RelationshipDef> {
        let mut relationships: Vec<&RelationshipDef> = self
            .relationships
            .values()
            .filter(|r| r.involves(entity))
            .collect();
        relationships.sort_by(|a, b| a.name.cmp(&b.name));
        relationships
    }

    /// Relationship-selection fields for the given entity.
    ///
    /// Returns `(field name, relationship)` pairs; a request body field with
    /// one of these names selects the record's partner in that relationship.
    pub fn selection_fields(&self, entity: &str) -> Vec<(String, &RelationshipDef)> {
        let mut fields: Vec<(String, &RelationshipDef)> = self
            .relationships
            .values()
            .filter_map(|r| r.selection_field(entity).map(|f| (f, r)))
            .collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        fields
    }

    /// Validate the whole bundle, failing fast on the first problem.
    pub fn validate(&self) -> Result<(), Error> {
        for entity in self.entities.values() {
            self.validate_entity(entity)?;
        }
        for relationship in self.relationships.values() {
            self.validate_relationship(relationship)?;
        }
        self.validate_table_names()?;
        self.validate_selection_fields()?;
        Ok(())
    }

    fn validate_entity(&self, entity: &EntityDef) -> Result<(), Error> {
        if !is_valid_name(&entity.name) {
            return Err(Error::Metadata(format!(
                "invalid entity name '{}'",
                entity.name
            )));
        }

        let mut seen = HashSet::new();
        for field in &entity.fields {
            if !is_valid_name(&field.name) {
                return Err(Error::Metadata(format!(
                    "invalid field name '{}' on entity '{}'",
                    field.name, entity.name
                )));
            }
            if is_reserved_column(&field.name) {
                return Err(Error::Metadata(format!(
                    "field '{}' on entity '{}' uses a reserved column name",
                    field.name, entity.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Metadata(format!(
                    "duplicate field '{}' on entity '{}'",
                    field.name, entity.name
                )));
            }
        }
        Ok(())
    }

    fn validate_relationship(&self, relationship: &RelationshipDef) -> Result<(), Error> {
        if !is_valid_name(&relationship.name) {
            return Err(Error::Metadata(format!(
                "invalid relationship name '{}'",
                relationship.name
            )));
        }

        let (a, b) = relationship.kind.participants();
        for participant in [a, b] {
            if self.get_entity(participant).is_none() {
                return Err(Error::Metadata(format!(
                    "relationship '{}' references unknown entity '{}'",
                    relationship.name, participant
                )));
            }
        }
        if a.eq_ignore_ascii_case(b) {
            return Err(Error::Metadata(format!(
                "relationship '{}' has identical participants; the generated columns would collide",
                relationship.name
            )));
        }

        let (col_a, col_b) = relationship.columns();
        let mut seen = HashSet::new();
        for field in &relationship.extra_fields {
            if !is_valid_name(&field.name) {
                return Err(Error::Metadata(format!(
                    "invalid extra field name '{}' on relationship '{}'",
                    field.name, relationship.name
                )));
            }
            if is_reserved_column(&field.name) || field.name == col_a || field.name == col_b {
                return Err(Error::Metadata(format!(
                    "extra field '{}' on relationship '{}' collides with a generated column",
                    field.name, relationship.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Metadata(format!(
                    "duplicate extra field '{}' on relationship '{}'",
                    field.name, relationship.name
                )));
            }
        }
        Ok(())
    }

    /// Truncation to the identifier limit is lossy; two distinct descriptors
    /// must not end up sharing a physical table.
    fn validate_table_names(&self) -> Result<(), Error> {
        let mut tables: HashMap<String, String> = HashMap::new();
        for entity in self.entities.values() {
            if let Some(previous) = tables.insert(entity.table_name(), entity.name.clone()) {
                return Err(Error::Metadata(format!(
                    "entities '{}' and '{}' map to the same table '{}'",
                    previous,
                    entity.name,
                    entity.table_name()
                )));
            }
        }
        for relationship in self.relationships.values() {
            if let Some(previous) =
                tables.insert(relationship.table_name(), relationship.name.clone())
            {
                return Err(Error::Metadata(format!(
                    "'{}' and '{}' map to the same table '{}'",
                    previous,
                    relationship.name,
                    relationship.table_name()
                )));
            }
        }
        Ok(())
    }

    /// A declared entity field must not shadow a relationship-selection field,
    /// and two relationships must not derive the same selection field.
    fn validate_selection_fields(&self) -> Result<(), Error> {
        for entity in self.entities.values() {
            let mut seen: HashMap<String, &str> = HashMap::new();
            for (field, relationship) in self.selection_fields(&entity.name) {
                if entity.get_field(&field).is_some() {
                    return Err(Error::Metadata(format!(
                        "field '{}' on entity '{}' shadows the selection field of relationship '{}'",
                        field, entity.name, relationship.name
                    )));
                }
                if let Some(previous) = seen.insert(field.clone(), &relationship.name) {
                    return Err(Error::Metadata(format!(
                        "relationships '{}' and '{}' both derive selection field '{}' for entity '{}'",
                        previous, relationship.name, field, entity.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serialize the bundle to JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Metadata(e.to_string()))
    }

    /// Load and validate a bundle from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let metadata: Metadata =
            serde_json::from_str(json).map_err(|e| Error::Metadata(e.to_string()))?;
        metadata.validate()?;
        Ok(metadata)
    }

}
