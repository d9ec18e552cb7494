//! Relationship definitions between entities.

use serde::{Deserialize, Serialize};

use super::field::FieldDef;

/// Maximum length of a generated database identifier.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Truncate a generated identifier to the database limit.
///
/// Truncation is a plain prefix, so regenerating from the same metadata
/// always yields the same name.
pub fn truncate_identifier(name: &str) -> String {
    if name.len() > MAX_IDENTIFIER_LEN {
        name[..MAX_IDENTIFIER_LEN].to_string()
    } else {
        name.to_string()
    }
}

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    /// One-to-one relationship (each participant has at most one partner).
    OneToOne,
    /// One-to-many relationship (explicit one/many roles).
    OneToMany,
    /// Many-to-many relationship.
    ManyToMany,
}

/// Policy applied to dependent relationship rows when a referenced entity
/// is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CascadeAction {
    /// Refuse deletion while active relationship rows exist.
    Restrict,
    /// Delete dependents: related entities for OneToOne and the "one" side
    /// of OneToMany; join rows only for ManyToMany.
    Cascade,
    /// Soft-delete every active relationship row, leaving entities untouched.
    SoftDelete,
    /// Declared but without defined behavior; handled as a logged no-op.
    SetDefault,
}

/// Participants of a relationship, by cardinality.
///
/// Column and table naming is derived from the participants here, and the
/// schema synthesizer consumes the same derivation, so the engine and the
/// physical schema always agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    /// One-to-one between two entity types.
    OneToOne {
        /// First participant entity name.
        side_a: String,
        /// Second participant entity name.
        side_b: String,
    },
    /// One-to-many with explicit roles.
    OneToMany {
        /// Entity name on the "one" side.
        one: String,
        /// Entity name on the "many" side.
        many: String,
    },
    /// Many-to-many between two entity types.
    ManyToMany {
        /// First participant entity name.
        side_a: String,
        /// Second participant entity name.
        side_b: String,
    },
}

impl RelationshipKind {
    /// The cardinality of this kind.
    pub fn cardinality(&self) -> Cardinality {
        match self {
            RelationshipKind::OneToOne { .. } => Cardinality::OneToOne,
            RelationshipKind::OneToMany { .. } => Cardinality::OneToMany,
            RelationshipKind::ManyToMany { .. } => Cardinality::ManyToMany,
        }
    }

    /// The two participant entity names, in declaration order.
    ///
    /// For OneToMany the order is (one, many).
    pub fn participants(&self) -> (&str, &str) {
        match self {
            RelationshipKind::OneToOne { side_a, side_b }
            | RelationshipKind::ManyToMany { side_a, side_b } => (side_a, side_b),
            RelationshipKind::OneToMany { one, many } => (one, many),
        }
    }

    /// The generated join-table name, truncated to the identifier limit.
    pub fn table_name(&self) -> String {
        let name = match self {
            RelationshipKind::OneToOne { side_a, side_b } => format!(
                "rel_1_{}_1_{}",
                side_a.to_lowercase(),
                side_b.to_lowercase()
            ),
            RelationshipKind::OneToMany { one, many } => {
                format!("rel_1_{}_M_{}", one.to_lowercase(), many.to_lowercase())
            }
            RelationshipKind::ManyToMany { side_a, side_b } => format!(
                "rel_N_{}_M_{}",
                side_a.to_lowercase(),
                side_b.to_lowercase()
            ),
        };
        truncate_identifier(&name)
    }

    /// The two identity column names, in participant order.
    pub fn columns(&self) -> (String, String) {
        match self {
            RelationshipKind::OneToOne { side_a, side_b }
            | RelationshipKind::ManyToMany { side_a, side_b } => (
                format!("{}_id", side_a.to_lowercase()),
                format!("{}_id", side_b.to_lowercase()),
            ),
            RelationshipKind::OneToMany { one, many } => (
                format!("one_{}_id", one.to_lowercase()),
                format!("many_{}_id", many.to_lowercase()),
            ),
        }
    }

    /// The identity column holding ids of the given participant entity.
    pub fn column_for(&self, entity: &str) -> Option<String> {
        let (a, b) = self.participants();
        let (col_a, col_b) = self.columns();
        if entity == a {
            Some(col_a)
        } else if entity == b {
            Some(col_b)
        } else {
            None
        }
    }

    /// Resolve the other participant, from metadata alone.
    pub fn partner_of(&self, entity: &str) -> Option<&str> {
        let (a, b) = self.participants();
        if entity == a {
            Some(b)
        } else if entity == b {
            Some(a)
        } else {
            None
        }
    }

    /// Check whether the given entity participates in this relationship.
    pub fn involves(&self, entity: &str) -> bool {
        let (a, b) = self.participants();
        entity == a || entity == b
    }
}

/// A relationship definition between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    /// Relationship name (unique within the metadata bundle).
    pub name: String,
    /// Cardinality and participants.
    pub kind: RelationshipKind,
    /// Extra fields stored on each relationship row.
    pub extra_fields: Vec<FieldDef>,
    /// Default cascade action when a participant record is deleted.
    pub on_delete: CascadeAction,
}

impl RelationshipDef {
    /// Create a one-to-one relationship.
    pub fn one_to_one(
        name: impl Into<String>,
        side_a: impl Into<String>,
        side_b: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::OneToOne {
                side_a: side_a.into(),
                side_b: side_b.into(),
            },
            extra_fields: Vec::new(),
            on_delete: CascadeAction::Restrict,
        }
    }

    /// Create a one-to-many relationship.
    pub fn one_to_many(
        name: impl Into<String>,
        one: impl Into<String>,
        many: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::OneToMany {
                one: one.into(),
                many: many.into(),
            },
            extra_fields: Vec::new(),
            on_delete: CascadeAction::Restrict,
        }
    }

    /// Create a many-to-many relationship.
    pub fn many_to_many(
        name: impl Into<String>,
        side_a: impl Into<String>,
        side_b: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::ManyToMany {
                side_a: side_a.into(),
                side_b: side_b.into(),
            },
            extra_fields: Vec::new(),
            on_delete: CascadeAction::Cascade,
        }
    }

    /// Set the default cascade action.
    pub fn with_on_delete(mut self, on_delete: CascadeAction) -> Self {
        self.on_delete = on_delete;
        self
    }

    /// Add an extra field stored on each relationship row.
    pub fn with_extra_field(mut self, field: FieldDef) -> Self {
        self.extra_fields.push(field);
        self
    }

    /// The cardinality of this relationship.
    pub fn cardinality(&self) -> Cardinality {
        self.kind.cardinality()
    }

    /// The generated join-table name.
    pub fn table_name(&self) -> String {
        self.kind.table_name()
    }

    /// The two identity column names, in participant order.
    pub fn columns(&self) -> (String, String) {
        self.kind.columns()
    }

    /// The identity column holding ids of the given participant entity.
    pub fn column_for(&self, entity: &str) -> Option<String> {
        self.kind.column_for(entity)
    }

    /// Resolve the other participant, from metadata alone.
    pub fn partner_of(&self, entity: &str) -> Option<&str> {
        self.kind.partner_of(entity)
    }

    /// Check whether the given entity participates in this relationship.
    pub fn involves(&self, entity: &str) -> bool {
        self.kind.involves(entity)
    }

    /// Get an extra field by name.
    pub fn get_extra_field(&self, name: &str) -> Option<&FieldDef> {
        self.extra_fields.iter().find(|f| f.name == name)
    }

    /// The request field through which a record of `entity` selects its
    /// partner, for cardinalities where the partner is single-valued.
    ///
    /// OneToOne records select their partner from either side; OneToMany
    /// records only from the "many" side. ManyToMany has no single-valued
    /// selection field.
    pub fn selection_field(&self, entity: &str) -> Option<String> {
        match &self.kind {
            RelationshipKind::OneToOne { .. } => self
                .kind
                .partner_of(entity)
                .map(|partner| format!("{}_id", partner.to_lowercase())),
            RelationshipKind::OneToMany { one, many } if entity == many => {
                Some(format!("{}_id", one.to_lowercase()))
            }
            _ => None,
        }
    }
}
