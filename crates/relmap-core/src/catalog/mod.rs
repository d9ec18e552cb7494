//! Typed metadata catalog.
//!
//! Entity and relationship descriptors are parsed into this validated
//! in-memory representation at startup. The relationship engine's column
//! naming and the schema synthesizer's DDL are both driven from it, so the
//! two can never disagree.

mod entity;
mod field;
mod metadata;
mod relationship;
mod types;

pub use entity::EntityDef;
pub use field::FieldDef;
pub use metadata::{is_valid_name, Metadata};
pub use relationship::{
    truncate_identifier, Cardinality, CascadeAction, RelationshipDef, RelationshipKind,
    MAX_IDENTIFIER_LEN,
};
pub use types::ScalarType;
