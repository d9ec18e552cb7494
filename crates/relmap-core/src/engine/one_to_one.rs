//! One-to-one relationship operations.

use std::collections::BTreeMap;

use crate::catalog::RelationshipKind;
use crate::error::Error;
use crate::record::{Record, Value};

use super::RelationshipEngine;

/// One-to-one operations over the base engine.
///
/// Replacement semantics ("each participant has at most one active partner")
/// are already embedded in the base `add` for this cardinality; this variant
/// adds metadata-only partner resolution.
pub struct OneToOneRelationship<'a> {
    base: RelationshipEngine<'a>,
}

impl<'a> OneToOneRelationship<'a> {
    /// Wrap a base engine; fails unless the relationship is one-to-one.
    pub fn new(base: RelationshipEngine<'a>) -> Result<Self, Error> {
        match base.def().kind {
            RelationshipKind::OneToOne { .. } => Ok(Self { base }),
            _ => Err(Error::bad_request(format!(
                "relationship '{}' is not one-to-one",
                base.def().name
            ))),
        }
    }

    /// The underlying engine with the uniform operations.
    pub fn base(&self) -> &RelationshipEngine<'a> {
        &self.base
    }

    /// Alias for `add`; replacement of prior partners is part of `add`.
    pub fn set_relation(
        &self,
        a: &Record,
        b: &Record,
        extras: &BTreeMap<String, Value>,
        actor: &str,
    ) -> Result<bool, Error> {
        self.base.add(a, b, extras, actor)
    }

    /// Resolve the partner entity type from metadata alone, without a row
    /// lookup.
    pub fn other_entity(&self, entity: &str) -> Result<&str, Error> {
        self.base.def().partner_of(entity).ok_or_else(|| {
            Error::bad_request(format!(
                "entity '{}' does not participate in relationship '{}'",
                entity,
                self.base.def().name
            ))
        })
    }

    /// The single active relationship row for the record, if any.
    ///
    /// Capped at one by construction: `add` clears prior partners first.
    pub fn related(&self, record: &Record) -> Result<Option<Record>, Error> {
        Ok(self.base.get_related_records(record)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityDef, FieldDef, Metadata, RelationshipDef, ScalarType};
    use crate::store::Store;
    use crate::synth;

    fn metadata() -> Metadata {
        Metadata::new()
            .with_entity(
                EntityDef::new("User").with_field(FieldDef::new("name", ScalarType::Text)),
            )
            .with_entity(
                EntityDef::new("Profile").with_field(FieldDef::new("bio", ScalarType::Text)),
            )
            .with_relationship(RelationshipDef::one_to_one("user_profile", "User", "Profile"))
    }

    fn setup() -> (Store, Metadata) {
        let store = Store::open_in_memory().unwrap();
        let metadata = metadata();
        synth::sync(&store, &metadata).unwrap();
        (store, metadata)
    }

    fn insert(store: &Store, metadata: &Metadata, entity: &str, field: &str, value: &str) -> Record {
        let def = metadata.get_entity(entity).unwrap();
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), Value::Text(value.to_string()));
        store.insert(def, &fields, "tester").unwrap()
    }

    #[test]
    fn test_requires_one_to_one() {
        let (store, _) = setup();
        let metadata = Metadata::new()
            .with_entity(EntityDef::new("Movie"))
            .with_entity(EntityDef::new("Tag"))
            .with_relationship(RelationshipDef::many_to_many("movie_tags", "Movie", "Tag"));
        let rel = metadata.get_relationship("movie_tags").unwrap();

        let result = OneToOneRelationship::new(RelationshipEngine::new(&store, &metadata, rel));
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_add_replaces_prior_partners() {
        let (store, metadata) = setup();
        let rel = metadata.get_relationship("user_profile").unwrap();
        let engine =
            OneToOneRelationship::new(RelationshipEngine::new(&store, &metadata, rel)).unwrap();

        let alice = insert(&store, &metadata, "User", "name", "Alice");
        let bob = insert(&store, &metadata, "User", "name", "Bob");
        let first = insert(&store, &metadata, "Profile", "bio", "first");
        let second = insert(&store, &metadata, "Profile", "bio", "second");

        assert!(engine.set_relation(&alice, &first, &BTreeMap::new(), "tester").unwrap());
        assert!(engine.base().has(&alice, &first).unwrap());

        // Re-pointing Alice at another profile retires the first link
        assert!(engine.set_relation(&alice, &second, &BTreeMap::new(), "tester").unwrap());
        assert!(engine.base().has(&alice, &second).unwrap());
        assert!(!engine.base().has(&alice, &first).unwrap());
        assert!(engine.related(&first).unwrap().is_none());

        // Stealing the profile retires Alice's link as well
        assert!(engine.set_relation(&bob, &second, &BTreeMap::new(), "tester").unwrap());
        assert!(!engine.base().has(&alice, &second).unwrap());

        // At most one active row per participant, by construction
        assert_eq!(engine.base().get_related_records(&bob).unwrap().len(), 1);
        assert!(engine.base().get_related_records(&alice).unwrap().is_empty());
    }

    #[test]
    fn test_other_entity_from_metadata() {
        let (store, metadata) = setup();
        let rel = metadata.get_relationship("user_profile").unwrap();
        let engine =
            OneToOneRelationship::new(RelationshipEngine::new(&store, &metadata, rel)).unwrap();

        assert_eq!(engine.other_entity("User").unwrap(), "Profile");
        assert_eq!(engine.other_entity("Profile").unwrap(), "User");
        assert!(engine.other_entity("Movie").is_err());
    }

    #[test]
    fn test_cascade_deletes_partner_entity() {
        let (store, metadata) = setup();
        let rel = metadata.get_relationship("user_profile").unwrap();
        let engine =
            OneToOneRelationship::new(RelationshipEngine::new(&store, &metadata, rel)).unwrap();

        let alice = insert(&store, &metadata, "User", "name", "Alice");
        let profile = insert(&store, &metadata, "Profile", "bio", "bio");
        engine.set_relation(&alice, &profile, &BTreeMap::new(), "tester").unwrap();

        engine
            .base()
            .handle_model_deletion(&alice, crate::catalog::CascadeAction::Cascade, "tester")
            .unwrap();

        let profile_def = metadata.get_entity("Profile").unwrap();
        assert!(store.get(profile_def, &profile.id).unwrap().is_none());
        assert!(store.get_any(profile_def, &profile.id).unwrap().unwrap().is_deleted());
        assert!(engine.base().get_related_records(&alice).unwrap().is_empty());
    }
}
