//! One-to-many relationship operations.

use std::collections::BTreeMap;

use crate::catalog::RelationshipKind;
use crate::error::Error;
use crate::record::{Record, Value};

use super::RelationshipEngine;

/// Extra field holding the explicit sequence position written by
/// [`OneToManyRelationship::add_with_order`].
pub const ORDER_FIELD: &str = "sort_order";

/// One-to-many operations over the base engine.
pub struct OneToManyRelationship<'a> {
    base: RelationshipEngine<'a>,
}

impl<'a> OneToManyRelationship<'a> {
    /// Wrap a base engine; fails unless the relationship is one-to-many.
    pub fn new(base: RelationshipEngine<'a>) -> Result<Self, Error> {
        match base.def().kind {
            RelationshipKind::OneToMany { .. } => Ok(Self { base }),
            _ => Err(Error::bad_request(format!(
                "relationship '{}' is not one-to-many",
                base.def().name
            ))),
        }
    }

    /// The underlying engine with the uniform operations.
    pub fn base(&self) -> &RelationshipEngine<'a> {
        &self.base
    }

    /// Classify a record as the "one" side.
    ///
    /// A record of a type that is neither role is invalid here.
    pub fn is_one_model(&self, record: &Record) -> Result<bool, Error> {
        let (one, many) = self.base.def().kind.participants();
        if record.entity == one {
            Ok(true)
        } else if record.entity == many {
            Ok(false)
        } else {
            Err(Error::bad_request(format!(
                "entity '{}' does not participate in relationship '{}'",
                record.entity,
                self.base.def().name
            )))
        }
    }

    /// Classify a record as the "many" side.
    pub fn is_many_model(&self, record: &Record) -> Result<bool, Error> {
        self.is_one_model(record).map(|one| !one)
    }

    /// All active rows for a record on the "one" side.
    pub fn get_related_from_one(&self, one: &Record) -> Result<Vec<Record>, Error> {
        if !self.is_one_model(one)? {
            return Err(Error::bad_request(format!(
                "record of type '{}' is not the one side of relationship '{}'",
                one.entity,
                self.base.def().name
            )));
        }
        self.base.get_related_records(one)
    }

    /// The at-most-one active row for a record on the "many" side.
    pub fn get_related_from_many(&self, many: &Record) -> Result<Option<Record>, Error> {
        if !self.is_many_model(many)? {
            return Err(Error::bad_request(format!(
                "record of type '{}' is not the many side of relationship '{}'",
                many.entity,
                self.base.def().name
            )));
        }
        Ok(self.base.get_related_records(many)?.into_iter().next())
    }

    /// `add` with an explicit sequence position stored in the
    /// [`ORDER_FIELD`] extra field.
    pub fn add_with_order(
        &self,
        one: &Record,
        many: &Record,
        position: i64,
        actor: &str,
    ) -> Result<bool, Error> {
        let mut extras = BTreeMap::new();
        extras.insert(ORDER_FIELD.to_string(), Value::Int(position));
        self.base.add(one, many, &extras, actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CascadeAction, EntityDef, FieldDef, Metadata, RelationshipDef, ScalarType};
    use crate::store::Store;
    use crate::synth;

    fn metadata() -> Metadata {
        Metadata::new()
            .with_entity(
                EntityDef::new("Movie").with_field(FieldDef::new("title", ScalarType::Text)),
            )
            .with_entity(
                EntityDef::new("Quote").with_field(FieldDef::new("text", ScalarType::Text)),
            )
            .with_relationship(
                RelationshipDef::one_to_many("movie_quotes", "Movie", "Quote")
                    .with_extra_field(FieldDef::optional(ORDER_FIELD, ScalarType::Int)),
            )
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
    fn test_role_classification() {
        let (store, metadata) = setup();
        let rel = metadata.get_relationship("movie_quotes").unwrap();
        let engine =
            OneToManyRelationship::new(RelationshipEngine::new(&store, &metadata, rel)).unwrap();

        let movie = insert(&store, &metadata, "Movie", "title", "Alien");
        let quote = insert(&store, &metadata, "Quote", "text", "In space...");

        assert!(engine.is_one_model(&movie).unwrap());
        assert!(!engine.is_one_model(&quote).unwrap());
        assert!(engine.is_many_model(&quote).unwrap());

        let mut stranger = movie.clone();
        stranger.entity = "Tag".to_string();
        assert!(engine.is_one_model(&stranger).is_err());
    }

    #[test]
    fn test_related_from_each_side() {
        let (store, metadata) = setup();
        let rel = metadata.get_relationship("movie_quotes").unwrap();
        let engine =
            OneToManyRelationship::new(RelationshipEngine::new(&store, &metadata, rel)).unwrap();

        let movie = insert(&store, &metadata, "Movie", "title", "Alien");
        let first = insert(&store, &metadata, "Quote", "text", "first");
        let second = insert(&store, &metadata, "Quote", "text", "second");

        engine.base().add(&movie, &first, &BTreeMap::new(), "tester").unwrap();
        engine.base().add(&movie, &second, &BTreeMap::new(), "tester").unwrap();

        let from_one = engine.get_related_from_one(&movie).unwrap();
        assert_eq!(from_one.len(), 2);

        let from_many = engine.get_related_from_many(&first).unwrap().unwrap();
        assert_eq!(
            from_many.get("one_movie_id").and_then(Value::as_str),
            Some(movie.id.as_str())
        );

        // Role mismatch is an error, not an empty result
        assert!(engine.get_related_from_one(&first).is_err());
        assert!(engine.get_related_from_many(&movie).is_err());
    }

    #[test]
    fn test_add_with_order() {
        let (store, metadata) = setup();
        let rel = metadata.get_relationship("movie_quotes").unwrap();
        let engine =
            OneToManyRelationship::new(RelationshipEngine::new(&store, &metadata, rel)).unwrap();

        let movie = insert(&store, &metadata, "Movie", "title", "Alien");
        let quote = insert(&store, &metadata, "Quote", "text", "first");

        assert!(engine.add_with_order(&movie, &quote, 3, "tester").unwrap());

        let rows = engine.get_related_from_one(&movie).unwrap();
        assert_eq!(rows[0].get(ORDER_FIELD), Some(&Value::Int(3)));
    }

    #[test]
    fn test_cascade_from_one_deletes_many_entities() {
        let (store, metadata) = setup();
        let rel = metadata.get_relationship("movie_quotes").unwrap();
        let engine =
            OneToManyRelationship::new(RelationshipEngine::new(&store, &metadata, rel)).unwrap();

        let movie = insert(&store, &metadata, "Movie", "title", "Alien");
        let first = insert(&store, &metadata, "Quote", "text", "first");
        let second = insert(&store, &metadata, "Quote", "text", "second");
        engine.base().add(&movie, &first, &BTreeMap::new(), "tester").unwrap();
        engine.base().add(&movie, &second, &BTreeMap::new(), "tester").unwrap();

        engine
            .base()
            .handle_model_deletion(&movie, CascadeAction::Cascade, "tester")
            .unwrap();

        let quote_def = metadata.get_entity("Quote").unwrap();
        assert!(store.get(quote_def, &first.id).unwrap().is_none());
        assert!(store.get(quote_def, &second.id).unwrap().is_none());
        assert!(engine.base().get_related_records(&movie).unwrap().is_empty());
    }

    #[test]
    fn test_cascade_from_many_detaches_only_itself() {
        let (store, metadata) = setup();
        let rel = metadata.get_relationship("movie_quotes").unwrap();
        let engine =
            OneToManyRelationship::new(RelationshipEngine::new(&store, &metadata, rel)).unwrap();

        let movie = insert(&store, &metadata, "Movie", "title", "Alien");
        let first = insert(&store, &metadata, "Quote", "text", "first");
        let second = insert(&store, &metadata, "Quote", "text", "second");
        engine.base().add(&movie, &first, &BTreeMap::new(), "tester").unwrap();
        engine.base().add(&movie, &second, &BTreeMap::new(), "tester").unwrap();

        engine
            .base()
            .handle_model_deletion(&first, CascadeAction::Cascade, "tester")
            .unwrap();

        // The movie and the sibling quote are untouched
        let movie_def = metadata.get_entity("Movie").unwrap();
        let quote_def = metadata.get_entity("Quote").unwrap();
        assert!(store.get(movie_def, &movie.id).unwrap().is_some());
        assert!(store.get(quote_def, &second.id).unwrap().is_some());

        let remaining = engine.get_related_from_one(&movie).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(
            remaining[0].get("many_quote_id").and_then(Value::as_str),
            Some(second.id.as_str())
        );
    }
}
