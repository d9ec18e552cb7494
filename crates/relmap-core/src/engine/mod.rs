//! Relationship engine.
//!
//! One polymorphic base over the three cardinality variants. Every operation
//! works on pairs of records and persists join-table rows in the tables the
//! schema synthesizer derives from the same metadata, so column naming never
//! needs coordination. Kind-specific behavior is selected by pattern match
//! on [`RelationshipKind`], not by virtual dispatch.

mod many_to_many;
mod one_to_many;
mod one_to_one;

pub use many_to_many::{BatchOutcome, ManyToManyRelationship, Pagination, RelatedPage};
pub use one_to_many::{OneToManyRelationship, ORDER_FIELD};
pub use one_to_one::OneToOneRelationship;

use std::collections::BTreeMap;

use rusqlite::{params, params_from_iter};
use tracing::{debug, info, warn};

use crate::catalog::{CascadeAction, Metadata, RelationshipDef, RelationshipKind, ScalarType};
use crate::error::{Error, FieldViolation};
use crate::record::{current_timestamp, generate_id, Record, Value};
use crate::store::{quote_ident, Store};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rows per statement for batched inserts.
    pub batch_chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_chunk_size: 1000,
        }
    }
}

/// The uniform relationship contract.
///
/// Owns no state beyond the borrowed store handle and metadata; the actor
/// performing a mutation is passed explicitly to every mutating call.
pub struct RelationshipEngine<'a> {
    store: &'a Store,
    metadata: &'a Metadata,
    def: &'a RelationshipDef,
    config: EngineConfig,
}

impl<'a> RelationshipEngine<'a> {
    /// Create an engine for one relationship.
    pub fn new(store: &'a Store, metadata: &'a Metadata, def: &'a RelationshipDef) -> Self {
        Self {
            store,
            metadata,
            def,
            config: EngineConfig::default(),
        }
    }

    /// Override the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// The relationship this engine operates on.
    pub fn def(&self) -> &RelationshipDef {
        self.def
    }

    fn table(&self) -> String {
        self.def.table_name()
    }

    /// The identity column a record of this type occupies.
    fn endpoint_column(&self, record: &Record) -> Result<String, Error> {
        self.def.column_for(&record.entity).ok_or_else(|| {
            Error::bad_request(format!(
                "entity '{}' does not participate in relationship '{}'",
                record.entity, self.def.name
            ))
        })
    }

    fn pair_columns(&self, a: &Record, b: &Record) -> Result<(String, String), Error> {
        let col_a = self.endpoint_column(a)?;
        let col_b = self.endpoint_column(b)?;
        if col_a == col_b {
            return Err(Error::bad_request(format!(
                "records of type '{}' occupy the same side of relationship '{}'",
                a.entity, self.def.name
            )));
        }
        Ok((col_a, col_b))
    }

    fn row_types(&self) -> BTreeMap<String, ScalarType> {
        let (col_a, col_b) = self.def.columns();
        let mut types = BTreeMap::new();
        types.insert(col_a, ScalarType::Uuid);
        types.insert(col_b, ScalarType::Uuid);
        for field in &self.def.extra_fields {
            types.insert(field.name.clone(), field.field_type);
        }
        types
    }

    fn validate_extras(
        &self,
        extras: &BTreeMap<String, Value>,
        require_required: bool,
    ) -> Result<(), Error> {
        let mut violations = Vec::new();
        for (name, value) in extras {
            match self.def.get_extra_field(name) {
                None => violations.push(FieldViolation::new(name, "unknown extra field")),
                Some(def) => {
                    if !value.matches_type(def.field_type) {
                        violations.push(FieldViolation::new(
                            name,
                            format!("expected a {:?} value", def.field_type),
                        ));
                    }
                }
            }
        }
        if require_required {
            for def in &self.def.extra_fields {
                if def.required && !extras.contains_key(&def.name) {
                    violations.push(FieldViolation::new(&def.name, "is required"));
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(violations))
        }
    }

    fn pair_active(&self, col_a: &str, id_a: &str, col_b: &str, id_b: &str) -> Result<bool, Error> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = ?1 AND {} = ?2 AND \"deleted_at\" IS NULL)",
            quote_ident(&self.table()),
            quote_ident(col_a),
            quote_ident(col_b)
        );
        let exists: i64 = self
            .store
            .conn()
            .query_row(&sql, params![id_a, id_b], |row| row.get(0))?;
        Ok(exists != 0)
    }

    fn count_active(&self, column: &str, id: &str) -> Result<usize, Error> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND \"deleted_at\" IS NULL",
            quote_ident(&self.table()),
            quote_ident(column)
        );
        let count: i64 = self.store.conn().query_row(&sql, [id], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Soft-delete every active row referencing `id` through `column`.
    fn clear_active(&self, column: &str, id: &str, actor: &str) -> Result<usize, Error> {
        let sql = format!(
            "UPDATE {} SET \"deleted_at\" = ?1, \"deleted_by\" = ?2 \
             WHERE {} = ?3 AND \"deleted_at\" IS NULL",
            quote_ident(&self.table()),
            quote_ident(column)
        );
        Ok(self
            .store
            .conn()
            .execute(&sql, params![current_timestamp(), actor, id])?)
    }

    fn hard_delete_rows(&self, column: &str, id: &str) -> Result<usize, Error> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(&self.table()),
            quote_ident(column)
        );
        Ok(self.store.conn().execute(&sql, [id])?)
    }

    fn rows_for(&self, column: &str, id: &str, deleted: bool) -> Result<Vec<Record>, Error> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 AND \"deleted_at\" IS {} ORDER BY \"created_at\"",
            quote_ident(&self.table()),
            quote_ident(column),
            if deleted { "NOT NULL" } else { "NULL" }
        );
        let mut stmt = self.store.conn().prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let types = self.row_types();
        let mut rows = stmt.query([id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Record::from_row(&self.def.name, &columns, row, &types)?);
        }
        Ok(records)
    }

    /// Insert a relationship row between the two records.
    ///
    /// Returns false, without error, if an active row for the exact pair
    /// already exists. For one-to-one relationships, all prior active rows of
    /// either participant are soft-deleted first, so each participant keeps
    /// at most one active partner.
    pub fn add(
        &self,
        a: &Record,
        b: &Record,
        extras: &BTreeMap<String, Value>,
        actor: &str,
    ) -> Result<bool, Error> {
        let (col_a, col_b) = self.pair_columns(a, b)?;
        self.validate_extras(extras, true)?;

        if self.pair_active(&col_a, &a.id, &col_b, &b.id)? {
            debug!(relationship = %self.def.name, "pair already linked");
            return Ok(false);
        }

        if matches!(self.def.kind, RelationshipKind::OneToOne { .. }) {
            self.clear_active(&col_a, &a.id, actor)?;
            self.clear_active(&col_b, &b.id, actor)?;
        }

        let id = generate_id();
        let now = current_timestamp();

        let mut columns = vec!["id".to_string(), col_a, col_b];
        let mut values: Vec<rusqlite::types::Value> = vec![
            id.clone().into(),
            a.id.clone().into(),
            b.id.clone().into(),
        ];
        for (name, value) in extras {
            columns.push(name.clone());
            values.push(value.into());
        }
        columns.push("created_at".to_string());
        values.push(now.into());
        columns.push("updated_at".to_string());
        values.push(now.into());
        columns.push("created_by".to_string());
        values.push(actor.to_string().into());
        columns.push("updated_by".to_string());
        values.push(actor.to_string().into());

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table()),
            columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders.join(", ")
        );
        self.store.conn().execute(&sql, params_from_iter(values))?;
        debug!(relationship = %self.def.name, id = %id, "linked records");
        Ok(true)
    }

    /// Soft-delete the active row for the pair; false if none exists.
    pub fn remove(&self, a: &Record, b: &Record, actor: &str) -> Result<bool, Error> {
        let (col_a, col_b) = self.pair_columns(a, b)?;
        let sql = format!(
            "UPDATE {} SET \"deleted_at\" = ?1, \"deleted_by\" = ?2 \
             WHERE {} = ?3 AND {} = ?4 AND \"deleted_at\" IS NULL",
            quote_ident(&self.table()),
            quote_ident(&col_a),
            quote_ident(&col_b)
        );
        let affected = self
            .store
            .conn()
            .execute(&sql, params![current_timestamp(), actor, a.id, b.id])?;
        Ok(affected > 0)
    }

    /// Check whether an active row exists for the pair.
    pub fn has(&self, a: &Record, b: &Record) -> Result<bool, Error> {
        let (col_a, col_b) = self.pair_columns(a, b)?;
        self.pair_active(&col_a, &a.id, &col_b, &b.id)
    }

    /// All active rows referencing the record on its side.
    pub fn get_related_records(&self, record: &Record) -> Result<Vec<Record>, Error> {
        let column = self.endpoint_column(record)?;
        self.rows_for(&column, &record.id, false)
    }

    /// All soft-deleted rows referencing the record on its side.
    pub fn get_deleted_relationship_records(&self, record: &Record) -> Result<Vec<Record>, Error> {
        let column = self.endpoint_column(record)?;
        self.rows_for(&column, &record.id, true)
    }

    /// Soft-delete every active row referencing the record. Returns the
    /// number of rows affected.
    pub fn remove_all(&self, record: &Record, actor: &str) -> Result<usize, Error> {
        let column = self.endpoint_column(record)?;
        self.clear_active(&column, &record.id, actor)
    }

    /// Mutate extra fields of the active row for the pair; sets `updated_at`.
    /// Returns false if no active row exists.
    pub fn update_relation(
        &self,
        a: &Record,
        b: &Record,
        extras: &BTreeMap<String, Value>,
        actor: &str,
    ) -> Result<bool, Error> {
        let (col_a, col_b) = self.pair_columns(a, b)?;
        if extras.is_empty() {
            return Err(Error::bad_request(
                "update_relation requires at least one extra field",
            ));
        }
        self.validate_extras(extras, false)?;

        let mut assignments: Vec<String> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();
        let mut idx = 1;
        for (name, value) in extras {
            assignments.push(format!("{} = ?{}", quote_ident(name), idx));
            values.push(value.into());
            idx += 1;
        }
        assignments.push(format!("\"updated_at\" = ?{}", idx));
        values.push(current_timestamp().into());
        idx += 1;
        assignments.push(format!("\"updated_by\" = ?{}", idx));
        values.push(actor.to_string().into());
        idx += 1;

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{} AND {} = ?{} AND \"deleted_at\" IS NULL",
            quote_ident(&self.table()),
            assignments.join(", "),
            quote_ident(&col_a),
            idx,
            quote_ident(&col_b),
            idx + 1
        );
        values.push(a.id.clone().into());
        values.push(b.id.clone().into());

        let affected = self.store.conn().execute(&sql, params_from_iter(values))?;
        Ok(affected > 0)
    }

    /// Apply the cascade state machine for a record about to be deleted.
    ///
    /// Restrict signals a conflict through [`Error::RestrictViolation`];
    /// SetDefault is declared without behavior and returns false.
    pub fn handle_model_deletion(
        &self,
        record: &Record,
        action: CascadeAction,
        actor: &str,
    ) -> Result<bool, Error> {
        let column = self.endpoint_column(record)?;
        match action {
            CascadeAction::Restrict => {
                let count = self.count_active(&column, &record.id)?;
                if count > 0 {
                    return Err(Error::RestrictViolation {
                        entity: record.entity.clone(),
                        relationship: self.def.name.clone(),
                        count,
                    });
                }
                Ok(true)
            }
            CascadeAction::SoftDelete => {
                let cleared = self.clear_active(&column, &record.id, actor)?;
                info!(
                    relationship = %self.def.name,
                    cleared, "soft-deleted relationship rows"
                );
                Ok(true)
            }
            CascadeAction::Cascade => self.cascade(record, &column, actor),
            CascadeAction::SetDefault => {
                warn!(
                    relationship = %self.def.name,
                    "cascade action SetDefault has no defined behavior"
                );
                Ok(false)
            }
        }
    }

    fn cascade(&self, record: &Record, column: &str, actor: &str) -> Result<bool, Error> {
        match &self.def.kind {
            RelationshipKind::OneToOne { .. } => {
                self.cascade_partner_entities(record, column, actor)?;
                self.clear_active(column, &record.id, actor)?;
                Ok(true)
            }
            RelationshipKind::OneToMany { one, .. } => {
                if record.entity == *one {
                    // Deleting the "one" side takes every "many" entity with it
                    self.cascade_partner_entities(record, column, actor)?;
                } // a "many" record only detaches its own link row
                self.clear_active(column, &record.id, actor)?;
                Ok(true)
            }
            RelationshipKind::ManyToMany { .. } => {
                // Join data goes; the related entities are never touched
                let removed = self.hard_delete_rows(column, &record.id)?;
                info!(
                    relationship = %self.def.name,
                    removed, "hard-deleted relationship rows"
                );
                Ok(true)
            }
        }
    }

    /// Soft-delete the partner entity of every active row referencing the
    /// record.
    fn cascade_partner_entities(
        &self,
        record: &Record,
        column: &str,
        actor: &str,
    ) -> Result<(), Error> {
        let partner_name = match self.def.partner_of(&record.entity) {
            Some(partner) => partner.to_string(),
            None => return Ok(()),
        };
        let partner_column = match self.def.column_for(&partner_name) {
            Some(column) => column,
            None => return Ok(()),
        };
        let partner = self.metadata.entity(&partner_name)?;

        for row in self.rows_for(column, &record.id, false)? {
            if let Some(partner_id) = row.get(&partner_column).and_then(Value::as_str) {
                self.store.soft_delete(partner, partner_id, actor)?;
                debug!(
                    entity = %partner_name,
                    id = %partner_id,
                    "cascade soft-deleted related record"
                );
            }
        }
        Ok(())
    }
}
