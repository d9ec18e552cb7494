//! Target-schema derivation and minimal diffing.

use crate::catalog::{
    truncate_identifier, Cardinality, EntityDef, Metadata, RelationshipDef,
};
use crate::store::quote_ident;

use super::introspect::LiveSchema;

/// An ordered set of DDL statements plus non-fatal observations.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Statements to execute, in order.
    pub statements: Vec<String>,
    /// Non-fatal observations (extra live columns, nullable additions).
    pub warnings: Vec<String>,
}

impl SyncPlan {
    /// Check if the plan has nothing to do.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

struct TargetColumn {
    name: String,
    sql_type: &'static str,
    not_null: bool,
    primary_key: bool,
}

struct TargetIndex {
    name: String,
    sql: String,
}

struct TargetTable {
    name: String,
    columns: Vec<TargetColumn>,
    indexes: Vec<TargetIndex>,
}

impl TargetTable {
    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }
}

fn column(name: &str, sql_type: &'static str, not_null: bool) -> TargetColumn {
    TargetColumn {
        name: name.to_string(),
        sql_type,
        not_null,
        primary_key: false,
    }
}

fn identity_column() -> TargetColumn {
    TargetColumn {
        name: "id".to_string(),
        sql_type: "TEXT",
        not_null: true,
        primary_key: true,
    }
}

fn audit_columns() -> Vec<TargetColumn> {
    vec![
        column("created_at", "INTEGER", true),
        column("updated_at", "INTEGER", true),
        column("created_by", "TEXT", false),
        column("updated_by", "TEXT", false),
        column("deleted_at", "INTEGER", false),
        column("deleted_by", "TEXT", false),
    ]
}

fn lookup_index(table: &str, field: &str) -> TargetIndex {
    let name = truncate_identifier(&format!("idx_{}_{}", table, field));
    TargetIndex {
        sql: format!(
            "CREATE INDEX {} ON {} ({})",
            quote_ident(&name),
            quote_ident(table),
            quote_ident(field)
        ),
        name,
    }
}

/// Uniqueness over the identity-column pair, restricted to active rows so a
/// soft-deleted link can be re-created.
fn unique_pair_index(table: &str, col_a: &str, col_b: &str) -> TargetIndex {
    let name = truncate_identifier(&format!("uniq_{}_pair", table));
    TargetIndex {
        sql: format!(
            "CREATE UNIQUE INDEX {} ON {} ({}, {}) WHERE \"deleted_at\" IS NULL",
            quote_ident(&name),
            quote_ident(table),
            quote_ident(col_a),
            quote_ident(col_b)
        ),
        name,
    }
}

fn entity_table(entity: &EntityDef) -> TargetTable {
    let table = entity.table_name();
    let mut columns = vec![identity_column()];
    for field in &entity.fields {
        columns.push(column(&field.name, field.field_type.sql_type(), field.required));
    }
    columns.extend(audit_columns());

    let mut indexes = Vec::new();
    for field in entity.indexed_fields() {
        indexes.push(lookup_index(&table, &field.name));
    }
    indexes.push(lookup_index(&table, "deleted_at"));

    TargetTable {
        name: table,
        columns,
        indexes,
    }
}

fn relationship_table(relationship: &RelationshipDef) -> TargetTable {
    let table = relationship.table_name();
    let (col_a, col_b) = relationship.columns();

    let mut columns = vec![identity_column()];
    columns.push(column(&col_a, "TEXT", true));
    columns.push(column(&col_b, "TEXT", true));
    for field in &relationship.extra_fields {
        columns.push(column(&field.name, field.field_type.sql_type(), field.required));
    }
    columns.extend(audit_columns());

    let mut indexes = Vec::new();
    // Second line of defense behind the engine's existence check
    if relationship.cardinality() != Cardinality::OneToMany {
        indexes.push(unique_pair_index(&table, &col_a, &col_b));
    }
    indexes.push(lookup_index(&table, &col_a));
    indexes.push(lookup_index(&table, &col_b));
    for field in relationship.extra_fields.iter().filter(|f| f.indexed) {
        indexes.push(lookup_index(&table, &field.name));
    }
    indexes.push(lookup_index(&table, "deleted_at"));

    TargetTable {
        name: table,
        columns,
        indexes,
    }
}

fn create_table_sql(table: &TargetTable) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut line = format!("{} {}", quote_ident(&c.name), c.sql_type);
            if c.primary_key {
                line.push_str(" PRIMARY KEY");
            } else if c.not_null {
                line.push_str(" NOT NULL");
            }
            line
        })
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        quote_ident(&table.name),
        columns.join(", ")
    )
}

/// Compute the minimal diff between the live schema and the metadata-derived
/// target schema.
///
/// Additive only: missing tables and columns are created, missing indexes
/// added; live columns absent from metadata are reported, never dropped.
pub fn plan(metadata: &Metadata, live: &LiveSchema) -> SyncPlan {
    let mut targets: Vec<TargetTable> = Vec::new();

    let mut entities: Vec<&EntityDef> = metadata.entities.values().collect();
    entities.sort_by(|a, b| a.name.cmp(&b.name));
    for entity in entities {
        targets.push(entity_table(entity));
    }

    let mut relationships: Vec<&RelationshipDef> = metadata.relationships.values().collect();
    relationships.sort_by(|a, b| a.name.cmp(&b.name));
    for relationship in relationships {
        targets.push(relationship_table(relationship));
    }

    let mut sync_plan = SyncPlan::default();

    for target in &targets {
        match live.table(&target.name) {
            None => {
                sync_plan.statements.push(create_table_sql(target));
                for index in &target.indexes {
                    sync_plan.statements.push(index.sql.clone());
                }
            }
            Some(live_table) => {
                for target_column in &target.columns {
                    if live_table.has_column(&target_column.name) {
                        continue;
                    }
                    // ALTER ADD COLUMN cannot enforce NOT NULL on existing rows
                    sync_plan.statements.push(format!(
                        "ALTER TABLE {} ADD COLUMN {} {}",
                        quote_ident(&target.name),
                        quote_ident(&target_column.name),
                        target_column.sql_type
                    ));
                    if target_column.not_null {
                        sync_plan.warnings.push(format!(
                            "column '{}' on table '{}' added as nullable; existing rows hold NULL",
                            target_column.name, target.name
                        ));
                    }
                }
                for live_column in &live_table.columns {
                    if !target.has_column(&live_column.name) {
                        sync_plan.warnings.push(format!(
                            "column '{}' on table '{}' is not declared in metadata; leaving in place",
                            live_column.name, target.name
                        ));
                    }
                }
                for index in &target.indexes {
                    if !live_table.has_index(&index.name) {
                        sync_plan.statements.push(index.sql.clone());
                    }
                }
            }
        }
    }

    sync_plan
}
