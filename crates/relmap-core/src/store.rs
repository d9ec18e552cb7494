//! SQLite-backed record store.
//!
//! All mutable state lives here; records are value-like and every operation
//! is a synchronous call against the open connection. The actor performing a
//! mutation is passed explicitly so audit columns never rely on ambient
//! state.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, params_from_iter, Connection};
use tracing::debug;

use crate::catalog::{EntityDef, FieldDef};
use crate::error::{Error, FieldViolation};
use crate::record::{current_timestamp, generate_id, is_reserved_column, Record, Value};

/// Quote an identifier for embedding in SQL.
///
/// Identifiers reaching this point have passed the catalog name pattern, so
/// quoting is belt only, not sanitization.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl OrderDirection {
    fn sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// Parameters for listing records.
#[derive(Debug, Clone)]
pub struct ListQuery {
    /// 1-based page number.
    pub page: u64,
    /// Records per page.
    pub per_page: u64,
    /// Equality filters on declared fields.
    pub filters: Vec<(String, Value)>,
    /// Sort field (declared field or a reserved column).
    pub sort: Option<String>,
    /// Sort direction.
    pub order: OrderDirection,
    /// Substring search across text fields.
    pub search: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 25,
            filters: Vec::new(),
            sort: None,
            order: OrderDirection::Asc,
            search: None,
        }
    }
}

impl ListQuery {
    /// Set the page number.
    pub fn with_page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    /// Set the page size.
    pub fn with_per_page(mut self, per_page: u64) -> Self {
        self.per_page = per_page;
        self
    }

    /// Add an equality filter.
    pub fn with_filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push((field.into(), value));
        self
    }

    /// Set the sort field and direction.
    pub fn with_sort(mut self, field: impl Into<String>, order: OrderDirection) -> Self {
        self.sort = Some(field.into());
        self.order = order;
        self
    }

    /// Set the search term.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }
}

/// A page of records plus totals.
#[derive(Debug)]
pub struct ListResult {
    /// The records on this page.
    pub records: Vec<Record>,
    /// Total matching records across all pages.
    pub total: u64,
    /// 1-based page number.
    pub page: u64,
    /// Records per page.
    pub per_page: u64,
}

impl ListResult {
    /// Total number of pages.
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }
        self.total.div_ceil(self.per_page)
    }

    /// Whether pages beyond this one exist.
    pub fn has_more(&self) -> bool {
        self.page * self.per_page < self.total
    }
}

/// Handle to the backing relational store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open a store backed by a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    /// Open an in-memory store.
    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Raw connection access for the engine and the synthesizer.
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Validate provided fields against the entity definition.
    fn validate_fields(
        entity: &EntityDef,
        fields: &BTreeMap<String, Value>,
        require_required: bool,
    ) -> Vec<FieldViolation> {
        let mut violations = Vec::new();

        for (name, value) in fields {
            match entity.get_field(name) {
                None => violations.push(FieldViolation::new(name, "unknown field")),
                Some(def) => {
                    if !value.matches_type(def.field_type) {
                        violations.push(FieldViolation::new(
                            name,
                            format!("expected a {:?} value", def.field_type),
                        ));
                    } else if def.required && value.is_null() {
                        violations.push(FieldViolation::new(name, "is required"));
                    }
                }
            }
        }

        if require_required {
            for def in &entity.fields {
                if def.required && !fields.contains_key(&def.name) {
                    violations.push(FieldViolation::new(&def.name, "is required"));
                }
            }
        }

        violations
    }

    /// Insert a new record, generating identity and audit fields.
    pub fn insert(
        &self,
        entity: &EntityDef,
        fields: &BTreeMap<String, Value>,
        actor: &str,
    ) -> Result<Record, Error> {
        let violations = Self::validate_fields(entity, fields, true);
        if !violations.is_empty() {
            return Err(Error::validation(violations));
        }

        let id = generate_id();
        let now = current_timestamp();

        let mut columns: Vec<String> = vec!["id".to_string()];
        let mut values: Vec<rusqlite::types::Value> = vec![id.clone().into()];
        for (name, value) in fields {
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
            quote_ident(&entity.table_name()),
            columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            placeholders.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(values))?;
        debug!(entity = %entity.name, id = %id, "inserted record");

        let mut record_fields = fields.clone();
        for def in &entity.fields {
            record_fields.entry(def.name.clone()).or_insert(Value::Null);
        }

        Ok(Record {
            entity: entity.name.clone(),
            id,
            fields: record_fields,
            created_at: now,
            updated_at: now,
            created_by: Some(actor.to_string()),
            updated_by: Some(actor.to_string()),
            deleted_at: None,
            deleted_by: None,
        })
    }

    /// Get an active record by id.
    pub fn get(&self, entity: &EntityDef, id: &str) -> Result<Option<Record>, Error> {
        self.fetch(entity, id, true)
    }

    /// Get a record by id, including soft-deleted ones.
    pub fn get_any(&self, entity: &EntityDef, id: &str) -> Result<Option<Record>, Error> {
        self.fetch(entity, id, false)
    }

    fn fetch(&self, entity: &EntityDef, id: &str, active_only: bool) -> Result<Option<Record>, Error> {
        let sql = format!(
            "SELECT * FROM {} WHERE \"id\" = ?1{}",
            quote_ident(&entity.table_name()),
            if active_only {
                " AND \"deleted_at\" IS NULL"
            } else {
                ""
            }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let types = entity.field_types();
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Record::from_row(&entity.name, &columns, row, &types)?)),
            None => Ok(None),
        }
    }

    /// Update fields of an active record; sets `updated_at`/`updated_by`.
    pub fn update(
        &self,
        entity: &EntityDef,
        id: &str,
        fields: &BTreeMap<String, Value>,
        actor: &str,
    ) -> Result<Record, Error> {
        let violations = Self::validate_fields(entity, fields, false);
        if !violations.is_empty() {
            return Err(Error::validation(violations));
        }

        let now = current_timestamp();
        let mut assignments: Vec<String> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();
        let mut idx = 1;
        for (name, value) in fields {
            assignments.push(format!("{} = ?{}", quote_ident(name), idx));
            values.push(value.into());
            idx += 1;
        }
        assignments.push(format!("\"updated_at\" = ?{}", idx));
        values.push(now.into());
        idx += 1;
        assignments.push(format!("\"updated_by\" = ?{}", idx));
        values.push(actor.to_string().into());
        idx += 1;
        values.push(id.to_string().into());

        let sql = format!(
            "UPDATE {} SET {} WHERE \"id\" = ?{} AND \"deleted_at\" IS NULL",
            quote_ident(&entity.table_name()),
            assignments.join(", "),
            idx
        );
        let affected = self.conn.execute(&sql, params_from_iter(values))?;
        if affected == 0 {
            return Err(Error::not_found(format!(
                "no active {} record with id '{}'",
                entity.name, id
            )));
        }

        self.get(entity, id)?.ok_or_else(|| {
            Error::not_found(format!("no active {} record with id '{}'", entity.name, id))
        })
    }

    /// Soft-delete an active record.
    ///
    /// Only the soft-delete fields change; the rest of the row is untouched.
    pub fn soft_delete(&self, entity: &EntityDef, id: &str, actor: &str) -> Result<bool, Error> {
        let sql = format!(
            "UPDATE {} SET \"deleted_at\" = ?1, \"deleted_by\" = ?2 \
             WHERE \"id\" = ?3 AND \"deleted_at\" IS NULL",
            quote_ident(&entity.table_name())
        );
        let affected = self
            .conn
            .execute(&sql, params![current_timestamp(), actor, id])?;
        Ok(affected > 0)
    }

    /// Restore a soft-deleted record.
    pub fn restore(&self, entity: &EntityDef, id: &str, actor: &str) -> Result<bool, Error> {
        let sql = format!(
            "UPDATE {} SET \"deleted_at\" = NULL, \"deleted_by\" = NULL, \
             \"updated_at\" = ?1, \"updated_by\" = ?2 \
             WHERE \"id\" = ?3 AND \"deleted_at\" IS NOT NULL",
            quote_ident(&entity.table_name())
        );
        let affected = self
            .conn
            .execute(&sql, params![current_timestamp(), actor, id])?;
        Ok(affected > 0)
    }

    /// List active records.
    pub fn list(&self, entity: &EntityDef, query: &ListQuery) -> Result<ListResult, Error> {
        self.list_where(entity, query, false)
    }

    /// List soft-deleted records.
    pub fn list_deleted(&self, entity: &EntityDef, query: &ListQuery) -> Result<ListResult, Error> {
        self.list_where(entity, query, true)
    }

    fn list_where(
        &self,
        entity: &EntityDef,
        query: &ListQuery,
        deleted: bool,
    ) -> Result<ListResult, Error> {
        let mut clauses = vec![if deleted {
            "\"deleted_at\" IS NOT NULL".to_string()
        } else {
            "\"deleted_at\" IS NULL".to_string()
        }];
        let mut values: Vec<rusqlite::types::Value> = Vec::new();
        let mut idx = 1;

        for (field, value) in &query.filters {
            if entity.get_field(field).is_none() {
                return Err(Error::bad_request(format!(
                    "unknown filter field '{}'",
                    field
                )));
            }
            clauses.push(format!("{} = ?{}", quote_ident(field), idx));
            values.push(value.into());
            idx += 1;
        }

        if let Some(search) = &query.search {
            let text_fields: Vec<&FieldDef> = entity
                .fields
                .iter()
                .filter(|f| f.field_type.is_text_like())
                .collect();
            if !text_fields.is_empty() {
                let pattern = format!("%{}%", search);
                let mut likes = Vec::new();
                for field in text_fields {
                    likes.push(format!("{} LIKE ?{}", quote_ident(&field.name), idx));
                    values.push(pattern.clone().into());
                    idx += 1;
                }
                clauses.push(format!("({})", likes.join(" OR ")));
            }
        }

        let table = quote_ident(&entity.table_name());
        let where_clause = clauses.join(" AND ");

        let count_sql = format!("SELECT COUNT(*) FROM {} WHERE {}", table, where_clause);
        let total: i64 =
            self.conn
                .query_row(&count_sql, params_from_iter(values.clone()), |row| {
                    row.get(0)
                })?;

        let sort_column = match &query.sort {
            Some(field) => {
                if entity.get_field(field).is_none() && !is_reserved_column(field) {
                    return Err(Error::bad_request(format!("unknown sort field '{}'", field)));
                }
                field.clone()
            }
            None => "created_at".to_string(),
        };

        let page = query.page.max(1);
        let per_page = query.per_page.max(1);
        let sql = format!(
            "SELECT * FROM {} WHERE {} ORDER BY {} {} LIMIT ?{} OFFSET ?{}",
            table,
            where_clause,
            quote_ident(&sort_column),
            query.order.sql(),
            idx,
            idx + 1
        );
        values.push((per_page as i64).into());
        values.push((((page - 1) * per_page) as i64).into());

        let mut stmt = self.conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let types = entity.field_types();
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Record::from_row(&entity.name, &columns, row, &types)?);
        }

        Ok(ListResult {
            records,
            total: total as u64,
            page,
            per_page,
        })
    }
}
