//! Many-to-many relationship operations.

use rusqlite::{params, params_from_iter};
use serde::Serialize;
use tracing::debug;

use crate::catalog::RelationshipKind;
use crate::error::Error;
use crate::record::{current_timestamp, generate_id, Record};
use crate::store::quote_ident;

use super::RelationshipEngine;

/// Page metadata for related-record listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u64,
    /// Records per page.
    pub per_page: u64,
    /// Total active rows across all pages.
    pub total: u64,
    /// Whether pages beyond this one exist.
    pub has_more: bool,
    /// Total number of pages.
    pub total_pages: u64,
}

/// One page of relationship rows.
#[derive(Debug)]
pub struct RelatedPage {
    /// The rows on this page.
    pub records: Vec<Record>,
    /// Page metadata.
    pub pagination: Pagination,
}

/// Outcome of a batched insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Number of insert statements executed.
    pub statements: usize,
    /// Number of rows actually inserted (existing pairs are skipped).
    pub inserted: usize,
}

/// Many-to-many operations over the base engine.
pub struct ManyToManyRelationship<'a> {
    base: RelationshipEngine<'a>,
}

impl<'a> ManyToManyRelationship<'a> {
    /// Wrap a base engine; fails unless the relationship is many-to-many.
    pub fn new(base: RelationshipEngine<'a>) -> Result<Self, Error> {
        match base.def().kind {
            RelationshipKind::ManyToMany { .. } => Ok(Self { base }),
            _ => Err(Error::bad_request(format!(
                "relationship '{}' is not many-to-many",
                base.def().name
            ))),
        }
    }

    /// The underlying engine with the uniform operations.
    pub fn base(&self) -> &RelationshipEngine<'a> {
        &self.base
    }

    /// Bulk-assign related ids to one record.
    ///
    /// Inserts are chunked to bound statement size and issued as
    /// insert-if-absent: pairs that already hold an active row are silently
    /// skipped (the unique pair index does the filtering), never errors.
    pub fn add_batch(
        &self,
        target: &Record,
        related_ids: &[String],
        actor: &str,
    ) -> Result<BatchOutcome, Error> {
        let target_column = self.base.endpoint_column(target)?;
        let (col_a, col_b) = self.base.def().columns();
        let related_column = if target_column == col_a { col_b } else { col_a };

        let table = quote_ident(&self.base.def().table_name());
        let now = current_timestamp();
        let chunk_size = self.base.config.batch_chunk_size.max(1);
        let mut outcome = BatchOutcome {
            statements: 0,
            inserted: 0,
        };

        for chunk in related_ids.chunks(chunk_size) {
            let mut placeholders: Vec<String> = Vec::with_capacity(chunk.len());
            let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(chunk.len() * 7);
            let mut idx = 1;
            for related_id in chunk {
                placeholders.push(format!(
                    "(?{}, ?{}, ?{}, ?{}, ?{}, ?{}, ?{})",
                    idx,
                    idx + 1,
                    idx + 2,
                    idx + 3,
                    idx + 4,
                    idx + 5,
                    idx + 6
                ));
                values.push(generate_id().into());
                values.push(target.id.clone().into());
                values.push(related_id.clone().into());
                values.push(now.into());
                values.push(now.into());
                values.push(actor.to_string().into());
                values.push(actor.to_string().into());
                idx += 7;
            }

            let sql = format!(
                "INSERT OR IGNORE INTO {} (\"id\", {}, {}, \"created_at\", \"updated_at\", \
                 \"created_by\", \"updated_by\") VALUES {}",
                table,
                quote_ident(&target_column),
                quote_ident(&related_column),
                placeholders.join(", ")
            );
            outcome.inserted += self.base.store.conn().execute(&sql, params_from_iter(values))?;
            outcome.statements += 1;
        }

        debug!(
            relationship = %self.base.def().name,
            requested = related_ids.len(),
            inserted = outcome.inserted,
            statements = outcome.statements,
            "batched relationship insert"
        );
        Ok(outcome)
    }

    /// One page of the active rows referencing the record.
    pub fn get_related_paginated(
        &self,
        record: &Record,
        page: u64,
        per_page: u64,
    ) -> Result<RelatedPage, Error> {
        let column = self.base.endpoint_column(record)?;
        let table = quote_ident(&self.base.def().table_name());
        let page = page.max(1);
        let per_page = per_page.max(1);

        let count_sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1 AND \"deleted_at\" IS NULL",
            table,
            quote_ident(&column)
        );
        let total: i64 = self
            .base
            .store
            .conn()
            .query_row(&count_sql, [record.id.as_str()], |row| row.get(0))?;
        let total = total as u64;

        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 AND \"deleted_at\" IS NULL \
             ORDER BY \"created_at\" LIMIT ?2 OFFSET ?3",
            table,
            quote_ident(&column)
        );
        let mut stmt = self.base.store.conn().prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let types = self.base.row_types();
        let mut rows = stmt.query(params![
            record.id,
            per_page as i64,
            ((page - 1) * per_page) as i64
        ])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Record::from_row(&self.base.def().name, &columns, row, &types)?);
        }

        Ok(RelatedPage {
            records,
            pagination: Pagination {
                page,
                per_page,
                total,
                has_more: page * per_page < total,
                total_pages: total.div_ceil(per_page),
            },
        })
    }

    /// Physically remove every row referencing the record.
    ///
    /// The only path in the engine that deletes rows instead of soft-deleting
    /// them; used for a hard Cascade of join data.
    pub fn hard_delete_all(&self, record: &Record) -> Result<usize, Error> {
        let column = self.base.endpoint_column(record)?;
        self.base.hard_delete_rows(&column, &record.id)
    }
}
