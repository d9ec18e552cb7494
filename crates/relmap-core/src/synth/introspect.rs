//! Live-schema introspection.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::store::{quote_ident, Store};

/// A column observed in the live schema.
#[derive(Debug, Clone)]
pub struct LiveColumn {
    /// Column name.
    pub name: String,
    /// Declared SQL type.
    pub sql_type: String,
}

/// A table observed in the live schema.
#[derive(Debug, Clone)]
pub struct LiveTable {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<LiveColumn>,
    /// Index names (excluding implicit primary-key indexes).
    pub indexes: Vec<String>,
}

impl LiveTable {
    /// Check for a column, case-insensitively (SQLite column names are).
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Check for an index by name.
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i == name)
    }
}

/// Snapshot of the current physical schema.
#[derive(Debug, Clone, Default)]
pub struct LiveSchema {
    /// Tables keyed by name.
    pub tables: BTreeMap<String, LiveTable>,
}

impl LiveSchema {
    /// Get a table by name.
    pub fn table(&self, name: &str) -> Option<&LiveTable> {
        self.tables.get(name)
    }
}

/// Read the current physical schema from the store.
pub fn introspect(store: &Store) -> Result<LiveSchema, Error> {
    let conn = store.conn();
    let mut tables = BTreeMap::new();

    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' \
         AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    for name in names {
        let mut table = LiveTable {
            name: name.clone(),
            columns: Vec::new(),
            indexes: Vec::new(),
        };

        let mut column_stmt =
            conn.prepare(&format!("PRAGMA table_info({})", quote_ident(&name)))?;
        let columns = column_stmt.query_map([], |row| {
            Ok(LiveColumn {
                name: row.get(1)?,
                sql_type: row.get(2)?,
            })
        })?;
        for column in columns {
            table.columns.push(column?);
        }

        let mut index_stmt =
            conn.prepare(&format!("PRAGMA index_list({})", quote_ident(&name)))?;
        let indexes = index_stmt.query_map([], |row| row.get::<_, String>(1))?;
        for index in indexes {
            let index = index?;
            if !index.starts_with("sqlite_autoindex") {
                table.indexes.push(index);
            }
        }

        tables.insert(name, table);
    }

    Ok(LiveSchema { tables })
}
