//! Schema synthesizer.
//!
//! Derives physical table definitions from the metadata bundle, diffs them
//! against the live schema, and applies the difference as a sequence of DDL
//! statements. Changes are additive: columns present in the database but
//! absent from metadata are warned about, never dropped.

mod introspect;
mod plan;

pub use introspect::{introspect, LiveColumn, LiveSchema, LiveTable};
pub use plan::{plan, SyncPlan};

use tracing::{info, warn};

use crate::catalog::Metadata;
use crate::error::Error;
use crate::store::Store;

/// Outcome of a schema sync.
#[derive(Debug)]
pub struct SyncReport {
    /// Statements that were executed, in order.
    pub statements: Vec<String>,
    /// Non-fatal observations from planning.
    pub warnings: Vec<String>,
}

/// Bring the physical schema in line with the metadata bundle.
///
/// Statements execute one at a time; the first failure aborts with an error
/// naming the failing statement.
pub fn sync(store: &Store, metadata: &Metadata) -> Result<SyncReport, Error> {
    metadata.validate()?;

    let live = introspect(store)?;
    let sync_plan = plan(metadata, &live);

    for warning in &sync_plan.warnings {
        warn!("{}", warning);
    }
    for sql in &sync_plan.statements {
        info!(statement = %sql, "applying schema change");
        store.conn().execute(sql, []).map_err(|e| Error::Ddl {
            statement: sql.clone(),
            source: e,
        })?;
    }

    Ok(SyncReport {
        statements: sync_plan.statements,
        warnings: sync_plan.warnings,
    })
}
