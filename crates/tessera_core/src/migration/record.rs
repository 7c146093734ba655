//! Applied-migration records and status reporting.

use crate::document::Document;
use crate::error::{AdapterError, AdapterResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Collection holding one record per applied migration.
pub const MIGRATIONS_COLLECTION: &str = "_migrations";

/// A migration that was applied, stored as `{name, batch, executedAt}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    /// Migration name.
    pub name: String,
    /// The `migrate` run that applied it; starts at 1.
    pub batch: u64,
    /// RFC 3339 UTC timestamp of the run.
    pub executed_at: String,
}

impl MigrationRecord {
    /// Converts the record into a storable document.
    ///
    /// # Errors
    ///
    /// Returns `Json` if serialization fails.
    pub fn to_document(&self) -> AdapterResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(doc) => Ok(doc),
            other => Err(AdapterError::backend(format!(
                "migration record serialized to {other}"
            ))),
        }
    }

    /// Reads a record back from a stored document; extra fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Json` if a field is missing or has the wrong type.
    pub fn from_document(doc: Document) -> AdapterResult<Self> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }
}

/// Where a migration stands relative to the records collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    /// Defined and recorded.
    Applied,
    /// Defined, not yet recorded.
    Pending,
    /// Recorded, but no definition is loaded for it.
    Missing,
}

/// One line of `migrate_status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migration name.
    pub name: String,
    /// Applied, pending or missing.
    pub state: MigrationState,
    /// Batch, if applied.
    pub batch: Option<u64>,
    /// Run timestamp, if applied.
    pub executed_at: Option<String>,
}

/// Outcome of `migrate` and `migrate_fresh`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateReport {
    /// Batch number used, or `None` if nothing was pending.
    pub batch: Option<u64>,
    /// Names applied, in order.
    pub applied: Vec<String>,
}

/// Outcome of `migrate_down` and `migrate_reset`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevertReport {
    /// Names reverted, in order.
    pub reverted: Vec<String>,
    /// Records left in place because no definition was loaded for them.
    pub skipped: Vec<String>,
}

/// Outcome of `migrate_refresh`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// The revert half.
    pub reverted: RevertReport,
    /// The re-apply half.
    pub migrated: MigrateReport,
}
