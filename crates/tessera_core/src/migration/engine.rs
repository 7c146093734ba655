//! Migration engine: apply, revert, rebuild and report.

use super::declarative::{DeclarativeMigration, MigrationSteps};
use super::definition::{Migration, MigrationContext};
use super::record::{
    MigrateReport, MigrationRecord, MigrationState, MigrationStatus, RefreshReport, RevertReport,
    MIGRATIONS_COLLECTION,
};
use super::set::MigrationSet;
use crate::context::RequestContext;
use crate::document::{now_timestamp, Query, Where};
use crate::error::{AdapterError, AdapterResult};
use crate::operations::Operations;
use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A migration file written by `create_migration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMigration {
    /// Migration name (`YYYYMMDD_HHMMSS_<slug>`).
    pub name: String,
    /// Path of the written file.
    pub path: PathBuf,
}

/// Lowercases `name` and turns every run of other characters into `_`.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// Applies and reverts migrations through the operation executors.
///
/// Definitions are the registered migrations plus, when a directory is set,
/// the declarative files in it, reloaded on every run. Concurrent runs
/// against the same backend are not coordinated.
#[derive(Debug)]
pub struct MigrationEngine {
    operations: Operations,
    registered: MigrationSet,
    dir: Option<PathBuf>,
}

impl MigrationEngine {
    /// Creates an engine with no definitions.
    #[must_use]
    pub fn new(operations: Operations) -> Self {
        Self {
            operations,
            registered: MigrationSet::new(),
            dir: None,
        }
    }

    /// Sets the directory holding declarative migration files.
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Returns the migration directory, if set.
    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Registers a code-defined migration.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateMigrationName` if the name is taken.
    pub fn register(&mut self, migration: impl Migration + 'static) -> AdapterResult<()> {
        self.registered.register(migration)
    }

    /// Returns every definition: registered ones plus the directory's files.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateMigrationName` if a file repeats a registered name,
    /// or `Io`/`Json` for unreadable files.
    pub fn definitions(&self) -> AdapterResult<MigrationSet> {
        let mut set = self.registered.clone();
        if let Some(dir) = &self.dir {
            set.load_dir(dir)?;
        }
        Ok(set)
    }

    /// Returns applied records ordered by batch, then name.
    ///
    /// # Errors
    ///
    /// Returns `Json` if a stored record is malformed.
    pub fn applied(&self, ctx: Option<&RequestContext>) -> AdapterResult<Vec<MigrationRecord>> {
        let docs = self
            .operations
            .find(ctx, MIGRATIONS_COLLECTION, &Query::all())?
            .docs;
        let mut records = docs
            .into_iter()
            .map(MigrationRecord::from_document)
            .collect::<AdapterResult<Vec<_>>>()?;
        records.sort_by(|a, b| a.batch.cmp(&b.batch).then_with(|| a.name.cmp(&b.name)));
        Ok(records)
    }

    /// Writes an empty declarative migration named
    /// `YYYYMMDD_HHMMSS_<slug>` into the migration directory.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateMigrationName` if the name collides with a file or
    /// a registered migration, or `InvalidOperation` if no directory is set
    /// or the name has no usable characters.
    pub fn create_migration(&self, name: &str) -> AdapterResult<CreatedMigration> {
        let dir = self.dir.as_ref().ok_or_else(|| {
            AdapterError::invalid_operation("no migration directory configured")
        })?;
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(AdapterError::invalid_operation(format!(
                "migration name '{name}' has no usable characters"
            )));
        }

        let name = format!("{}_{slug}", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(format!("{name}.json"));
        if path.exists() || self.definitions()?.contains(&name) {
            return Err(AdapterError::duplicate_migration(name));
        }

        fs::create_dir_all(dir)?;
        let template = serde_json::to_string_pretty(&MigrationSteps::default())?;
        fs::write(&path, template + "\n")?;
        info!(migration = %name, path = %path.display(), "created migration");
        Ok(CreatedMigration { name, path })
    }

    /// Applies every pending migration as one batch in one transaction.
    ///
    /// Records are written after all `up`s succeed, so a failed batch leaves
    /// no records behind.
    ///
    /// # Errors
    ///
    /// Returns `MigrationFailed` wrapping the first `up` error.
    pub fn migrate(&self) -> AdapterResult<MigrateReport> {
        let definitions = self.definitions()?;
        let records = self.applied(None)?;

        let pending: Vec<Arc<dyn Migration>> = definitions
            .iter()
            .filter(|m| !records.iter().any(|r| r.name == m.name()))
            .cloned()
            .collect();
        if pending.is_empty() {
            info!("nothing to migrate");
            return Ok(MigrateReport::default());
        }

        let batch = records.iter().map(|r| r.batch).max().unwrap_or(0) + 1;
        self.run_batch(batch, &pending)
    }

    fn run_batch(&self, batch: u64, pending: &[Arc<dyn Migration>]) -> AdapterResult<MigrateReport> {
        let ctx = RequestContext::new();
        let applied = self.operations.coordinator().transaction(&ctx, |ctx| {
            let mut applied = Vec::with_capacity(pending.len());
            for migration in pending {
                info!(migration = migration.name(), batch, "migrating");
                let mut mctx = MigrationContext::new(&self.operations, ctx);
                migration
                    .up(&mut mctx)
                    .map_err(|e| AdapterError::migration_failed(migration.name(), e))?;
                debug!(
                    migration = migration.name(),
                    steps = mctx.performed().len(),
                    "migrated"
                );
                applied.push(migration.name().to_string());
            }

            self.ensure_records_collection(ctx)?;
            let executed_at = now_timestamp();
            for name in &applied {
                let record = MigrationRecord {
                    name: name.clone(),
                    batch,
                    executed_at: executed_at.clone(),
                };
                self.operations
                    .create(Some(ctx), MIGRATIONS_COLLECTION, record.to_document()?)?;
            }
            Ok(applied)
        })?;

        info!(batch, count = applied.len(), "batch applied");
        Ok(MigrateReport {
            batch: Some(batch),
            applied,
        })
    }

    fn ensure_records_collection(&self, ctx: &RequestContext) -> AdapterResult<()> {
        let exists = self
            .operations
            .collections(Some(ctx))?
            .iter()
            .any(|c| c == MIGRATIONS_COLLECTION);
        if !exists {
            self.operations
                .create_collection(Some(ctx), MIGRATIONS_COLLECTION)?;
        }
        Ok(())
    }

    /// Reports applied, pending and missing migrations without writing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if definitions or records cannot be read.
    pub fn migrate_status(&self) -> AdapterResult<Vec<MigrationStatus>> {
        let definitions = self.definitions()?;
        let records: HashMap<String, MigrationRecord> = self
            .applied(None)?
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();

        let mut status: Vec<MigrationStatus> = definitions
            .names()
            .into_iter()
            .map(|name| match records.get(&name) {
                Some(record) => MigrationStatus {
                    name,
                    state: MigrationState::Applied,
                    batch: Some(record.batch),
                    executed_at: Some(record.executed_at.clone()),
                },
                None => MigrationStatus {
                    name,
                    state: MigrationState::Pending,
                    batch: None,
                    executed_at: None,
                },
            })
            .collect();

        status.extend(
            records
                .into_values()
                .filter(|r| !definitions.contains(&r.name))
                .map(|r| MigrationStatus {
                    name: r.name,
                    state: MigrationState::Missing,
                    batch: Some(r.batch),
                    executed_at: Some(r.executed_at),
                }),
        );
        status.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(status)
    }

    /// Drops every collection and applies all migrations as batch 1.
    ///
    /// # Errors
    ///
    /// Returns `FreshNotAcknowledged` unless `force_accept_warning` is set,
    /// or `MigrationFailed` if an `up` fails.
    pub fn migrate_fresh(&self, force_accept_warning: bool) -> AdapterResult<MigrateReport> {
        if !force_accept_warning {
            return Err(AdapterError::FreshNotAcknowledged);
        }
        let definitions = self.definitions()?;

        let dropped = self.operations.drop_all()?;
        warn!(collections = dropped, "dropped every collection for a fresh migration");

        let all: Vec<Arc<dyn Migration>> = definitions.iter().cloned().collect();
        if all.is_empty() {
            return Ok(MigrateReport::default());
        }
        self.run_batch(1, &all)
    }

    /// Reverts the newest batch. Best-effort.
    ///
    /// # Errors
    ///
    /// Returns `MigrationFailed` for the first `down` that fails; migrations
    /// reverted before it stay reverted.
    pub fn migrate_down(&self) -> AdapterResult<RevertReport> {
        let records = self.applied(None)?;
        let Some(newest) = records.iter().map(|r| r.batch).max() else {
            info!("nothing to revert");
            return Ok(RevertReport::default());
        };
        let batch: Vec<MigrationRecord> = records.into_iter().filter(|r| r.batch == newest).collect();
        self.revert(batch)
    }

    /// Reverts every batch, newest first. Best-effort.
    ///
    /// # Errors
    ///
    /// Returns `MigrationFailed` for the first `down` that fails.
    pub fn migrate_reset(&self) -> AdapterResult<RevertReport> {
        let records = self.applied(None)?;
        if records.is_empty() {
            info!("nothing to revert");
        }
        self.revert(records)
    }

    /// Reverts every batch, then applies everything again.
    ///
    /// # Errors
    ///
    /// Returns the first error of either half.
    pub fn migrate_refresh(&self) -> AdapterResult<RefreshReport> {
        let reverted = self.migrate_reset()?;
        let migrated = self.migrate()?;
        Ok(RefreshReport { reverted, migrated })
    }

    /// Reverts `records` (ordered oldest first) in reverse, one transaction each.
    fn revert(&self, records: Vec<MigrationRecord>) -> AdapterResult<RevertReport> {
        let definitions = self.definitions()?;
        let mut report = RevertReport::default();

        for record in records.into_iter().rev() {
            let Some(migration) = definitions.get(&record.name) else {
                warn!(migration = %record.name, "no definition loaded, skipping revert");
                report.skipped.push(record.name);
                continue;
            };

            info!(migration = %record.name, batch = record.batch, "reverting");
            let ctx = RequestContext::new();
            self.operations
                .coordinator()
                .transaction(&ctx, |ctx| {
                    let mut mctx = MigrationContext::new(&self.operations, ctx);
                    migration.down(&mut mctx)?;
                    self.operations.delete_many(
                        Some(ctx),
                        MIGRATIONS_COLLECTION,
                        &Where::eq("name", record.name.as_str()),
                    )?;
                    Ok(())
                })
                .map_err(|e| {
                    warn!(migration = %record.name, error = %e, "revert failed; manual correction may be needed");
                    AdapterError::migration_failed(record.name.as_str(), e)
                })?;
            report.reverted.push(record.name);
        }
        Ok(report)
    }
}
