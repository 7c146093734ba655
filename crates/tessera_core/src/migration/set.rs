//! Ordered set of migration definitions.

use super::declarative::DeclarativeMigration;
use super::definition::Migration;
use crate::error::{AdapterError, AdapterResult};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Migration definitions keyed and ordered by name.
#[derive(Clone, Default)]
pub struct MigrationSet {
    migrations: BTreeMap<String, Arc<dyn Migration>>,
}

impl MigrationSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a migration.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateMigrationName` if the name is taken.
    pub fn register(&mut self, migration: impl Migration + 'static) -> AdapterResult<()> {
        self.register_arc(Arc::new(migration))
    }

    /// Adds a shared migration.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateMigrationName` if the name is taken.
    pub fn register_arc(&mut self, migration: Arc<dyn Migration>) -> AdapterResult<()> {
        let name = migration.name().to_string();
        if self.migrations.contains_key(&name) {
            return Err(AdapterError::duplicate_migration(name));
        }
        self.migrations.insert(name, migration);
        Ok(())
    }

    /// Loads every `*.json` file in `dir` as a declarative migration.
    ///
    /// A missing directory loads nothing. Returns how many were loaded.
    ///
    /// # Errors
    ///
    /// Returns `Io`/`Json` for unreadable files, or `DuplicateMigrationName`.
    pub fn load_dir(&mut self, dir: &Path) -> AdapterResult<usize> {
        if !dir.exists() {
            return Ok(0);
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let count = paths.len();
        for path in paths {
            self.register(DeclarativeMigration::from_file(&path)?)?;
        }
        Ok(count)
    }

    /// Returns the migration named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Migration>> {
        self.migrations.get(name)
    }

    /// Returns true if a migration named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.migrations.contains_key(name)
    }

    /// Iterates migrations in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Migration>> {
        self.migrations.values()
    }

    /// Returns the names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.migrations.keys().cloned().collect()
    }

    /// Returns the number of migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl fmt::Debug for MigrationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.migrations.keys()).finish()
    }
}
