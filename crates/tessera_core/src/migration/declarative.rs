//! Declarative JSON migrations.
//!
//! A file `<name>.json` in the migration directory holds two step lists:
//!
//! ```json
//! {
//!   "up": [
//!     { "op": "create_collection", "collection": "posts" },
//!     { "op": "create_index", "collection": "posts", "field": "slug", "unique": true }
//!   ],
//!   "down": [
//!     { "op": "drop_collection", "collection": "posts" }
//!   ]
//! }
//! ```

use super::definition::{Migration, MigrationContext};
use crate::document::{Document, Where};
use crate::error::{AdapterError, AdapterResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One step of a declarative migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MigrationStep {
    /// Create a collection.
    CreateCollection {
        /// Collection name.
        collection: String,
    },
    /// Drop a collection.
    DropCollection {
        /// Collection name.
        collection: String,
    },
    /// Create an index.
    CreateIndex {
        /// Collection name.
        collection: String,
        /// Indexed field.
        field: String,
        /// Whether values must be unique.
        #[serde(default)]
        unique: bool,
    },
    /// Drop an index.
    DropIndex {
        /// Collection name.
        collection: String,
        /// Indexed field.
        field: String,
    },
    /// Insert a document.
    Insert {
        /// Collection name.
        collection: String,
        /// Document to insert.
        document: Document,
    },
    /// Delete documents whose fields equal every entry of `filter`.
    Delete {
        /// Collection name.
        collection: String,
        /// Field/value pairs that must all match.
        #[serde(default)]
        filter: Document,
    },
}

impl MigrationStep {
    fn run(&self, ctx: &mut MigrationContext<'_>) -> AdapterResult<()> {
        match self {
            Self::CreateCollection { collection } => ctx.create_collection(collection),
            Self::DropCollection { collection } => ctx.drop_collection(collection),
            Self::CreateIndex {
                collection,
                field,
                unique,
            } => ctx.create_index(collection, field, *unique),
            Self::DropIndex { collection, field } => ctx.drop_index(collection, field),
            Self::Insert {
                collection,
                document,
            } => ctx.insert(collection, document.clone()).map(|_| ()),
            Self::Delete { collection, filter } => {
                let clauses = filter
                    .iter()
                    .map(|(field, value)| Where::Equals(field.clone(), value.clone()))
                    .collect();
                ctx.delete(collection, &Where::And(clauses)).map(|_| ())
            }
        }
    }
}

/// Step lists of a declarative migration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationSteps {
    /// Steps applied by `migrate`.
    #[serde(default)]
    pub up: Vec<MigrationStep>,
    /// Steps applied when reverting.
    #[serde(default)]
    pub down: Vec<MigrationStep>,
}

/// A migration loaded from a JSON file.
#[derive(Debug, Clone)]
pub struct DeclarativeMigration {
    name: String,
    steps: MigrationSteps,
}

impl DeclarativeMigration {
    /// Creates a migration from step lists.
    pub fn new(name: impl Into<String>, steps: MigrationSteps) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Loads a migration file; its name is the file stem.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file can't be read, `Json` if it doesn't parse, or
    /// `InvalidOperation` if the path has no usable stem.
    pub fn from_file(path: &Path) -> AdapterResult<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                AdapterError::invalid_operation(format!(
                    "migration path {} has no usable name",
                    path.display()
                ))
            })?
            .to_string();
        let steps = serde_json::from_str(&fs::read_to_string(path)?)?;
        Ok(Self { name, steps })
    }

    /// Returns the step lists.
    #[must_use]
    pub fn steps(&self) -> &MigrationSteps {
        &self.steps
    }
}

impl Migration for DeclarativeMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> AdapterResult<()> {
        self.steps.up.iter().try_for_each(|step| step.run(ctx))
    }

    fn down(&self, ctx: &mut MigrationContext<'_>) -> AdapterResult<()> {
        self.steps.down.iter().try_for_each(|step| step.run(ctx))
    }
}
