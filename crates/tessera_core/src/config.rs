//! Adapter configuration.

use crate::error::{AdapterError, AdapterResult};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Which `TransactionalStore` variant backs a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Schema-less document store: one space per collection.
    Document,
    /// Relational store: main table plus relationship table per collection.
    Relational,
}

impl BackendKind {
    /// Returns the scheme used in connection strings.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Relational => "relational",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

impl FromStr for BackendKind {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" | "doc" => Ok(Self::Document),
            "relational" | "sql" => Ok(Self::Relational),
            other => Err(AdapterError::connection(format!(
                "unknown backend '{other}' (expected 'document' or 'relational')"
            ))),
        }
    }
}

/// Where committed data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageLocation {
    /// Nothing survives `destroy`.
    Memory,
    /// A locked directory holding the commit journal.
    Directory(PathBuf),
}

/// Configuration for connecting an adapter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Backend variant.
    pub backend: BackendKind,

    /// Storage location.
    pub location: StorageLocation,

    /// Whether the backend supports transactions.
    ///
    /// When false, `init_transaction` fails with `TransactionUnsupported` and
    /// every operation runs standalone.
    pub transactions: bool,

    /// Relational only: create tables on first write instead of requiring a migration.
    pub push_schema: bool,

    /// Whether to flush the journal on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Whether to create the storage directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Directory holding declarative migration files.
    pub migration_dir: Option<PathBuf>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Document,
            location: StorageLocation::Memory,
            transactions: true,
            push_schema: true,
            sync_on_commit: true,
            create_if_missing: true,
            migration_dir: None,
        }
    }
}

impl AdapterConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a connection string of the form `<backend>:<location>`.
    ///
    /// `<location>` is either `memory` or a directory path, e.g.
    /// `document:memory` or `relational:/var/lib/app/db`.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the backend is unknown or the location is empty.
    pub fn from_url(url: &str) -> AdapterResult<Self> {
        let (scheme, location) = url.split_once(':').ok_or_else(|| {
            AdapterError::connection(format!(
                "malformed connection string '{url}' (expected <backend>:<location>)"
            ))
        })?;

        let backend = scheme.parse::<BackendKind>()?;
        let location = match location.trim() {
            "" => {
                return Err(AdapterError::connection(format!(
                    "connection string '{url}' has no location"
                )))
            }
            "memory" => StorageLocation::Memory,
            path => StorageLocation::Directory(PathBuf::from(path)),
        };

        Ok(Self {
            backend,
            location,
            ..Self::default()
        })
    }

    /// Sets the backend variant.
    #[must_use]
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Stores data in memory.
    #[must_use]
    pub fn in_memory(mut self) -> Self {
        self.location = StorageLocation::Memory;
        self
    }

    /// Stores data in a directory.
    #[must_use]
    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = StorageLocation::Directory(path.into());
        self
    }

    /// Sets whether transactions are supported.
    #[must_use]
    pub fn transactions(mut self, value: bool) -> Self {
        self.transactions = value;
        self
    }

    /// Sets whether relational tables are created on first write.
    #[must_use]
    pub fn push_schema(mut self, value: bool) -> Self {
        self.push_schema = value;
        self
    }

    /// Sets whether to flush the journal on every commit.
    #[must_use]
    pub fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether to create the storage directory if missing.
    #[must_use]
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the migration directory.
    #[must_use]
    pub fn migration_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.migration_dir = Some(path.into());
        self
    }
}
