//! Error types for tessera core.

use crate::types::TransactionId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// How a caller should treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The process should not serve traffic.
    Fatal,
    /// The caller can degrade and carry on.
    Recoverable,
    /// Expected outcome caused by the request (4xx-equivalent).
    Client,
    /// Unexpected backend failure (5xx-equivalent).
    Server,
}

/// Errors that can occur in tessera core operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The backend could not be reached or opened.
    #[error("connection error: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// Releasing backend resources failed.
    #[error("teardown error: {message}")]
    Teardown {
        /// Description of the failure.
        message: String,
    },

    /// An operation was issued before `connect` or after `destroy`.
    #[error("adapter is not connected")]
    NotConnected,

    /// The backend was configured without transaction support.
    #[error("transactions are not supported by this connection")]
    TransactionUnsupported,

    /// A point lookup matched nothing.
    #[error("document {id} not found in {collection}")]
    NotFound {
        /// Collection or table searched.
        collection: String,
        /// Identifier that was not found.
        id: String,
    },

    /// A write violated a constraint.
    #[error("validation failed in {collection}: {message}")]
    Validation {
        /// Collection or table written to.
        collection: String,
        /// Description of the violation.
        message: String,
    },

    /// Unexpected backend failure.
    #[error("backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// A transaction wrote a row that another transaction committed first.
    #[error("write conflict on {collection}/{id}")]
    WriteConflict {
        /// Collection or table of the row.
        collection: String,
        /// Row identifier.
        id: String,
    },

    /// The backend has no open transaction with this id.
    #[error("unknown transaction {0}")]
    UnknownTransaction(TransactionId),

    /// Journal error.
    #[error("journal error: {0}")]
    Journal(#[from] tessera_journal::JournalError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A migration with this name already exists.
    #[error("migration name already exists: {name}")]
    DuplicateMigrationName {
        /// The colliding name.
        name: String,
    },

    /// A migration failed to apply or revert.
    #[error("migration {name} failed: {source}")]
    MigrationFailed {
        /// Name of the failing migration.
        name: String,
        /// Underlying error.
        #[source]
        source: Box<AdapterError>,
    },

    /// `migrate_fresh` was called without acknowledging that it drops data.
    #[error("migrate:fresh drops every collection; pass --force-accept-warning to proceed")]
    FreshNotAcknowledged,

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl AdapterError {
    /// Creates a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a teardown error.
    pub fn teardown(message: impl Into<String>) -> Self {
        Self::Teardown {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a write conflict error.
    pub fn write_conflict(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::WriteConflict {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a duplicate migration name error.
    pub fn duplicate_migration(name: impl Into<String>) -> Self {
        Self::DuplicateMigrationName { name: name.into() }
    }

    /// Wraps an error raised while running a migration.
    pub fn migration_failed(name: impl Into<String>, source: AdapterError) -> Self {
        Self::MigrationFailed {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Classifies the error for the calling layer.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Connection { .. } => ErrorClass::Fatal,
            Self::TransactionUnsupported => ErrorClass::Recoverable,
            Self::NotFound { .. }
            | Self::Validation { .. }
            | Self::DuplicateMigrationName { .. }
            | Self::FreshNotAcknowledged
            | Self::InvalidOperation { .. } => ErrorClass::Client,
            _ => ErrorClass::Server,
        }
    }

    /// Returns true for expected, request-caused errors.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.class() == ErrorClass::Client
    }

    /// Returns true if the error is `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<ciborium::de::Error<io::Error>> for AdapterError {
    fn from(err: ciborium::de::Error<io::Error>) -> Self {
        Self::backend(format!("commit frame decode failed: {err}"))
    }
}

impl From<ciborium::ser::Error<io::Error>> for AdapterError {
    fn from(err: ciborium::ser::Error<io::Error>) -> Self {
        Self::backend(format!("commit frame encode failed: {err}"))
    }
}
