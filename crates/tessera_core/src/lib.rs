//! # Tessera Core
//!
//! Transaction and migration layer of a content-management database adapter.
//!
//! This crate provides:
//! - Connection lifecycle with leaked-session reporting
//! - A session registry mapping request contexts to open transactions
//! - A transaction coordinator (init/commit/rollback, auto-rollback on failure)
//! - Transaction-aware operation executors for collections, versions and globals
//! - A migration engine with batches, status, fresh rebuilds and best-effort reverts
//! - Two interchangeable backends behind [`TransactionalStore`]: documents and relational tables

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod connection;
mod context;
mod coordinator;
mod dir;
mod document;
mod error;
mod registry;
mod types;

pub mod migration;
pub mod operations;
pub mod store;

pub use adapter::Adapter;
pub use config::{AdapterConfig, BackendKind, StorageLocation};
pub use connection::{ConnectionManager, ConnectionStatus, DestroyReport, LeakedSessionWarning};
pub use context::{Principal, RequestContext};
pub use coordinator::{TransactionCoordinator, TransactionRef, TransactionState};
pub use dir::DataDir;
pub use document::{
    document_id, lookup, merge, now_timestamp, Document, PaginatedDocs, Query, Sort, Where,
    CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
pub use error::{AdapterError, AdapterResult, ErrorClass};
pub use migration::{Migration, MigrationContext, MigrationEngine, MigrationRecord};
pub use operations::{EntityKind, Operations};
pub use registry::{SessionInfo, SessionRegistry, SessionSlot};
pub use store::{DocumentStore, RelationalStore, TransactionHandle, TransactionalStore};
pub use types::{ContextId, SequenceNumber, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
