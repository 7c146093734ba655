//! Transactional stores.
//!
//! A [`TransactionalStore`] is the backend seam: the coordinator and the
//! operation executors only talk to this trait. Two variants exist:
//!
//! - [`DocumentStore`]: schema-less collections keyed by UUID strings
//! - [`RelationalStore`]: tables with serial ids and a relationship table for
//!   array fields, so one logical write may touch several tables

mod document;
mod engine;
mod relational;

pub use document::DocumentStore;
pub use engine::EngineStats;
pub use relational::RelationalStore;

use crate::config::{AdapterConfig, BackendKind};
use crate::document::{Document, Where};
use crate::error::AdapterResult;
use crate::types::{SequenceNumber, TransactionId};
use std::time::{Duration, Instant};
use tessera_journal::Journal;

/// Opaque token for one open backend transaction.
///
/// Handles are created only by a store's `begin` and are not `Clone`: the
/// session registry owns the single handle for a request context.
#[derive(Debug)]
pub struct TransactionHandle {
    id: TransactionId,
    backend: BackendKind,
    started_at: Instant,
}

impl TransactionHandle {
    pub(crate) fn new(id: TransactionId, backend: BackendKind) -> Self {
        Self {
            id,
            backend,
            started_at: Instant::now(),
        }
    }

    /// Returns the backend transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the backend that issued this handle.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Returns how long the transaction has been open.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Transaction used by a store call; `None` runs the call standalone.
pub type Session<'a> = Option<&'a TransactionHandle>;

/// Backend operations used by the coordinator and the executors.
///
/// Every data method takes a [`Session`]. With a handle, writes are buffered
/// in that transaction and reads observe them; without one, reads see
/// committed data only and writes commit immediately.
pub trait TransactionalStore: Send + Sync + std::fmt::Debug {
    /// Returns the backend variant.
    fn backend(&self) -> BackendKind;

    /// Returns whether `begin` can succeed.
    fn supports_transactions(&self) -> bool;

    /// Opens a backend transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionUnsupported` if transactions are disabled.
    fn begin(&self) -> AdapterResult<TransactionHandle>;

    /// Commits a transaction and returns its commit sequence.
    ///
    /// # Errors
    ///
    /// Returns `WriteConflict` or `Validation` if the buffered writes can no
    /// longer be applied; the transaction is gone either way.
    fn commit(&self, handle: &TransactionHandle) -> AdapterResult<SequenceNumber>;

    /// Discards a transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTransaction` if the handle is no longer open.
    fn rollback(&self, handle: &TransactionHandle) -> AdapterResult<()>;

    /// Inserts a document and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on duplicate ids or unique index violations.
    fn insert(
        &self,
        session: Session<'_>,
        collection: &str,
        doc: Document,
    ) -> AdapterResult<Document>;

    /// Returns every document in `collection` matching `filter`.
    ///
    /// A missing collection reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown or the store is closed.
    fn find(
        &self,
        session: Session<'_>,
        collection: &str,
        filter: &Where,
    ) -> AdapterResult<Vec<Document>>;

    /// Replaces the document whose id matches `doc`'s id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such document exists.
    fn replace(
        &self,
        session: Session<'_>,
        collection: &str,
        doc: Document,
    ) -> AdapterResult<Document>;

    /// Deletes a document and returns it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such document exists.
    fn delete(&self, session: Session<'_>, collection: &str, id: &str) -> AdapterResult<Document>;

    /// Creates a collection.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if it already exists.
    fn create_collection(&self, session: Session<'_>, name: &str) -> AdapterResult<()>;

    /// Drops a collection and its documents.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if it doesn't exist.
    fn drop_collection(&self, session: Session<'_>, name: &str) -> AdapterResult<()>;

    /// Creates an index on `field`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the index exists or existing documents violate uniqueness.
    fn create_index(
        &self,
        session: Session<'_>,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> AdapterResult<()>;

    /// Drops the index on `field`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if there is no such index.
    fn drop_index(&self, session: Session<'_>, collection: &str, field: &str)
        -> AdapterResult<()>;

    /// Lists collection names visible to the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is unknown or the store is closed.
    fn collections(&self, session: Session<'_>) -> AdapterResult<Vec<String>>;

    /// Drops every collection outside any transaction. Returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    fn drop_all(&self) -> AdapterResult<usize>;

    /// Returns point-in-time counters.
    fn stats(&self) -> EngineStats;

    /// Discards open transactions and syncs the journal. Returns how many were discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be synced.
    fn close(&self) -> AdapterResult<usize>;
}

/// Opens the store variant selected by `config` on top of `journal`.
///
/// # Errors
///
/// Returns an error if the journal cannot be replayed.
pub fn open_store(
    config: &AdapterConfig,
    journal: Box<dyn Journal>,
) -> AdapterResult<Box<dyn TransactionalStore>> {
    Ok(match config.backend {
        BackendKind::Document => Box::new(DocumentStore::open(journal, config)?),
        BackendKind::Relational => Box::new(RelationalStore::open(journal, config)?),
    })
}

fn txid(session: Session<'_>) -> Option<TransactionId> {
    session.map(TransactionHandle::id)
}
