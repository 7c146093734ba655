//! Schema-less document backend.

use super::engine::{Engine, EngineStats, Mutation};
use super::{txid, Session, TransactionHandle, TransactionalStore};
use crate::config::{AdapterConfig, BackendKind};
use crate::document::{document_id, Document, Where, ID_FIELD};
use crate::error::{AdapterError, AdapterResult};
use crate::types::SequenceNumber;
use serde_json::Value;
use tessera_journal::Journal;
use uuid::Uuid;

/// Document store: one space per collection, UUID string ids.
///
/// Collections are created implicitly by the first write.
#[derive(Debug)]
pub struct DocumentStore {
    engine: Engine,
    transactions: bool,
}

impl DocumentStore {
    /// Opens a document store over `journal`.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be replayed.
    pub fn open(journal: Box<dyn Journal>, config: &AdapterConfig) -> AdapterResult<Self> {
        Ok(Self {
            engine: Engine::open(journal, true, config.sync_on_commit)?,
            transactions: config.transactions,
        })
    }
}

impl TransactionalStore for DocumentStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Document
    }

    fn supports_transactions(&self) -> bool {
        self.transactions
    }

    fn begin(&self) -> AdapterResult<TransactionHandle> {
        self.engine.begin_handle(BackendKind::Document, self.transactions)
    }

    fn commit(&self, handle: &TransactionHandle) -> AdapterResult<SequenceNumber> {
        self.engine.commit(handle.id())
    }

    fn rollback(&self, handle: &TransactionHandle) -> AdapterResult<()> {
        self.engine.rollback(handle.id())
    }

    fn insert(
        &self,
        session: Session<'_>,
        collection: &str,
        mut doc: Document,
    ) -> AdapterResult<Document> {
        let id = match doc.get(ID_FIELD) {
            None | Some(Value::Null) => Uuid::new_v4().to_string(),
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(AdapterError::validation(
                    collection,
                    format!("id must be a string, got {other}"),
                ))
            }
        };
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        self.engine.write(
            txid(session),
            vec![Mutation::Insert {
                space: collection.to_string(),
                key: id,
                row: doc.clone(),
            }],
        )?;
        Ok(doc)
    }

    fn find(
        &self,
        session: Session<'_>,
        collection: &str,
        filter: &Where,
    ) -> AdapterResult<Vec<Document>> {
        Ok(self
            .engine
            .scan(txid(session), collection)?
            .unwrap_or_default()
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(|doc| filter.matches(doc))
            .collect())
    }

    fn replace(
        &self,
        session: Session<'_>,
        collection: &str,
        doc: Document,
    ) -> AdapterResult<Document> {
        let id = document_id(&doc)
            .ok_or_else(|| AdapterError::validation(collection, "replacement has no id"))?
            .to_string();
        self.engine.write(
            txid(session),
            vec![Mutation::Replace {
                space: collection.to_string(),
                key: id,
                row: doc.clone(),
            }],
        )?;
        Ok(doc)
    }

    fn delete(&self, session: Session<'_>, collection: &str, id: &str) -> AdapterResult<Document> {
        let existing = self
            .engine
            .get(txid(session), collection, id)?
            .ok_or_else(|| AdapterError::not_found(collection, id))?;
        self.engine.write(
            txid(session),
            vec![Mutation::Delete {
                space: collection.to_string(),
                key: id.to_string(),
            }],
        )?;
        Ok(existing)
    }

    fn create_collection(&self, session: Session<'_>, name: &str) -> AdapterResult<()> {
        self.engine.write(
            txid(session),
            vec![Mutation::CreateSpace {
                space: name.to_string(),
            }],
        )
    }

    fn drop_collection(&self, session: Session<'_>, name: &str) -> AdapterResult<()> {
        self.engine.write(
            txid(session),
            vec![Mutation::DropSpace {
                space: name.to_string(),
            }],
        )
    }

    fn create_index(
        &self,
        session: Session<'_>,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> AdapterResult<()> {
        self.engine.write(
            txid(session),
            vec![Mutation::CreateIndex {
                space: collection.to_string(),
                field: field.to_string(),
                unique,
            }],
        )
    }

    fn drop_index(
        &self,
        session: Session<'_>,
        collection: &str,
        field: &str,
    ) -> AdapterResult<()> {
        self.engine.write(
            txid(session),
            vec![Mutation::DropIndex {
                space: collection.to_string(),
                field: field.to_string(),
            }],
        )
    }

    fn collections(&self, session: Session<'_>) -> AdapterResult<Vec<String>> {
        self.engine.space_names(txid(session))
    }

    fn drop_all(&self) -> AdapterResult<usize> {
        self.engine.drop_all()
    }

    fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    fn close(&self) -> AdapterResult<usize> {
        self.engine.close()
    }
}
