//! Relational backend.
//!
//! Each collection maps to a main table plus a `<collection>_rels` table.
//! Non-empty array fields are stored as relationship rows
//! `{parent, path, order, value}`, so a single logical write becomes several
//! statements. Inside a transaction they are buffered together; without one
//! each statement commits on its own.

use super::engine::{Engine, EngineStats, Mutation};
use super::{txid, Session, TransactionHandle, TransactionalStore};
use crate::config::{AdapterConfig, BackendKind};
use crate::document::{document_id, Document, Where, ID_FIELD};
use crate::error::{AdapterError, AdapterResult};
use crate::types::SequenceNumber;
use serde_json::Value;
use std::collections::BTreeMap;
use tessera_journal::Journal;

const RELS_SUFFIX: &str = "_rels";

fn rels_table(collection: &str) -> String {
    format!("{collection}{RELS_SUFFIX}")
}

/// Key of one relationship row: the JSON array `[parent, path, order]`.
///
/// Ids and field names may contain any character, so the parts are encoded
/// rather than joined with a separator.
fn rel_key(id: &str, field: &str, order: usize) -> String {
    Value::Array(vec![id.into(), field.into(), order.into()]).to_string()
}

/// Splits a document into its main row and relationship rows.
fn split(id: &str, doc: &Document) -> (Document, Vec<(String, Document)>) {
    let mut main = Document::new();
    let mut rels = Vec::new();
    for (field, value) in doc {
        match value {
            Value::Array(items) if !items.is_empty() => {
                for (order, item) in items.iter().enumerate() {
                    let key = rel_key(id, field, order);
                    let mut row = Document::new();
                    row.insert(ID_FIELD.to_string(), Value::String(key.clone()));
                    row.insert("parent".to_string(), Value::String(id.to_string()));
                    row.insert("path".to_string(), Value::String(field.clone()));
                    row.insert("order".to_string(), Value::from(order));
                    row.insert("value".to_string(), item.clone());
                    rels.push((key, row));
                }
            }
            _ => {
                main.insert(field.clone(), value.clone());
            }
        }
    }
    (main, rels)
}

/// Reattaches relationship rows to their parents.
fn assemble(main: Vec<(String, Document)>, rels: Vec<(String, Document)>) -> Vec<Document> {
    let mut grouped: BTreeMap<String, BTreeMap<String, Vec<(u64, Value)>>> = BTreeMap::new();
    for (_, row) in rels {
        let (Some(parent), Some(path)) = (
            row.get("parent").and_then(Value::as_str),
            row.get("path").and_then(Value::as_str),
        ) else {
            continue;
        };
        let order = row.get("order").and_then(Value::as_u64).unwrap_or(0);
        let value = row.get("value").cloned().unwrap_or(Value::Null);
        grouped
            .entry(parent.to_string())
            .or_default()
            .entry(path.to_string())
            .or_default()
            .push((order, value));
    }

    main.into_iter()
        .map(|(key, mut doc)| {
            if let Some(paths) = grouped.remove(&key) {
                for (path, mut items) in paths {
                    items.sort_by_key(|(order, _)| *order);
                    let values = items.into_iter().map(|(_, v)| v).collect();
                    doc.insert(path, Value::Array(values));
                }
            }
            doc
        })
        .collect()
}

/// Relational store: serial ids, main and relationship tables.
///
/// With `push_schema` enabled missing tables are created by the first write;
/// otherwise writes to a missing table fail with `Validation` until a
/// migration creates it.
#[derive(Debug)]
pub struct RelationalStore {
    engine: Engine,
    transactions: bool,
}

impl RelationalStore {
    /// Opens a relational store over `journal`.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be replayed.
    pub fn open(journal: Box<dyn Journal>, config: &AdapterConfig) -> AdapterResult<Self> {
        Ok(Self {
            engine: Engine::open(journal, config.push_schema, config.sync_on_commit)?,
            transactions: config.transactions,
        })
    }

    /// Runs statements in the session's transaction, or one commit per statement.
    fn execute(&self, session: Session<'_>, statements: Vec<Mutation>) -> AdapterResult<()> {
        match txid(session) {
            Some(txid) => self.engine.write(Some(txid), statements),
            None => {
                for statement in statements {
                    self.engine.write(None, vec![statement])?;
                }
                Ok(())
            }
        }
    }

    /// Reads the main and relationship tables from one snapshot.
    fn rows(
        &self,
        session: Session<'_>,
        collection: &str,
    ) -> AdapterResult<(Vec<(String, Document)>, Vec<(String, Document)>)> {
        let rels_space = rels_table(collection);
        let [main, rels] = self
            .engine
            .snapshot(txid(session), [collection, rels_space.as_str()])?;
        Ok((main.unwrap_or_default(), rels.unwrap_or_default()))
    }

    fn rel_keys_of(rels: &[(String, Document)], parent: &str) -> Vec<String> {
        rels.iter()
            .filter(|(_, row)| row.get("parent").and_then(Value::as_str) == Some(parent))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl TransactionalStore for RelationalStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn supports_transactions(&self) -> bool {
        self.transactions
    }

    fn begin(&self) -> AdapterResult<TransactionHandle> {
        self.engine.begin_handle(BackendKind::Relational, self.transactions)
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
            None | Some(Value::Null) => self.engine.next_serial(collection).to_string(),
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(AdapterError::validation(
                    collection,
                    format!("id must be a string or number, got {other}"),
                ))
            }
        };
        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));

        let (main, rels) = split(&id, &doc);
        let rels_space = rels_table(collection);
        let mut statements = vec![Mutation::Insert {
            space: collection.to_string(),
            key: id,
            row: main,
        }];
        statements.extend(rels.into_iter().map(|(key, row)| Mutation::Insert {
            space: rels_space.clone(),
            key,
            row,
        }));

        self.execute(session, statements)?;
        Ok(doc)
    }

    fn find(
        &self,
        session: Session<'_>,
        collection: &str,
        filter: &Where,
    ) -> AdapterResult<Vec<Document>> {
        let (main, rels) = self.rows(session, collection)?;
        Ok(assemble(main, rels)
            .into_iter()
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
        let (_, existing_rels) = self.rows(session, collection)?;
        let rels_space = rels_table(collection);

        let (main, rels) = split(&id, &doc);
        let mut statements = vec![Mutation::Replace {
            space: collection.to_string(),
            key: id.clone(),
            row: main,
        }];
        statements.extend(
            Self::rel_keys_of(&existing_rels, &id)
                .into_iter()
                .map(|key| Mutation::Delete {
                    space: rels_space.clone(),
                    key,
                }),
        );
        statements.extend(rels.into_iter().map(|(key, row)| Mutation::Insert {
            space: rels_space.clone(),
            key,
            row,
        }));

        self.execute(session, statements)?;
        Ok(doc)
    }

    fn delete(&self, session: Session<'_>, collection: &str, id: &str) -> AdapterResult<Document> {
        let (main, rels) = self.rows(session, collection)?;
        let rel_keys = Self::rel_keys_of(&rels, id);
        let existing = assemble(main, rels)
            .into_iter()
            .find(|doc| document_id(doc) == Some(id))
            .ok_or_else(|| AdapterError::not_found(collection, id))?;

        let rels_space = rels_table(collection);
        let mut statements = vec![Mutation::Delete {
            space: collection.to_string(),
            key: id.to_string(),
        }];
        statements.extend(rel_keys.into_iter().map(|key| Mutation::Delete {
            space: rels_space.clone(),
            key,
        }));

        self.execute(session, statements)?;
        Ok(existing)
    }

    fn create_collection(&self, session: Session<'_>, name: &str) -> AdapterResult<()> {
        self.execute(
            session,
            vec![
                Mutation::CreateSpace {
                    space: name.to_string(),
                },
                Mutation::CreateSpace {
                    space: rels_table(name),
                },
            ],
        )
    }

    fn drop_collection(&self, session: Session<'_>, name: &str) -> AdapterResult<()> {
        let rels_space = rels_table(name);
        let has_rels = self
            .engine
            .space_names(txid(session))?
            .contains(&rels_space);

        let mut statements = vec![Mutation::DropSpace {
            space: name.to_string(),
        }];
        if has_rels {
            statements.push(Mutation::DropSpace { space: rels_space });
        }
        self.execute(session, statements)
    }

    fn create_index(
        &self,
        session: Session<'_>,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> AdapterResult<()> {
        self.execute(
            session,
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
        self.execute(
            session,
            vec![Mutation::DropIndex {
                space: collection.to_string(),
                field: field.to_string(),
            }],
        )
    }

    fn collections(&self, session: Session<'_>) -> AdapterResult<Vec<String>> {
        Ok(self
            .engine
            .space_names(txid(session))?
            .into_iter()
            .filter(|name| !name.ends_with(RELS_SUFFIX))
            .collect())
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tessera_journal::MemoryJournal;

    fn store(push_schema: bool) -> RelationalStore {
        let config = AdapterConfig::default()
            .backend(BackendKind::Relational)
            .push_schema(push_schema);
        RelationalStore::open(Box::new(MemoryJournal::new()), &config).unwrap()
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn serial_ids() {
        let store = store(true);
        let a = store.insert(None, "posts", doc(json!({"title": "a"}))).unwrap();
        let b = store.insert(None, "posts", doc(json!({"title": "b"}))).unwrap();
        assert_eq!(document_id(&a), Some("1"));
        assert_eq!(document_id(&b), Some("2"));
    }

    #[test]
    fn arrays_round_trip_through_rels_table() {
        let store = store(true);
        store
            .insert(None, "posts", doc(json!({"title": "a", "tags": ["x", "y", "z"]})))
            .unwrap();

        let rels = store.engine.scan(None, "posts_rels").unwrap().unwrap();
        assert_eq!(rels.len(), 3);

        let found = store.find(None, "posts", &Where::All).unwrap();
        assert_eq!(found[0]["tags"], json!(["x", "y", "z"]));
        assert_eq!(store.collections(None).unwrap(), vec!["posts".to_string()]);
    }

    #[test]
    fn replace_rewrites_relationship_rows() {
        let store = store(true);
        let saved = store
            .insert(None, "posts", doc(json!({"tags": ["x", "y"]})))
            .unwrap();

        let mut updated = saved.clone();
        updated.insert("tags".into(), json!(["z"]));
        store.replace(None, "posts", updated).unwrap();

        let found = store.find(None, "posts", &Where::All).unwrap();
        assert_eq!(found[0]["tags"], json!(["z"]));
        assert_eq!(store.engine.scan(None, "posts_rels").unwrap().unwrap().len(), 1);
    }

    #[test]
    fn missing_table_rejected_without_push_schema() {
        let store = store(false);
        let result = store.insert(None, "posts", doc(json!({"title": "a"})));
        assert!(matches!(result, Err(AdapterError::Validation { .. })));

        store.create_collection(None, "posts").unwrap();
        store
            .insert(None, "posts", doc(json!({"title": "a", "tags": ["t"]})))
            .unwrap();
    }

    #[test]
    fn relationship_keys_do_not_collide_across_ids_and_fields() {
        let store = store(true);
        store
            .insert(None, "posts", doc(json!({"id": "a:b", "c": [1]})))
            .unwrap();
        store
            .insert(None, "posts", doc(json!({"id": "a", "b:c": [2]})))
            .unwrap();

        assert_ne!(rel_key("a:b", "c", 0), rel_key("a", "b:c", 0));
        let found = store.find(None, "posts", &Where::id("a")).unwrap();
        assert_eq!(found[0]["b:c"], json!([2]));
        let found = store.find(None, "posts", &Where::id("a:b")).unwrap();
        assert_eq!(found[0]["c"], json!([1]));
    }

    #[test]
    fn reads_never_mix_two_commits() {
        let store = store(true);
        store
            .insert(None, "posts", doc(json!({"id": "1", "n": 1, "tags": ["z"]})))
            .unwrap();
        let done = std::sync::atomic::AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..300 {
                    let next = if i % 2 == 0 {
                        json!({"id": "1", "n": 2, "tags": ["x", "y"]})
                    } else {
                        json!({"id": "1", "n": 1, "tags": ["z"]})
                    };
                    let handle = store.begin().unwrap();
                    store.replace(Some(&handle), "posts", doc(next)).unwrap();
                    store.commit(&handle).unwrap();
                }
                done.store(true, std::sync::atomic::Ordering::SeqCst);
            });

            let mut torn = 0;
            while !done.load(std::sync::atomic::Ordering::SeqCst) {
                let found = store.find(None, "posts", &Where::All).unwrap();
                let n = found[0]["n"].as_u64().unwrap();
                let tags = found[0]["tags"].as_array().map_or(0, Vec::len) as u64;
                if n != tags {
                    torn += 1;
                }
            }
            assert_eq!(torn, 0);
        });
    }

    #[test]
    fn standalone_write_is_not_atomic_across_tables() {
        let store = store(false);
        store
            .engine
            .write(
                None,
                vec![Mutation::CreateSpace {
                    space: "posts".into(),
                }],
            )
            .unwrap();

        let result = store.insert(None, "posts", doc(json!({"tags": ["t"]})));
        assert!(result.is_err());
        // the main row committed before the relationship statement failed
        assert_eq!(store.engine.scan(None, "posts").unwrap().unwrap().len(), 1);
    }

    #[test]
    fn transactional_write_is_atomic_across_tables() {
        let store = store(false);
        store
            .engine
            .write(
                None,
                vec![Mutation::CreateSpace {
                    space: "posts".into(),
                }],
            )
            .unwrap();

        let handle = store.begin().unwrap();
        let result = store.insert(Some(&handle), "posts", doc(json!({"tags": ["t"]})));
        assert!(result.is_err());
        store.rollback(&handle).unwrap();

        assert!(store.engine.scan(None, "posts").unwrap().unwrap().is_empty());
    }
}
