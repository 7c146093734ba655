//! Operation executors.
//!
//! [`Operations`] is the API the request-handling layer calls. Every method
//! takes an optional [`RequestContext`] and runs through
//! [`TransactionCoordinator::execute`], so it joins the context's open
//! transaction if there is one and runs standalone otherwise. A failure
//! inside a transaction rolls it back before the error is returned.
//!
//! Entity kinds map onto storage names:
//!
//! | Kind | Storage |
//! |------|---------|
//! | collection `posts` | `posts` |
//! | versions of `posts` | `_posts_versions` |
//! | globals | `_globals`, one document per `globalType` |
//! | versions of global `header` | `_header_global_versions` |

mod collections;
mod globals;
mod schema;
mod versions;

pub use versions::{LATEST_FIELD, PARENT_FIELD, VERSION_FIELD};

use crate::coordinator::TransactionCoordinator;
use crate::document::{
    document_id, merge, now_timestamp, Document, Where, CREATED_AT_FIELD, UPDATED_AT_FIELD,
};
use crate::error::{AdapterError, AdapterResult};
use crate::store::{Session, TransactionalStore};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Collection holding every global document.
pub const GLOBALS_COLLECTION: &str = "_globals";

/// Field identifying a global document.
pub const GLOBAL_TYPE_FIELD: &str = "globalType";

/// The kind of entity an operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Documents of a collection.
    Collection(String),
    /// Version history of a collection.
    CollectionVersions(String),
    /// Global singletons.
    Global,
    /// Version history of one global.
    GlobalVersions(String),
}

impl EntityKind {
    /// Returns the collection or table holding this kind.
    #[must_use]
    pub fn storage_name(&self) -> String {
        match self {
            Self::Collection(slug) => slug.clone(),
            Self::CollectionVersions(slug) => format!("_{slug}_versions"),
            Self::Global => GLOBALS_COLLECTION.to_string(),
            Self::GlobalVersions(slug) => format!("_{slug}_global_versions"),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_name())
    }
}

/// Transaction-aware CRUD over every entity kind.
#[derive(Debug, Clone)]
pub struct Operations {
    coordinator: Arc<TransactionCoordinator>,
}

impl Operations {
    /// Creates the executors over `coordinator`.
    #[must_use]
    pub fn new(coordinator: Arc<TransactionCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Returns the coordinator the executors run through.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }
}

fn stamp_created(doc: &mut Document) {
    let now = now_timestamp();
    doc.entry(CREATED_AT_FIELD.to_string())
        .or_insert_with(|| Value::String(now.clone()));
    doc.insert(UPDATED_AT_FIELD.to_string(), Value::String(now));
}

fn stamp_updated(doc: &mut Document) {
    doc.insert(UPDATED_AT_FIELD.to_string(), Value::String(now_timestamp()));
}

fn insert_stamped(
    store: &dyn TransactionalStore,
    session: Session<'_>,
    storage: &str,
    mut doc: Document,
) -> AdapterResult<Document> {
    stamp_created(&mut doc);
    store.insert(session, storage, doc)
}

fn fetch(
    store: &dyn TransactionalStore,
    session: Session<'_>,
    storage: &str,
    id: &str,
) -> AdapterResult<Document> {
    store
        .find(session, storage, &Where::id(id))?
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::not_found(storage, id))
}

fn update_existing(
    store: &dyn TransactionalStore,
    session: Session<'_>,
    storage: &str,
    mut existing: Document,
    patch: &Document,
) -> AdapterResult<Document> {
    merge(&mut existing, patch);
    stamp_updated(&mut existing);
    store.replace(session, storage, existing)
}

fn update_by_id(
    store: &dyn TransactionalStore,
    session: Session<'_>,
    storage: &str,
    id: &str,
    patch: &Document,
) -> AdapterResult<Document> {
    let existing = fetch(store, session, storage, id)?;
    update_existing(store, session, storage, existing, patch)
}

fn delete_matching(
    store: &dyn TransactionalStore,
    session: Session<'_>,
    storage: &str,
    filter: &Where,
) -> AdapterResult<Vec<Document>> {
    let matches = store.find(session, storage, filter)?;
    let mut deleted = Vec::with_capacity(matches.len());
    for doc in matches {
        let Some(id) = document_id(&doc) else { continue };
        deleted.push(store.delete(session, storage, id)?);
    }
    Ok(deleted)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_names() {
        assert_eq!(EntityKind::Collection("posts".into()).storage_name(), "posts");
        assert_eq!(
            EntityKind::CollectionVersions("posts".into()).storage_name(),
            "_posts_versions"
        );
        assert_eq!(EntityKind::Global.storage_name(), "_globals");
        assert_eq!(
            EntityKind::GlobalVersions("header".into()).to_string(),
            "_header_global_versions"
        );
    }

    #[test]
    fn created_stamp_is_kept_on_insert() {
        let mut doc = Document::new();
        doc.insert(CREATED_AT_FIELD.into(), Value::String("2020-01-01T00:00:00.000Z".into()));
        stamp_created(&mut doc);
        assert_eq!(doc[CREATED_AT_FIELD], "2020-01-01T00:00:00.000Z");
        assert!(doc.contains_key(UPDATED_AT_FIELD));
    }
}
