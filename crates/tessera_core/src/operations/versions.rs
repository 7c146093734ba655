//! Collection version executors.
//!
//! A version record is `{parent, version, latest, createdAt, updatedAt}`.
//! Creating a version clears `latest` on the parent's previous versions, so
//! at most one version per parent is marked latest.

use super::{delete_matching, insert_stamped, update_by_id, update_existing, EntityKind, Operations};
use crate::context::RequestContext;
use crate::document::{Document, PaginatedDocs, Query, Where};
use crate::error::AdapterResult;
use crate::store::{Session, TransactionalStore};
use serde_json::Value;

/// Field linking a version to the document it snapshots.
pub const PARENT_FIELD: &str = "parent";

/// Field holding the snapshot itself.
pub const VERSION_FIELD: &str = "version";

/// Field flagging the newest version of a parent.
pub const LATEST_FIELD: &str = "latest";

/// Inserts a version record and demotes the parent's previous latest.
pub(super) fn create_version_in(
    store: &dyn TransactionalStore,
    session: Session<'_>,
    storage: &str,
    parent: &str,
    version: Document,
) -> AdapterResult<Document> {
    let mut demote = Document::new();
    demote.insert(LATEST_FIELD.to_string(), Value::Bool(false));

    let previous = Where::eq(PARENT_FIELD, parent).and(Where::eq(LATEST_FIELD, true));
    for existing in store.find(session, storage, &previous)? {
        update_existing(store, session, storage, existing, &demote)?;
    }

    let mut record = Document::new();
    record.insert(PARENT_FIELD.to_string(), Value::String(parent.to_string()));
    record.insert(VERSION_FIELD.to_string(), Value::Object(version));
    record.insert(LATEST_FIELD.to_string(), Value::Bool(true));
    insert_stamped(store, session, storage, record)
}

impl Operations {
    /// Records a new version of the document `parent` in `collection`.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a backend error.
    pub fn create_version(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        parent: &str,
        version: Document,
    ) -> AdapterResult<Document> {
        let storage = EntityKind::CollectionVersions(collection.to_string()).storage_name();
        self.coordinator.execute(ctx, |store, session| {
            create_version_in(store, session, &storage, parent, version)
        })
    }

    /// Returns one page of version records of `collection`.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a backend error.
    pub fn find_versions(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        query: &Query,
    ) -> AdapterResult<PaginatedDocs> {
        let storage = EntityKind::CollectionVersions(collection.to_string()).storage_name();
        self.find(ctx, &storage, query)
    }

    /// Shallow-merges `patch` into the version record with `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it doesn't exist.
    pub fn update_version(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        id: &str,
        patch: &Document,
    ) -> AdapterResult<Document> {
        let storage = EntityKind::CollectionVersions(collection.to_string()).storage_name();
        self.coordinator.execute(ctx, |store, session| {
            update_by_id(store, session, &storage, id, patch)
        })
    }

    /// Deletes every matching version record and returns them.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a backend error.
    pub fn delete_versions(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        filter: &Where,
    ) -> AdapterResult<Vec<Document>> {
        let storage = EntityKind::CollectionVersions(collection.to_string()).storage_name();
        self.coordinator.execute(ctx, |store, session| {
            delete_matching(store, session, &storage, filter)
        })
    }
}
