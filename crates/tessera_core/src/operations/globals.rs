//! Global and global version executors.

use super::versions::create_version_in;
use super::{insert_stamped, update_by_id, update_existing, EntityKind, Operations, GLOBAL_TYPE_FIELD};
use crate::context::RequestContext;
use crate::document::{Document, PaginatedDocs, Query, Where};
use crate::error::{AdapterError, AdapterResult};
use crate::store::{Session, TransactionalStore};
use serde_json::Value;

fn find_global_in(
    store: &dyn TransactionalStore,
    session: Session<'_>,
    slug: &str,
) -> AdapterResult<Option<Document>> {
    let storage = EntityKind::Global.storage_name();
    Ok(store
        .find(session, &storage, &Where::eq(GLOBAL_TYPE_FIELD, slug))?
        .into_iter()
        .next())
}

impl Operations {
    /// Creates the global `slug`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the global already exists.
    pub fn create_global(
        &self,
        ctx: Option<&RequestContext>,
        slug: &str,
        mut data: Document,
    ) -> AdapterResult<Document> {
        let storage = EntityKind::Global.storage_name();
        data.insert(GLOBAL_TYPE_FIELD.to_string(), Value::String(slug.to_string()));
        self.coordinator.execute(ctx, |store, session| {
            if find_global_in(store, session, slug)?.is_some() {
                return Err(AdapterError::validation(
                    storage.as_str(),
                    format!("global '{slug}' already exists"),
                ));
            }
            insert_stamped(store, session, &storage, data)
        })
    }

    /// Returns the global `slug`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it was never created.
    pub fn find_global(&self, ctx: Option<&RequestContext>, slug: &str) -> AdapterResult<Document> {
        self.coordinator.execute(ctx, |store, session| {
            find_global_in(store, session, slug)?
                .ok_or_else(|| AdapterError::not_found(EntityKind::Global.storage_name(), slug))
        })
    }

    /// Shallow-merges `patch` into the global `slug`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it was never created.
    pub fn update_global(
        &self,
        ctx: Option<&RequestContext>,
        slug: &str,
        patch: &Document,
    ) -> AdapterResult<Document> {
        let storage = EntityKind::Global.storage_name();
        let mut patch = patch.clone();
        patch.remove(GLOBAL_TYPE_FIELD);
        self.coordinator.execute(ctx, |store, session| {
            let existing = find_global_in(store, session, slug)?
                .ok_or_else(|| AdapterError::not_found(storage.as_str(), slug))?;
            update_existing(store, session, &storage, existing, &patch)
        })
    }

    /// Records a new version of the global `slug`.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a backend error.
    pub fn create_global_version(
        &self,
        ctx: Option<&RequestContext>,
        slug: &str,
        version: Document,
    ) -> AdapterResult<Document> {
        let storage = EntityKind::GlobalVersions(slug.to_string()).storage_name();
        self.coordinator.execute(ctx, |store, session| {
            create_version_in(store, session, &storage, slug, version)
        })
    }

    /// Returns one page of version records of the global `slug`.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a backend error.
    pub fn find_global_versions(
        &self,
        ctx: Option<&RequestContext>,
        slug: &str,
        query: &Query,
    ) -> AdapterResult<PaginatedDocs> {
        let storage = EntityKind::GlobalVersions(slug.to_string()).storage_name();
        self.find(ctx, &storage, query)
    }

    /// Shallow-merges `patch` into the global version record with `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it doesn't exist.
    pub fn update_global_version(
        &self,
        ctx: Option<&RequestContext>,
        slug: &str,
        id: &str,
        patch: &Document,
    ) -> AdapterResult<Document> {
        let storage = EntityKind::GlobalVersions(slug.to_string()).storage_name();
        self.coordinator.execute(ctx, |store, session| {
            update_by_id(store, session, &storage, id, patch)
        })
    }
}
