//! Schema executors used by migrations.

use super::Operations;
use crate::context::RequestContext;
use crate::error::AdapterResult;

impl Operations {
    /// Creates a collection (a main and relationship table on relational backends).
    ///
    /// # Errors
    ///
    /// Returns `Validation` if it already exists.
    pub fn create_collection(&self, ctx: Option<&RequestContext>, name: &str) -> AdapterResult<()> {
        self.coordinator
            .execute(ctx, |store, session| store.create_collection(session, name))
    }

    /// Drops a collection and its documents.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if it doesn't exist.
    pub fn drop_collection(&self, ctx: Option<&RequestContext>, name: &str) -> AdapterResult<()> {
        self.coordinator
            .execute(ctx, |store, session| store.drop_collection(session, name))
    }

    /// Creates an index on `field`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if it exists or existing documents violate uniqueness.
    pub fn create_index(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        field: &str,
        unique: bool,
    ) -> AdapterResult<()> {
        self.coordinator.execute(ctx, |store, session| {
            store.create_index(session, collection, field, unique)
        })
    }

    /// Drops the index on `field`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if there is no such index.
    pub fn drop_index(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        field: &str,
    ) -> AdapterResult<()> {
        self.coordinator
            .execute(ctx, |store, session| store.drop_index(session, collection, field))
    }

    /// Lists collections visible to the context.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a backend error.
    pub fn collections(&self, ctx: Option<&RequestContext>) -> AdapterResult<Vec<String>> {
        self.coordinator
            .execute(ctx, |store, session| store.collections(session))
    }

    /// Drops every collection outside any transaction. Returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a journal error.
    pub fn drop_all(&self) -> AdapterResult<usize> {
        self.coordinator.execute(None, |store, _| store.drop_all())
    }
}
