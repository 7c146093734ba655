//! Collection document executors.

use super::{delete_matching, fetch, insert_stamped, update_by_id, update_existing, Operations};
use crate::context::RequestContext;
use crate::document::{Document, PaginatedDocs, Query, Where};
use crate::error::AdapterResult;

impl Operations {
    /// Inserts a document and returns it with `id` and timestamps.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on duplicate ids or unique index violations.
    pub fn create(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        data: Document,
    ) -> AdapterResult<Document> {
        self.coordinator.execute(ctx, |store, session| {
            insert_stamped(store, session, collection, data)
        })
    }

    /// Returns one page of matching documents.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a backend error.
    pub fn find(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        query: &Query,
    ) -> AdapterResult<PaginatedDocs> {
        let matches = self
            .coordinator
            .execute(ctx, |store, session| store.find(session, collection, &query.filter))?;
        Ok(PaginatedDocs::paginate(matches, query))
    }

    /// Returns the first matching document, if any.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a backend error.
    pub fn find_one(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        filter: &Where,
    ) -> AdapterResult<Option<Document>> {
        self.coordinator.execute(ctx, |store, session| {
            Ok(store.find(session, collection, filter)?.into_iter().next())
        })
    }

    /// Returns the document with `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it doesn't exist in the session's view.
    pub fn find_by_id(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        id: &str,
    ) -> AdapterResult<Document> {
        self.coordinator
            .execute(ctx, |store, session| fetch(store, session, collection, id))
    }

    /// Counts matching documents.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a backend error.
    pub fn count(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        filter: &Where,
    ) -> AdapterResult<usize> {
        self.coordinator.execute(ctx, |store, session| {
            Ok(store.find(session, collection, filter)?.len())
        })
    }

    /// Shallow-merges `patch` into the document with `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it doesn't exist.
    pub fn update(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        id: &str,
        patch: &Document,
    ) -> AdapterResult<Document> {
        self.coordinator.execute(ctx, |store, session| {
            update_by_id(store, session, collection, id, patch)
        })
    }

    /// Shallow-merges `patch` into every matching document.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if an update violates a unique index.
    pub fn update_many(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        filter: &Where,
        patch: &Document,
    ) -> AdapterResult<Vec<Document>> {
        self.coordinator.execute(ctx, |store, session| {
            store
                .find(session, collection, filter)?
                .into_iter()
                .map(|doc| update_existing(store, session, collection, doc, patch))
                .collect()
        })
    }

    /// Updates the first matching document, or creates one from `data`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on constraint violations.
    pub fn upsert(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        filter: &Where,
        data: Document,
    ) -> AdapterResult<Document> {
        self.coordinator.execute(ctx, |store, session| {
            match store.find(session, collection, filter)?.into_iter().next() {
                Some(existing) => update_existing(store, session, collection, existing, &data),
                None => insert_stamped(store, session, collection, data),
            }
        })
    }

    /// Deletes the document with `id` and returns it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it doesn't exist.
    pub fn delete(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        id: &str,
    ) -> AdapterResult<Document> {
        self.coordinator
            .execute(ctx, |store, session| store.delete(session, collection, id))
    }

    /// Deletes every matching document and returns them.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a backend error.
    pub fn delete_many(
        &self,
        ctx: Option<&RequestContext>,
        collection: &str,
        filter: &Where,
    ) -> AdapterResult<Vec<Document>> {
        self.coordinator.execute(ctx, |store, session| {
            delete_matching(store, session, collection, filter)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{doc, operations};
    use crate::config::{AdapterConfig, BackendKind};
    use crate::context::RequestContext;
    use crate::document::{document_id, Query, Sort, Where, CREATED_AT_FIELD, UPDATED_AT_FIELD};
    use crate::error::AdapterError;
    use serde_json::json;

    #[test]
    fn create_then_find_by_id() {
        let ops = operations(AdapterConfig::default());
        let saved = ops.create(None, "posts", doc(json!({"title": "a"}))).unwrap();
        assert!(saved.contains_key(CREATED_AT_FIELD));
        assert!(saved.contains_key(UPDATED_AT_FIELD));

        let id = document_id(&saved).unwrap();
        assert_eq!(ops.find_by_id(None, "posts", id).unwrap()["title"], json!("a"));
        assert!(ops.find_by_id(None, "posts", "missing").unwrap_err().is_not_found());
    }

    #[test]
    fn find_paginates_and_sorts() {
        let ops = operations(AdapterConfig::default());
        for n in 0..5 {
            ops.create(None, "posts", doc(json!({ "n": n }))).unwrap();
        }

        let page = ops
            .find(None, "posts", &Query::all().sort(Sort::desc("n")).limit(2).page(2))
            .unwrap();
        assert_eq!(page.total_docs, 5);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next_page && page.has_prev_page);
        assert_eq!(page.docs[0]["n"], json!(2));
        assert_eq!(page.docs[1]["n"], json!(1));
    }

    #[test]
    fn update_merges_and_keeps_id() {
        let ops = operations(AdapterConfig::default().backend(BackendKind::Relational));
        let saved = ops
            .create(None, "posts", doc(json!({"title": "a", "tags": ["x"]})))
            .unwrap();
        let id = document_id(&saved).unwrap().to_string();

        let updated = ops
            .update(None, "posts", &id, &doc(json!({"id": "other", "title": "b"})))
            .unwrap();
        assert_eq!(document_id(&updated), Some(id.as_str()));
        assert_eq!(updated["title"], json!("b"));
        assert_eq!(updated["tags"], json!(["x"]));
    }

    #[test]
    fn update_many_upsert_and_delete_many() {
        let ops = operations(AdapterConfig::default());
        ops.create(None, "posts", doc(json!({"status": "draft"}))).unwrap();
        ops.create(None, "posts", doc(json!({"status": "draft"}))).unwrap();

        let published = ops
            .update_many(
                None,
                "posts",
                &Where::eq("status", "draft"),
                &doc(json!({"status": "published"})),
            )
            .unwrap();
        assert_eq!(published.len(), 2);

        let filter = Where::eq("slug", "about");
        ops.upsert(None, "pages", &filter, doc(json!({"slug": "about", "v": 1})))
            .unwrap();
        ops.upsert(None, "pages", &filter, doc(json!({"v": 2}))).unwrap();
        assert_eq!(ops.count(None, "pages", &Where::All).unwrap(), 1);
        assert_eq!(
            ops.find_one(None, "pages", &filter).unwrap().unwrap()["v"],
            json!(2)
        );

        let deleted = ops
            .delete_many(None, "posts", &Where::eq("status", "published"))
            .unwrap();
        assert_eq!(deleted.len(), 2);
        assert_eq!(ops.count(None, "posts", &Where::All).unwrap(), 0);
    }

    #[test]
    fn uncommitted_create_invisible_without_context() {
        let ops = operations(AdapterConfig::default());
        let ctx = RequestContext::new();
        ops.coordinator().init_transaction(&ctx).unwrap();

        let saved = ops.create(Some(&ctx), "posts", doc(json!({"title": "a"}))).unwrap();
        let id = document_id(&saved).unwrap();

        assert!(matches!(
            ops.find_by_id(None, "posts", id),
            Err(AdapterError::NotFound { .. })
        ));
        assert!(ops.find_by_id(Some(&ctx), "posts", id).is_ok());

        ops.coordinator().commit_transaction(&ctx).unwrap();
        assert_eq!(ops.find_by_id(None, "posts", id).unwrap()["title"], json!("a"));
    }
}
