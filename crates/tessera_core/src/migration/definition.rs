//! Migration definitions and the context they run in.

use crate::context::RequestContext;
use crate::document::{Document, Where};
use crate::error::AdapterResult;
use crate::operations::Operations;

/// An operation performed during a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOperation {
    /// Created a collection.
    CreateCollection {
        /// Name of the collection.
        name: String,
    },
    /// Dropped a collection.
    DropCollection {
        /// Name of the collection.
        name: String,
    },
    /// Created an index.
    CreateIndex {
        /// Collection the index is on.
        collection: String,
        /// Indexed field.
        field: String,
    },
    /// Dropped an index.
    DropIndex {
        /// Collection the index was on.
        collection: String,
        /// Indexed field.
        field: String,
    },
    /// Inserted a document.
    Insert {
        /// Target collection.
        collection: String,
    },
    /// Deleted documents.
    Delete {
        /// Target collection.
        collection: String,
        /// Number of documents deleted.
        count: usize,
    },
    /// Free-form step recorded by migration code.
    Custom {
        /// Description of the step.
        description: String,
    },
}

/// Context passed to `up` and `down`.
///
/// Every step goes through the operation executors with the run's request
/// context, so it joins the run's transaction. Steps are recorded for
/// logging.
#[derive(Debug)]
pub struct MigrationContext<'a> {
    operations: &'a Operations,
    ctx: &'a RequestContext,
    performed: Vec<MigrationOperation>,
}

impl<'a> MigrationContext<'a> {
    /// Creates a context running steps as `ctx`.
    #[must_use]
    pub fn new(operations: &'a Operations, ctx: &'a RequestContext) -> Self {
        Self {
            operations,
            ctx,
            performed: Vec::new(),
        }
    }

    /// Returns the executors, for steps the helpers below don't cover.
    #[must_use]
    pub fn operations(&self) -> &'a Operations {
        self.operations
    }

    /// Returns the request context of the run.
    #[must_use]
    pub fn request_context(&self) -> &'a RequestContext {
        self.ctx
    }

    /// Returns the steps performed so far.
    #[must_use]
    pub fn performed(&self) -> &[MigrationOperation] {
        &self.performed
    }

    /// Creates a collection.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if it already exists.
    pub fn create_collection(&mut self, name: &str) -> AdapterResult<()> {
        self.operations.create_collection(Some(self.ctx), name)?;
        self.performed.push(MigrationOperation::CreateCollection {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Drops a collection.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if it doesn't exist.
    pub fn drop_collection(&mut self, name: &str) -> AdapterResult<()> {
        self.operations.drop_collection(Some(self.ctx), name)?;
        self.performed.push(MigrationOperation::DropCollection {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Creates an index.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if it exists or existing documents violate uniqueness.
    pub fn create_index(&mut self, collection: &str, field: &str, unique: bool) -> AdapterResult<()> {
        self.operations
            .create_index(Some(self.ctx), collection, field, unique)?;
        self.performed.push(MigrationOperation::CreateIndex {
            collection: collection.to_string(),
            field: field.to_string(),
        });
        Ok(())
    }

    /// Drops an index.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if there is no such index.
    pub fn drop_index(&mut self, collection: &str, field: &str) -> AdapterResult<()> {
        self.operations.drop_index(Some(self.ctx), collection, field)?;
        self.performed.push(MigrationOperation::DropIndex {
            collection: collection.to_string(),
            field: field.to_string(),
        });
        Ok(())
    }

    /// Inserts a document.
    ///
    /// # Errors
    ///
    /// Returns `Validation` on constraint violations.
    pub fn insert(&mut self, collection: &str, doc: Document) -> AdapterResult<Document> {
        let saved = self.operations.create(Some(self.ctx), collection, doc)?;
        self.performed.push(MigrationOperation::Insert {
            collection: collection.to_string(),
        });
        Ok(saved)
    }

    /// Deletes matching documents and returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or a backend error.
    pub fn delete(&mut self, collection: &str, filter: &Where) -> AdapterResult<usize> {
        let count = self
            .operations
            .delete_many(Some(self.ctx), collection, filter)?
            .len();
        self.performed.push(MigrationOperation::Delete {
            collection: collection.to_string(),
            count,
        });
        Ok(count)
    }

    /// Records a step performed through [`Self::operations`].
    pub fn note(&mut self, description: impl Into<String>) {
        self.performed.push(MigrationOperation::Custom {
            description: description.into(),
        });
    }
}

/// A schema migration.
///
/// Names order migrations lexically, so they normally start with a
/// `YYYYMMDD_HHMMSS_` timestamp.
pub trait Migration: Send + Sync {
    /// Returns the unique name of this migration.
    fn name(&self) -> &str;

    /// Applies the migration.
    ///
    /// # Errors
    ///
    /// Any error aborts the whole batch.
    fn up(&self, ctx: &mut MigrationContext<'_>) -> AdapterResult<()>;

    /// Reverts the migration. Reverting is best-effort.
    ///
    /// # Errors
    ///
    /// Any error stops the revert run.
    fn down(&self, ctx: &mut MigrationContext<'_>) -> AdapterResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use crate::operations::test_support::{doc, operations};
    use serde_json::json;

    #[test]
    fn steps_are_recorded_and_join_the_transaction() {
        let ops = operations(AdapterConfig::default());
        let ctx = RequestContext::new();
        ops.coordinator().init_transaction(&ctx).unwrap();

        let mut mctx = MigrationContext::new(&ops, &ctx);
        mctx.create_collection("users").unwrap();
        mctx.create_index("users", "email", true).unwrap();
        mctx.insert("users", doc(json!({"email": "a@x"}))).unwrap();
        mctx.note("seeded admin");

        assert_eq!(mctx.performed().len(), 4);
        assert_eq!(
            mctx.performed()[0],
            MigrationOperation::CreateCollection {
                name: "users".into()
            }
        );
        assert!(ops.collections(None).unwrap().is_empty());

        ops.coordinator().commit_transaction(&ctx).unwrap();
        assert_eq!(ops.collections(None).unwrap(), vec!["users".to_string()]);
    }
}
