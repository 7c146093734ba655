//! Transaction coordinator.
//!
//! Per request context the lifecycle is
//! `NoTransaction -> Open -> {Committed, RolledBack}`; both terminal states
//! remove the registry entry, so the context is back to `NoTransaction`.
//! Nested `init_transaction` calls join the open transaction instead of
//! opening savepoints.

use crate::connection::ConnectionManager;
use crate::context::RequestContext;
use crate::error::{AdapterError, AdapterResult};
use crate::registry::SessionRegistry;
use crate::store::{Session, TransactionalStore};
use crate::types::{SequenceNumber, TransactionId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Transaction state of one request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction is registered.
    NoTransaction,
    /// A transaction is open.
    Open(TransactionId),
}

/// Result of `init_transaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionRef {
    /// The open backend transaction.
    pub id: TransactionId,
    /// True only for the call that began the transaction.
    ///
    /// Scopes that joined an existing transaction must leave the commit to
    /// the scope that started it.
    pub started: bool,
}

/// Begin/commit/rollback protocol over the session registry.
#[derive(Debug)]
pub struct TransactionCoordinator {
    connection: Arc<ConnectionManager>,
    registry: Arc<SessionRegistry>,
}

impl TransactionCoordinator {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(connection: Arc<ConnectionManager>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            connection,
            registry,
        }
    }

    /// Returns the session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Opens a transaction for `ctx`, or joins the one already open.
    ///
    /// Concurrent calls for the same context serialize on its registry slot,
    /// so exactly one backend transaction is begun.
    ///
    /// # Errors
    ///
    /// Returns `TransactionUnsupported` if the backend runs without
    /// transactions, or `NotConnected`.
    pub fn init_transaction(&self, ctx: &RequestContext) -> AdapterResult<TransactionRef> {
        let store = self.connection.store()?;
        if !store.supports_transactions() {
            return Err(AdapterError::TransactionUnsupported);
        }

        self.registry.with_session(ctx.id(), |slot| {
            if let Some(handle) = &slot.handle {
                slot.refs += 1;
                return Ok(TransactionRef {
                    id: handle.id(),
                    started: false,
                });
            }

            let handle = store.begin()?;
            let id = handle.id();
            slot.handle = Some(handle);
            slot.refs = 1;
            debug!(context = %ctx.id(), transaction = %id, "transaction started");
            Ok(TransactionRef { id, started: true })
        })
    }

    /// Like `init_transaction`, but maps `TransactionUnsupported` to `None`
    /// so callers can proceed transaction-less.
    ///
    /// # Errors
    ///
    /// Returns any other error from `init_transaction`.
    pub fn try_init_transaction(
        &self,
        ctx: &RequestContext,
    ) -> AdapterResult<Option<TransactionRef>> {
        match self.init_transaction(ctx) {
            Ok(txn) => Ok(Some(txn)),
            Err(AdapterError::TransactionUnsupported) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Commits the transaction of `ctx`.
    ///
    /// Returns `None` if no transaction was open. The registry entry is
    /// cleared whether or not the commit succeeds.
    ///
    /// # Errors
    ///
    /// Returns the backend's commit error (e.g. `WriteConflict`).
    pub fn commit_transaction(&self, ctx: &RequestContext) -> AdapterResult<Option<SequenceNumber>> {
        self.registry.with_session(ctx.id(), |slot| {
            let Some(handle) = slot.handle.take() else {
                return Ok(None);
            };
            slot.refs = 0;

            let result = self.connection.store().and_then(|store| store.commit(&handle));
            match &result {
                Ok(seq) => {
                    debug!(context = %ctx.id(), transaction = %handle.id(), %seq, "transaction committed")
                }
                Err(e) => {
                    warn!(context = %ctx.id(), transaction = %handle.id(), error = %e, "commit failed")
                }
            }
            result.map(Some)
        })
    }

    /// Rolls back the transaction of `ctx`.
    ///
    /// Returns false if no transaction was open. The registry entry is
    /// cleared whether or not the rollback succeeds.
    ///
    /// # Errors
    ///
    /// Returns the backend's rollback error.
    pub fn rollback_transaction(&self, ctx: &RequestContext) -> AdapterResult<bool> {
        self.registry.with_session(ctx.id(), |slot| {
            let Some(handle) = slot.handle.take() else {
                return Ok(false);
            };
            slot.refs = 0;

            self.connection
                .store()
                .and_then(|store| store.rollback(&handle))?;
            debug!(context = %ctx.id(), transaction = %handle.id(), "transaction rolled back");
            Ok(true)
        })
    }

    /// Runs one executor step in the session resolved for `ctx`.
    ///
    /// Without a context, or with a context that has no open transaction,
    /// the step runs standalone. If the step fails inside a transaction, the
    /// transaction is rolled back and cleared before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the step's error unchanged, or `NotConnected`.
    pub fn execute<T>(
        &self,
        ctx: Option<&RequestContext>,
        op: impl FnOnce(&dyn TransactionalStore, Session<'_>) -> AdapterResult<T>,
    ) -> AdapterResult<T> {
        let store = self.connection.store()?;
        let Some(ctx) = ctx else {
            return op(store.as_ref(), None);
        };

        self.registry.with_session(ctx.id(), |slot| {
            let result = op(store.as_ref(), slot.handle.as_ref());
            if let Err(e) = &result {
                if let Some(handle) = slot.handle.take() {
                    slot.refs = 0;
                    match store.rollback(&handle) {
                        Ok(()) => debug!(
                            context = %ctx.id(),
                            transaction = %handle.id(),
                            error = %e,
                            "transaction rolled back after failed operation"
                        ),
                        Err(rollback_err) => warn!(
                            context = %ctx.id(),
                            transaction = %handle.id(),
                            error = %rollback_err,
                            "rollback after failed operation failed"
                        ),
                    }
                }
            }
            result
        })
    }

    /// Runs `f` inside a transaction for `ctx`.
    ///
    /// Commits only if this call started the transaction; a nested call joins
    /// the outer one. On error the transaction is rolled back. If the backend
    /// has no transactions, `f` runs transaction-less.
    ///
    /// # Errors
    ///
    /// Returns the error of `f` or of the commit.
    pub fn transaction<T>(
        &self,
        ctx: &RequestContext,
        f: impl FnOnce(&RequestContext) -> AdapterResult<T>,
    ) -> AdapterResult<T> {
        let txn = self.try_init_transaction(ctx)?;
        match f(ctx) {
            Ok(value) => {
                if txn.is_some_and(|t| t.started) {
                    self.commit_transaction(ctx)?;
                }
                Ok(value)
            }
            Err(e) => {
                if txn.is_some() {
                    if let Err(rollback_err) = self.rollback_transaction(ctx) {
                        warn!(context = %ctx.id(), error = %rollback_err, "rollback failed");
                    }
                }
                Err(e)
            }
        }
    }

    /// Returns the transaction state of `ctx`.
    #[must_use]
    pub fn state(&self, ctx: &RequestContext) -> TransactionState {
        match self.registry.get_session(ctx.id()) {
            Some(info) => TransactionState::Open(info.transaction),
            None => TransactionState::NoTransaction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use crate::document::{Document, Where};
    use serde_json::{json, Value};

    fn coordinator(config: AdapterConfig) -> TransactionCoordinator {
        let registry = Arc::new(SessionRegistry::new());
        let connection = Arc::new(ConnectionManager::new(Arc::clone(&registry)));
        connection.connect(&config).unwrap();
        TransactionCoordinator::new(connection, registry)
    }

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn insert(
        coordinator: &TransactionCoordinator,
        ctx: Option<&RequestContext>,
        value: Value,
    ) -> AdapterResult<Document> {
        coordinator.execute(ctx, |store, session| store.insert(session, "posts", doc(value)))
    }

    fn count(coordinator: &TransactionCoordinator, ctx: Option<&RequestContext>) -> usize {
        coordinator
            .execute(ctx, |store, session| store.find(session, "posts", &Where::All))
            .unwrap()
            .len()
    }

    #[test]
    fn nested_init_joins_open_transaction() {
        let coordinator = coordinator(AdapterConfig::default());
        let ctx = RequestContext::new();

        let outer = coordinator.init_transaction(&ctx).unwrap();
        let inner = coordinator.init_transaction(&ctx).unwrap();
        assert!(outer.started);
        assert!(!inner.started);
        assert_eq!(outer.id, inner.id);
        assert_eq!(coordinator.registry().get_session(ctx.id()).unwrap().refs, 2);
    }

    #[test]
    fn commit_clears_entry_and_publishes_writes() {
        let coordinator = coordinator(AdapterConfig::default());
        let ctx = RequestContext::new();
        coordinator.init_transaction(&ctx).unwrap();
        insert(&coordinator, Some(&ctx), json!({"title": "a"})).unwrap();

        assert_eq!(count(&coordinator, None), 0);
        assert_eq!(count(&coordinator, Some(&ctx)), 1);

        assert!(coordinator.commit_transaction(&ctx).unwrap().is_some());
        assert_eq!(coordinator.state(&ctx), TransactionState::NoTransaction);
        assert_eq!(count(&coordinator, None), 1);
    }

    #[test]
    fn commit_and_rollback_without_transaction_are_noops() {
        let coordinator = coordinator(AdapterConfig::default());
        let ctx = RequestContext::new();
        assert_eq!(coordinator.commit_transaction(&ctx).unwrap(), None);
        assert!(!coordinator.rollback_transaction(&ctx).unwrap());
    }

    #[test]
    fn failed_commit_still_clears_entry() {
        let coordinator = coordinator(AdapterConfig::default());
        let saved = insert(&coordinator, None, json!({"v": 0})).unwrap();

        let ctx = RequestContext::new();
        coordinator.init_transaction(&ctx).unwrap();
        let mut mine = saved.clone();
        mine.insert("v".into(), json!(1));
        coordinator
            .execute(Some(&ctx), |store, session| store.replace(session, "posts", mine))
            .unwrap();

        let mut theirs = saved;
        theirs.insert("v".into(), json!(2));
        coordinator
            .execute(None, |store, session| store.replace(session, "posts", theirs))
            .unwrap();

        assert!(matches!(
            coordinator.commit_transaction(&ctx),
            Err(AdapterError::WriteConflict { .. })
        ));
        assert_eq!(coordinator.state(&ctx), TransactionState::NoTransaction);
    }

    #[test]
    fn failed_operation_rolls_back_transaction() {
        let coordinator = coordinator(AdapterConfig::default());
        let ctx = RequestContext::new();
        coordinator.init_transaction(&ctx).unwrap();

        let first = insert(&coordinator, Some(&ctx), json!({"title": "a"})).unwrap();
        let duplicate = insert(&coordinator, Some(&ctx), Value::Object(first));
        assert!(matches!(duplicate, Err(AdapterError::Validation { .. })));

        assert_eq!(coordinator.state(&ctx), TransactionState::NoTransaction);
        assert_eq!(count(&coordinator, None), 0);
        assert_eq!(count(&coordinator, Some(&ctx)), 0);
    }

    #[test]
    fn unsupported_transactions_degrade() {
        let coordinator = coordinator(AdapterConfig::default().transactions(false));
        let ctx = RequestContext::new();

        assert!(matches!(
            coordinator.init_transaction(&ctx),
            Err(AdapterError::TransactionUnsupported)
        ));
        assert_eq!(coordinator.try_init_transaction(&ctx).unwrap(), None);

        coordinator
            .transaction(&ctx, |ctx| insert(&coordinator, Some(ctx), json!({})))
            .unwrap();
        assert_eq!(count(&coordinator, None), 1);
    }

    #[test]
    fn transaction_scope_commits_only_when_started() {
        let coordinator = coordinator(AdapterConfig::default());
        let ctx = RequestContext::new();

        coordinator
            .transaction(&ctx, |ctx| {
                coordinator.transaction(ctx, |ctx| insert(&coordinator, Some(ctx), json!({})))?;
                // inner scope joined; nothing committed yet
                assert_eq!(count(&coordinator, None), 0);
                Ok(())
            })
            .unwrap();

        assert_eq!(count(&coordinator, None), 1);
    }

    #[test]
    fn transaction_scope_rolls_back_on_error() {
        let coordinator = coordinator(AdapterConfig::default());
        let ctx = RequestContext::new();

        let result: AdapterResult<()> = coordinator.transaction(&ctx, |ctx| {
            insert(&coordinator, Some(ctx), json!({}))?;
            Err(AdapterError::invalid_operation("abort"))
        });

        assert!(result.is_err());
        assert_eq!(coordinator.state(&ctx), TransactionState::NoTransaction);
        assert_eq!(count(&coordinator, None), 0);
    }
}
