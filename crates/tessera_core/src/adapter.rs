//! Adapter facade.

use crate::config::AdapterConfig;
use crate::connection::{ConnectionManager, ConnectionStatus, DestroyReport};
use crate::context::RequestContext;
use crate::coordinator::{TransactionCoordinator, TransactionRef};
use crate::error::AdapterResult;
use crate::migration::MigrationEngine;
use crate::operations::Operations;
use crate::registry::SessionRegistry;
use crate::types::SequenceNumber;
use std::sync::Arc;

/// The main adapter handle.
///
/// `Adapter` wires the connection manager, session registry, transaction
/// coordinator, operation executors and migration engine together. Each
/// adapter owns its own registry, so tests can build isolated instances.
///
/// # Usage
///
/// ```rust,ignore
/// use tessera_core::{Adapter, AdapterConfig, RequestContext};
///
/// let adapter = Adapter::open(AdapterConfig::from_url("document:./data")?)?;
/// let ctx = RequestContext::new();
///
/// adapter.transaction(&ctx, |ctx| {
///     adapter.operations().create(Some(ctx), "posts", post)?;
///     adapter.operations().create_version(Some(ctx), "posts", &id, snapshot)?;
///     Ok(())
/// })?;
///
/// adapter.destroy()?;
/// ```
#[derive(Debug)]
pub struct Adapter {
    config: AdapterConfig,
    registry: Arc<SessionRegistry>,
    connection: Arc<ConnectionManager>,
    coordinator: Arc<TransactionCoordinator>,
    operations: Operations,
}

impl Adapter {
    /// Creates a disconnected adapter.
    #[must_use]
    pub fn new(config: AdapterConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let connection = Arc::new(ConnectionManager::new(Arc::clone(&registry)));
        let coordinator = Arc::new(TransactionCoordinator::new(
            Arc::clone(&connection),
            Arc::clone(&registry),
        ));
        let operations = Operations::new(Arc::clone(&coordinator));
        Self {
            config,
            registry,
            connection,
            coordinator,
            operations,
        }
    }

    /// Creates an adapter and connects it.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the backend cannot be opened.
    pub fn open(config: AdapterConfig) -> AdapterResult<Self> {
        let adapter = Self::new(config);
        adapter.connect()?;
        Ok(adapter)
    }

    /// Connects to the configured backend; a no-op if already connected.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the backend cannot be opened.
    pub fn connect(&self) -> AdapterResult<ConnectionStatus> {
        self.connection.connect(&self.config)
    }

    /// Closes the backend, rolling back and reporting leaked sessions.
    ///
    /// # Errors
    ///
    /// Returns `Teardown` if resources cannot be released.
    pub fn destroy(&self) -> AdapterResult<DestroyReport> {
        self.connection.destroy()
    }

    /// Returns true if the backend is open.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Returns the operation executors.
    #[must_use]
    pub fn operations(&self) -> &Operations {
        &self.operations
    }

    /// Returns the transaction coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Returns the session registry.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Returns the connection manager.
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Opens or joins the transaction of `ctx`.
    ///
    /// # Errors
    ///
    /// Returns `TransactionUnsupported` if the backend runs without transactions.
    pub fn init_transaction(&self, ctx: &RequestContext) -> AdapterResult<TransactionRef> {
        self.coordinator.init_transaction(ctx)
    }

    /// Commits the transaction of `ctx`; a no-op if none is open.
    ///
    /// # Errors
    ///
    /// Returns the backend's commit error; the context is cleared regardless.
    pub fn commit_transaction(&self, ctx: &RequestContext) -> AdapterResult<Option<SequenceNumber>> {
        self.coordinator.commit_transaction(ctx)
    }

    /// Rolls back the transaction of `ctx`; a no-op if none is open.
    ///
    /// # Errors
    ///
    /// Returns the backend's rollback error; the context is cleared regardless.
    pub fn rollback_transaction(&self, ctx: &RequestContext) -> AdapterResult<bool> {
        self.coordinator.rollback_transaction(ctx)
    }

    /// Runs `f` in the transaction of `ctx`, committing if this call opened it.
    ///
    /// # Errors
    ///
    /// Returns the error of `f` (after rolling back) or of the commit.
    pub fn transaction<T>(
        &self,
        ctx: &RequestContext,
        f: impl FnOnce(&RequestContext) -> AdapterResult<T>,
    ) -> AdapterResult<T> {
        self.coordinator.transaction(ctx, f)
    }

    /// Returns a migration engine reading the configured migration directory.
    #[must_use]
    pub fn migrations(&self) -> MigrationEngine {
        let engine = MigrationEngine::new(self.operations.clone());
        match &self.config.migration_dir {
            Some(dir) => engine.with_dir(dir),
            None => engine,
        }
    }
}

impl Drop for Adapter {
    fn drop(&mut self) {
        if self.connection.is_ready() {
            if let Err(e) = self.connection.destroy() {
                tracing::warn!(error = %e, "failed to close adapter on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterError;
    use serde_json::json;

    #[test]
    fn open_then_destroy() {
        let adapter = Adapter::open(AdapterConfig::default()).unwrap();
        assert!(adapter.is_ready());
        adapter.destroy().unwrap();
        assert!(!adapter.is_ready());
        assert!(matches!(
            adapter.operations().collections(None),
            Err(AdapterError::NotConnected)
        ));
    }

    #[test]
    fn drop_releases_directory_lock() {
        let dir = tempfile::tempdir().unwrap();
        let config = AdapterConfig::default().directory(dir.path());
        {
            let _adapter = Adapter::open(config.clone()).unwrap();
        }
        Adapter::open(config).unwrap();
    }

    #[test]
    fn migrations_use_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let adapter =
            Adapter::open(AdapterConfig::default().migration_dir(dir.path())).unwrap();
        assert_eq!(adapter.migrations().dir(), Some(dir.path()));
    }

    #[test]
    fn transaction_helper_commits() {
        let adapter = Adapter::open(AdapterConfig::default()).unwrap();
        let ctx = RequestContext::new();
        adapter
            .transaction(&ctx, |ctx| {
                adapter.operations().create(
                    Some(ctx),
                    "posts",
                    json!({"title": "a"}).as_object().cloned().unwrap_or_default(),
                )
            })
            .unwrap();
        assert_eq!(
            adapter
                .operations()
                .count(None, "posts", &crate::document::Where::All)
                .unwrap(),
            1
        );
    }
}
