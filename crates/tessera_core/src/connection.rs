//! Connection lifecycle: connect, health, destroy.

use crate::config::{AdapterConfig, StorageLocation};
use crate::dir::DataDir;
use crate::error::{AdapterError, AdapterResult};
use crate::registry::SessionRegistry;
use crate::store::{open_store, EngineStats, TransactionalStore};
use crate::types::{ContextId, TransactionId};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tessera_journal::{FileJournal, Journal, MemoryJournal};
use tracing::{debug, info, warn};

/// Connection state reported by `connect` and `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No backend is open.
    Disconnected,
    /// The backend is open and serving operations.
    Ready,
}

/// A session that was still open when the connection was destroyed.
///
/// Leaked sessions are force-rolled back; this is a warning, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakedSessionWarning {
    /// The request context that never committed or rolled back.
    pub context: ContextId,
    /// The backend transaction that was discarded.
    pub transaction: TransactionId,
    /// How long the transaction had been open.
    pub age: Duration,
}

impl fmt::Display for LeakedSessionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "leaked session {} ({}) open for {:?} was rolled back",
            self.context, self.transaction, self.age
        )
    }
}

/// Outcome of `destroy`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestroyReport {
    /// Sessions that were still registered.
    pub leaked: Vec<LeakedSessionWarning>,
    /// Backend transactions discarded by the store itself.
    pub discarded: usize,
}

struct Connected {
    store: Arc<dyn TransactionalStore>,
    dir: Option<DataDir>,
    config: AdapterConfig,
}

/// Owns the open backend and its data directory.
pub struct ConnectionManager {
    state: RwLock<Option<Connected>>,
    registry: Arc<SessionRegistry>,
}

impl ConnectionManager {
    /// Creates a disconnected manager whose `destroy` drains `registry`.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            state: RwLock::new(None),
            registry,
        }
    }

    /// Opens the backend described by `config`.
    ///
    /// Calling `connect` while already connected is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the directory cannot be locked or the journal
    /// cannot be opened or replayed.
    pub fn connect(&self, config: &AdapterConfig) -> AdapterResult<ConnectionStatus> {
        let mut state = self.state.write();
        if state.is_some() {
            debug!("connect called while connected");
            return Ok(ConnectionStatus::Ready);
        }

        let (journal, dir): (Box<dyn Journal>, Option<DataDir>) = match &config.location {
            StorageLocation::Memory => (Box::new(MemoryJournal::new()), None),
            StorageLocation::Directory(path) => {
                let dir = DataDir::open(path, config.create_if_missing)?;
                let journal = FileJournal::open(&dir.journal_path()).map_err(|e| {
                    AdapterError::connection(format!("cannot open journal: {e}"))
                })?;
                (Box::new(journal), Some(dir))
            }
        };

        let store = open_store(config, journal)
            .map_err(|e| AdapterError::connection(format!("cannot open backend: {e}")))?;
        let stats = store.stats();
        info!(
            backend = %config.backend,
            spaces = stats.spaces,
            committed_seq = %stats.committed_seq,
            "connected"
        );

        *state = Some(Connected {
            store: Arc::from(store),
            dir,
            config: config.clone(),
        });
        Ok(ConnectionStatus::Ready)
    }

    /// Closes the backend and releases the data directory.
    ///
    /// Sessions still registered are rolled back and reported as leaked.
    /// Destroying a disconnected manager is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Teardown` if the journal cannot be synced or the directory
    /// lock cannot be released.
    pub fn destroy(&self) -> AdapterResult<DestroyReport> {
        let Some(connected) = self.state.write().take() else {
            return Ok(DestroyReport::default());
        };

        let mut report = DestroyReport::default();
        for (context, handle) in self.registry.drain() {
            let warning = LeakedSessionWarning {
                context,
                transaction: handle.id(),
                age: handle.age(),
            };
            warn!(%context, transaction = %handle.id(), age = ?warning.age, "force-closing leaked session");
            if let Err(e) = connected.store.rollback(&handle) {
                warn!(%context, error = %e, "rollback of leaked session failed");
            }
            report.leaked.push(warning);
        }

        report.discarded = connected
            .store
            .close()
            .map_err(|e| AdapterError::teardown(format!("cannot close backend: {e}")))?;
        if let Some(dir) = connected.dir {
            dir.release()?;
        }

        info!(leaked = report.leaked.len(), "disconnected");
        Ok(report)
    }

    /// Returns the connection state.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        if self.state.read().is_some() {
            ConnectionStatus::Ready
        } else {
            ConnectionStatus::Disconnected
        }
    }

    /// Returns true if the backend is open.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status() == ConnectionStatus::Ready
    }

    /// Returns the open backend.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if `connect` has not succeeded.
    pub fn store(&self) -> AdapterResult<Arc<dyn TransactionalStore>> {
        self.state
            .read()
            .as_ref()
            .map(|c| Arc::clone(&c.store))
            .ok_or(AdapterError::NotConnected)
    }

    /// Returns the configuration of the open connection.
    #[must_use]
    pub fn config(&self) -> Option<AdapterConfig> {
        self.state.read().as_ref().map(|c| c.config.clone())
    }

    /// Returns backend counters, or `None` when disconnected.
    #[must_use]
    pub fn stats(&self) -> Option<EngineStats> {
        self.state.read().as_ref().map(|c| c.store.stats())
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status())
            .field("sessions", &self.registry.len())
            .finish()
    }
}
