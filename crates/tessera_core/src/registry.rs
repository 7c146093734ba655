//! Session registry: request context -> open backend transaction.
//!
//! This is the only concurrently mutated state of the core. Each context has
//! its own slot lock, so calls sharing a context serialize while calls for
//! different contexts never wait on each other. The map lock is only held
//! long enough to look up, insert or remove a slot.

use crate::store::TransactionHandle;
use crate::types::{ContextId, TransactionId};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Registry entry for one context, accessed with the slot locked.
#[derive(Debug, Default)]
pub struct SessionSlot {
    /// The open transaction, if any.
    pub handle: Option<TransactionHandle>,
    /// How many `init_transaction` calls joined the transaction.
    pub refs: usize,
    retired: bool,
}

/// Snapshot of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    /// Backend transaction id.
    pub transaction: TransactionId,
    /// How many `init_transaction` calls joined the transaction.
    pub refs: usize,
    /// Time since the transaction was opened.
    pub age: Duration,
}

/// Process-wide mapping from request context to open transaction.
///
/// Invariant: at most one open transaction per context. Entries are removed
/// as soon as their slot no longer holds a handle.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    slots: RwLock<HashMap<ContextId, Arc<Mutex<SessionSlot>>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the open transaction for `ctx`, if any.
    #[must_use]
    pub fn get_session(&self, ctx: ContextId) -> Option<SessionInfo> {
        let slot = self.slots.read().get(&ctx).cloned()?;
        let slot = slot.lock();
        if slot.retired {
            return None;
        }
        slot.handle.as_ref().map(|handle| SessionInfo {
            transaction: handle.id(),
            refs: slot.refs,
            age: handle.age(),
        })
    }

    /// Stores `handle` as the open transaction for `ctx`.
    ///
    /// # Errors
    ///
    /// Hands `handle` back if `ctx` already has an open transaction.
    pub fn set_session(
        &self,
        ctx: ContextId,
        handle: TransactionHandle,
    ) -> Result<(), TransactionHandle> {
        self.with_session(ctx, |slot| {
            if slot.handle.is_some() {
                return Err(handle);
            }
            slot.handle = Some(handle);
            slot.refs = 1;
            Ok(())
        })
    }

    /// Removes and returns the open transaction for `ctx`.
    pub fn clear_session(&self, ctx: ContextId) -> Option<TransactionHandle> {
        self.with_session(ctx, |slot| {
            slot.refs = 0;
            slot.handle.take()
        })
    }

    /// Runs `f` with the slot for `ctx` locked.
    ///
    /// Concurrent calls for the same context run one after another. If `f`
    /// leaves the slot without a handle, the entry is removed before the lock
    /// is released.
    pub fn with_session<R>(&self, ctx: ContextId, f: impl FnOnce(&mut SessionSlot) -> R) -> R {
        loop {
            let slot = Arc::clone(self.slots.write().entry(ctx).or_default());
            let mut guard = slot.lock();
            if guard.retired {
                // removed while we waited; retry against the live map
                continue;
            }

            let result = f(&mut *guard);

            if guard.handle.is_none() {
                guard.retired = true;
                let mut slots = self.slots.write();
                if slots.get(&ctx).is_some_and(|live| Arc::ptr_eq(live, &slot)) {
                    slots.remove(&ctx);
                }
            }
            return result;
        }
    }

    /// Removes every entry, returning the handles that were still open.
    pub fn drain(&self) -> Vec<(ContextId, TransactionHandle)> {
        let slots: Vec<_> = self.slots.write().drain().collect();
        slots
            .into_iter()
            .filter_map(|(ctx, slot)| {
                let mut slot = slot.lock();
                slot.retired = true;
                slot.handle.take().map(|handle| (ctx, handle))
            })
            .collect()
    }

    /// Returns the number of contexts with an open transaction.
    #[must_use]
    pub fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.read().values().cloned().collect();
        slots
            .iter()
            .filter(|slot| {
                let slot = slot.lock();
                !slot.retired && slot.handle.is_some()
            })
            .count()
    }

    /// Returns true if no context has an open transaction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
