//! Transactional engine shared by both backends.
//!
//! Committed state is a catalog of named spaces (collections or tables).
//! A transaction buffers [`Mutation`]s; they are validated against the
//! transaction's view when issued and applied atomically on commit, after
//! the commit frame has been appended to the journal.

use super::TransactionHandle;
use crate::config::BackendKind;
use crate::document::{lookup, Document};
use crate::error::{AdapterError, AdapterResult};
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tessera_journal::Journal;
use tracing::debug;

/// Sequence stamped on rows that only exist inside a transaction view.
const UNCOMMITTED: SequenceNumber = SequenceNumber::new(u64::MAX);

/// A single change to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Mutation {
    CreateSpace {
        space: String,
    },
    DropSpace {
        space: String,
    },
    CreateIndex {
        space: String,
        field: String,
        unique: bool,
    },
    DropIndex {
        space: String,
        field: String,
    },
    Insert {
        space: String,
        key: String,
        row: Document,
    },
    Replace {
        space: String,
        key: String,
        row: Document,
    },
    Delete {
        space: String,
        key: String,
    },
}

impl Mutation {
    fn space(&self) -> &str {
        match self {
            Self::CreateSpace { space }
            | Self::DropSpace { space }
            | Self::CreateIndex { space, .. }
            | Self::DropIndex { space, .. }
            | Self::Insert { space, .. }
            | Self::Replace { space, .. }
            | Self::Delete { space, .. } => space,
        }
    }

    fn row_key(&self) -> Option<&str> {
        match self {
            Self::Insert { key, .. } | Self::Replace { key, .. } | Self::Delete { key, .. } => {
                Some(key.as_str())
            }
            _ => None,
        }
    }
}

/// One journal entry: every mutation of a commit.
#[derive(Debug, Serialize, Deserialize)]
struct CommitFrame {
    sequence: u64,
    mutations: Vec<Mutation>,
}

#[derive(Debug, Clone)]
struct Row {
    seq: SequenceNumber,
    doc: Document,
}

#[derive(Debug, Clone, Default)]
struct Space {
    rows: BTreeMap<String, Row>,
    /// Indexed field -> unique flag.
    indexes: BTreeMap<String, bool>,
}

impl Space {
    fn check_unique(&self, space: &str, key: &str, row: &Document) -> AdapterResult<()> {
        for (field, unique) in &self.indexes {
            if !*unique {
                continue;
            }
            let Some(value) = lookup(row, field).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = self
                .rows
                .iter()
                .any(|(k, r)| k != key && lookup(&r.doc, field) == Some(value));
            if taken {
                return Err(AdapterError::validation(
                    space,
                    format!("duplicate value {value} for unique field '{field}'"),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ApplyMode {
    /// Enforce every constraint; optionally create missing spaces on write.
    Strict { auto_create: bool },
    /// Trusted input (journal replay, already-validated buffers).
    Replay,
}

#[derive(Debug, Clone, Default)]
struct Catalog {
    spaces: BTreeMap<String, Space>,
}

impl Catalog {
    fn subset(&self, names: &BTreeSet<String>) -> Self {
        let spaces = names
            .iter()
            .filter_map(|name| self.spaces.get(name).map(|s| (name.clone(), s.clone())))
            .collect();
        Self { spaces }
    }

    /// Writes back the spaces named in `names` from `staged`, removing dropped ones.
    fn absorb(&mut self, mut staged: Catalog, names: &BTreeSet<String>) {
        for name in names {
            match staged.spaces.remove(name) {
                Some(space) => {
                    self.spaces.insert(name.clone(), space);
                }
                None => {
                    self.spaces.remove(name);
                }
            }
        }
    }

    fn space_for_write(&mut self, name: &str, mode: ApplyMode) -> AdapterResult<&mut Space> {
        if !self.spaces.contains_key(name) {
            match mode {
                ApplyMode::Strict { auto_create: false } => {
                    return Err(AdapterError::validation(
                        name,
                        format!("relation \"{name}\" does not exist"),
                    ));
                }
                _ => {
                    self.spaces.insert(name.to_string(), Space::default());
                }
            }
        }
        self.spaces
            .get_mut(name)
            .ok_or_else(|| AdapterError::backend(format!("space {name} vanished")))
    }

    fn apply(&mut self, m: &Mutation, seq: SequenceNumber, mode: ApplyMode) -> AdapterResult<()> {
        let strict = matches!(mode, ApplyMode::Strict { .. });
        match m {
            Mutation::CreateSpace { space } => {
                if self.spaces.contains_key(space) {
                    if strict {
                        return Err(AdapterError::validation(
                            space.as_str(),
                            format!("relation \"{space}\" already exists"),
                        ));
                    }
                } else {
                    self.spaces.insert(space.clone(), Space::default());
                }
            }
            Mutation::DropSpace { space } => {
                if self.spaces.remove(space).is_none() && strict {
                    return Err(AdapterError::validation(
                        space.as_str(),
                        format!("relation \"{space}\" does not exist"),
                    ));
                }
            }
            Mutation::CreateIndex {
                space,
                field,
                unique,
            } => {
                let target = self.space_for_write(space, mode)?;
                if strict {
                    if target.indexes.contains_key(field) {
                        return Err(AdapterError::validation(
                            space.as_str(),
                            format!("index on '{field}' already exists"),
                        ));
                    }
                    if *unique {
                        let mut seen = BTreeSet::new();
                        for row in target.rows.values() {
                            if let Some(v) = lookup(&row.doc, field).filter(|v| !v.is_null()) {
                                if !seen.insert(v.to_string()) {
                                    return Err(AdapterError::validation(
                                        space.as_str(),
                                        format!("existing rows repeat value {v} for '{field}'"),
                                    ));
                                }
                            }
                        }
                    }
                }
                target.indexes.insert(field.clone(), *unique);
            }
            Mutation::DropIndex { space, field } => {
                let removed = self
                    .spaces
                    .get_mut(space)
                    .and_then(|s| s.indexes.remove(field));
                if removed.is_none() && strict {
                    return Err(AdapterError::validation(
                        space.as_str(),
                        format!("index on '{field}' does not exist"),
                    ));
                }
            }
            Mutation::Insert { space, key, row } => {
                let target = self.space_for_write(space, mode)?;
                if strict {
                    if target.rows.contains_key(key) {
                        return Err(AdapterError::validation(
                            space.as_str(),
                            format!("duplicate id '{key}'"),
                        ));
                    }
                    target.check_unique(space, key, row)?;
                }
                target.rows.insert(
                    key.clone(),
                    Row {
                        seq,
                        doc: row.clone(),
                    },
                );
            }
            Mutation::Replace { space, key, row } => {
                if strict {
                    let exists = self
                        .spaces
                        .get(space)
                        .is_some_and(|s| s.rows.contains_key(key));
                    if !exists {
                        return Err(AdapterError::not_found(space.as_str(), key.as_str()));
                    }
                }
                let target = self.space_for_write(space, ApplyMode::Replay)?;
                if strict {
                    target.check_unique(space, key, row)?;
                }
                target.rows.insert(
                    key.clone(),
                    Row {
                        seq,
                        doc: row.clone(),
                    },
                );
            }
            Mutation::Delete { space, key } => {
                let removed = self.spaces.get_mut(space).and_then(|s| s.rows.remove(key));
                if removed.is_none() && strict {
                    return Err(AdapterError::not_found(space.as_str(), key.as_str()));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PendingTransaction {
    base_seq: SequenceNumber,
    mutations: Vec<Mutation>,
}

/// Point-in-time counters for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Number of committed spaces.
    pub spaces: usize,
    /// Number of committed rows across all spaces.
    pub rows: usize,
    /// Number of open backend transactions.
    pub open_transactions: usize,
    /// Last committed sequence.
    pub committed_seq: SequenceNumber,
}

/// Committed catalog, open transactions and the journal behind one backend.
pub(crate) struct Engine {
    committed: RwLock<Catalog>,
    open: Mutex<HashMap<TransactionId, PendingTransaction>>,
    journal: Mutex<Box<dyn Journal>>,
    serials: Mutex<HashMap<String, u64>>,
    next_txid: AtomicU64,
    committed_seq: AtomicU64,
    auto_create: bool,
    sync_on_commit: bool,
    closed: AtomicBool,
}

impl Engine {
    /// Opens an engine, rebuilding committed state from the journal.
    pub(crate) fn open(
        journal: Box<dyn Journal>,
        auto_create: bool,
        sync_on_commit: bool,
    ) -> AdapterResult<Self> {
        let mut catalog = Catalog::default();
        let mut committed_seq = 0u64;

        let frames = journal.replay()?;
        let frame_count = frames.len();
        for bytes in frames {
            let frame: CommitFrame = ciborium::from_reader(bytes.as_slice())?;
            let seq = SequenceNumber::new(frame.sequence);
            for m in &frame.mutations {
                catalog.apply(m, seq, ApplyMode::Replay)?;
            }
            committed_seq = committed_seq.max(frame.sequence);
        }
        debug!(frames = frame_count, committed_seq, "replayed commit journal");

        Ok(Self {
            committed: RwLock::new(catalog),
            open: Mutex::new(HashMap::new()),
            journal: Mutex::new(journal),
            serials: Mutex::new(HashMap::new()),
            next_txid: AtomicU64::new(1),
            committed_seq: AtomicU64::new(committed_seq),
            auto_create,
            sync_on_commit,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> AdapterResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(AdapterError::NotConnected)
        } else {
            Ok(())
        }
    }

    fn strict(&self) -> ApplyMode {
        ApplyMode::Strict {
            auto_create: self.auto_create,
        }
    }

    /// Returns the last committed sequence.
    pub(crate) fn committed_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed_seq.load(Ordering::SeqCst))
    }

    /// Begins a transaction.
    pub(crate) fn begin(&self) -> AdapterResult<TransactionId> {
        self.ensure_open()?;
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        self.open.lock().insert(
            txid,
            PendingTransaction {
                base_seq: self.committed_seq(),
                mutations: Vec::new(),
            },
        );
        Ok(txid)
    }

    /// Begins a transaction on behalf of a store and wraps it in a handle.
    pub(crate) fn begin_handle(
        &self,
        backend: BackendKind,
        transactions: bool,
    ) -> AdapterResult<TransactionHandle> {
        if !transactions {
            return Err(AdapterError::TransactionUnsupported);
        }
        Ok(TransactionHandle::new(self.begin()?, backend))
    }

    /// Commits a transaction; read-only transactions do not produce a frame.
    pub(crate) fn commit(&self, txid: TransactionId) -> AdapterResult<SequenceNumber> {
        self.ensure_open()?;
        let pending = self
            .open
            .lock()
            .remove(&txid)
            .ok_or(AdapterError::UnknownTransaction(txid))?;

        if pending.mutations.is_empty() {
            return Ok(self.committed_seq());
        }

        let mut committed = self.committed.write();
        for m in &pending.mutations {
            let Some(key) = m.row_key() else { continue };
            let newer = committed
                .spaces
                .get(m.space())
                .and_then(|s| s.rows.get(key))
                .is_some_and(|row| row.seq > pending.base_seq);
            if newer {
                return Err(AdapterError::write_conflict(m.space(), key));
            }
        }
        self.apply_and_log(&mut committed, pending.mutations)
    }

    /// Discards a transaction.
    pub(crate) fn rollback(&self, txid: TransactionId) -> AdapterResult<()> {
        self.open
            .lock()
            .remove(&txid)
            .map(|_| ())
            .ok_or(AdapterError::UnknownTransaction(txid))
    }

    /// Validates mutations, then buffers them in `txid` or commits them at once.
    pub(crate) fn write(
        &self,
        txid: Option<TransactionId>,
        mutations: Vec<Mutation>,
    ) -> AdapterResult<()> {
        self.ensure_open()?;
        if mutations.is_empty() {
            return Ok(());
        }

        let Some(txid) = txid else {
            let mut committed = self.committed.write();
            self.apply_and_log(&mut committed, mutations)?;
            return Ok(());
        };

        let mut open = self.open.lock();
        let pending = open
            .get_mut(&txid)
            .ok_or(AdapterError::UnknownTransaction(txid))?;

        let touched: BTreeSet<String> = pending
            .mutations
            .iter()
            .chain(mutations.iter())
            .map(|m| m.space().to_string())
            .collect();
        let mut view = self.committed.read().subset(&touched);
        for m in &pending.mutations {
            view.apply(m, UNCOMMITTED, ApplyMode::Replay)?;
        }
        for m in &mutations {
            view.apply(m, UNCOMMITTED, self.strict())?;
        }

        pending.mutations.extend(mutations);
        Ok(())
    }

    fn apply_and_log(
        &self,
        committed: &mut Catalog,
        mutations: Vec<Mutation>,
    ) -> AdapterResult<SequenceNumber> {
        let sequence = self.committed_seq().next();
        let touched: BTreeSet<String> = mutations.iter().map(|m| m.space().to_string()).collect();

        let mut staged = committed.subset(&touched);
        for m in &mutations {
            staged.apply(m, sequence, self.strict())?;
        }

        let frame = CommitFrame {
            sequence: sequence.as_u64(),
            mutations,
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&frame, &mut bytes)?;
        {
            let mut journal = self.journal.lock();
            journal.append(&bytes)?;
            if self.sync_on_commit {
                journal.flush()?;
            }
        }

        committed.absorb(staged, &touched);
        self.committed_seq.store(sequence.as_u64(), Ordering::SeqCst);

        let mut serials = self.serials.lock();
        for m in &frame.mutations {
            if let Mutation::DropSpace { space } = m {
                serials.remove(space);
            }
        }
        Ok(sequence)
    }

    /// Returns the rows of `space` as seen by `txid`, or `None` if the space doesn't exist.
    pub(crate) fn scan(
        &self,
        txid: Option<TransactionId>,
        space: &str,
    ) -> AdapterResult<Option<Vec<(String, Document)>>> {
        let [rows] = self.snapshot(txid, [space])?;
        Ok(rows)
    }

    /// Reads several spaces from one committed state.
    ///
    /// All spaces are copied under a single read guard, so a concurrent
    /// commit is seen either entirely or not at all.
    pub(crate) fn snapshot<const N: usize>(
        &self,
        txid: Option<TransactionId>,
        spaces: [&str; N],
    ) -> AdapterResult<[Option<Vec<(String, Document)>>; N]> {
        self.ensure_open()?;
        let names: BTreeSet<String> = spaces.iter().map(|s| (*s).to_string()).collect();
        let pending = self.pending_for(txid)?;

        let mut view = self.committed.read().subset(&names);
        for m in pending.iter().filter(|m| names.contains(m.space())) {
            view.apply(m, UNCOMMITTED, ApplyMode::Replay)?;
        }

        Ok(spaces.map(|space| {
            view.spaces.remove(space).map(|s| {
                s.rows
                    .into_iter()
                    .map(|(key, row)| (key, row.doc))
                    .collect()
            })
        }))
    }

    /// Returns one row of `space` as seen by `txid`.
    pub(crate) fn get(
        &self,
        txid: Option<TransactionId>,
        space: &str,
        key: &str,
    ) -> AdapterResult<Option<Document>> {
        Ok(self
            .scan(txid, space)?
            .and_then(|rows| rows.into_iter().find(|(k, _)| k == key).map(|(_, doc)| doc)))
    }

    /// Returns the names of every space visible to `txid`.
    pub(crate) fn space_names(&self, txid: Option<TransactionId>) -> AdapterResult<Vec<String>> {
        self.ensure_open()?;
        let pending = self.pending_for(txid)?;

        let mut names: BTreeSet<String> = self.committed.read().spaces.keys().cloned().collect();
        for m in &pending {
            match m {
                Mutation::DropSpace { space } => {
                    names.remove(space);
                }
                other => {
                    names.insert(other.space().to_string());
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Copies the buffered mutations of `txid`; the open lock is released on return.
    fn pending_for(&self, txid: Option<TransactionId>) -> AdapterResult<Vec<Mutation>> {
        let Some(txid) = txid else {
            return Ok(Vec::new());
        };
        let open = self.open.lock();
        let pending = open
            .get(&txid)
            .ok_or(AdapterError::UnknownTransaction(txid))?;
        Ok(pending.mutations.clone())
    }

    /// Hands out the next serial id for `space`.
    ///
    /// Serials are not transactional: a rolled-back insert leaves a gap.
    pub(crate) fn next_serial(&self, space: &str) -> u64 {
        let seed = self
            .committed
            .read()
            .spaces
            .get(space)
            .and_then(|s| s.rows.keys().filter_map(|k| k.parse::<u64>().ok()).max())
            .unwrap_or(0);

        let mut serials = self.serials.lock();
        let current = serials.entry(space.to_string()).or_insert(seed);
        *current += 1;
        *current
    }

    /// Drops every committed space in one commit. Returns how many were dropped.
    pub(crate) fn drop_all(&self) -> AdapterResult<usize> {
        self.ensure_open()?;
        let mut committed = self.committed.write();
        let mutations: Vec<Mutation> = committed
            .spaces
            .keys()
            .map(|space| Mutation::DropSpace {
                space: space.clone(),
            })
            .collect();
        let count = mutations.len();
        if count > 0 {
            self.apply_and_log(&mut committed, mutations)?;
        }
        self.serials.lock().clear();
        Ok(count)
    }

    /// Returns point-in-time counters.
    ///
    /// The open map is never locked while `committed` is held: `write` takes
    /// them in the opposite order.
    pub(crate) fn stats(&self) -> EngineStats {
        let open_transactions = self.open.lock().len();
        let committed = self.committed.read();
        EngineStats {
            spaces: committed.spaces.len(),
            rows: committed.spaces.values().map(|s| s.rows.len()).sum(),
            open_transactions,
            committed_seq: self.committed_seq(),
        }
    }

    /// Discards open transactions and syncs the journal. Returns how many were discarded.
    pub(crate) fn close(&self) -> AdapterResult<usize> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }
        let discarded = self.open.lock().drain().count();
        self.journal.lock().sync()?;
        Ok(discarded)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("stats", &self.stats())
            .field("auto_create", &self.auto_create)
            .finish_non_exhaustive()
    }
}
