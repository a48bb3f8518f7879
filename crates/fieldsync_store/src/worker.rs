//! The store worker.
//!
//! A single task owns the backend and executes every command in arrival
//! order. Transactions keep their writes in a private overlay until they
//! commit, and are admitted under store-scoped locking: a transaction
//! waits while an earlier one holds an overlapping scope and either of
//! them is read-write. Operations of a waiting transaction are buffered
//! and replayed in issue order once it starts.

use crate::backend::{Mutation, StoreBackend};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::request::Completer;
use crate::store::StoreHandle;
use crate::transaction::{EntryFilter, Operation, TransactionMode, TxShared};
use fieldsync_protocol::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) enum Command {
    Open {
        store: String,
        mode: TransactionMode,
        reply: Completer<StoreHandle>,
    },
    Begin {
        shared: Arc<TxShared>,
        stores: Vec<String>,
        mode: TransactionMode,
        reply: Completer<()>,
    },
    Op {
        tx: u64,
        op: Operation,
    },
    BodyFinished {
        tx: u64,
        result: StoreResult<()>,
    },
    Abort {
        tx: u64,
        reason: String,
    },
    Close {
        reply: Completer<()>,
    },
}

enum Deferred {
    Op(Operation),
    BodyFinished(StoreResult<()>),
    Abort(String),
}

/// Uncommitted view of one object store inside a transaction.
#[derive(Default)]
struct StoreOverlay {
    cleared: bool,
    /// `None` marks a deletion.
    entries: BTreeMap<String, Option<Value>>,
    count: usize,
}

struct TxEntry {
    shared: Arc<TxShared>,
    stores: Vec<String>,
    mode: TransactionMode,
    reply: Option<Completer<()>>,
    started: bool,
    /// False for transactions that failed before acquiring their stores.
    locks: bool,
    deferred: VecDeque<Deferred>,
    body_finished: bool,
    executed: usize,
    failure: Option<StoreError>,
    overlay: HashMap<String, StoreOverlay>,
    writes: Vec<Mutation>,
}

impl TxEntry {
    fn new(
        shared: Arc<TxShared>,
        stores: Vec<String>,
        mode: TransactionMode,
        reply: Completer<()>,
    ) -> Self {
        Self {
            shared,
            stores,
            mode,
            reply: Some(reply),
            started: false,
            locks: true,
            deferred: VecDeque::new(),
            body_finished: false,
            executed: 0,
            failure: None,
            overlay: HashMap::new(),
            writes: Vec::new(),
        }
    }

    fn conflicts_with(&self, other: &TxEntry) -> bool {
        if !self.locks || !other.locks {
            return false;
        }
        if !self.mode.is_writable() && !other.mode.is_writable() {
            return false;
        }
        self.stores.iter().any(|s| other.stores.contains(s))
    }

    fn is_ready(&self) -> bool {
        self.started
            && self.body_finished
            && self.executed == self.shared.issued.load(Ordering::Acquire)
    }

    fn fail(&mut self, err: StoreError) {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }

    fn apply(&mut self, deferred: Deferred, backend: &impl StoreBackend, quota: Option<usize>) {
        match deferred {
            Deferred::Op(op) => self.execute(op, backend, quota),
            Deferred::BodyFinished(result) => {
                self.body_finished = true;
                if let Err(err) = result {
                    self.fail(err);
                }
            }
            Deferred::Abort(reason) => {
                self.executed += 1;
                self.fail(StoreError::aborted(reason));
            }
        }
    }

    fn execute(&mut self, op: Operation, backend: &impl StoreBackend, quota: Option<usize>) {
        self.executed += 1;

        if let Some(failure) = &self.failure {
            op.fail(StoreError::aborted(failure.to_string()));
            return;
        }
        if !self.stores.iter().any(|s| s == op.store()) {
            let err = StoreError::NotInScope(op.store().to_string());
            self.fail(err.clone());
            op.fail(err);
            return;
        }
        if op.is_write() && !self.mode.is_writable() {
            self.fail(StoreError::ReadOnly);
            op.fail(StoreError::ReadOnly);
            return;
        }

        // The failure is recorded before the request completes, so handlers
        // issuing follow-up operations already see an aborted transaction.
        match op {
            Operation::Get { store, key, reply } => match self.read(backend, &store, &key) {
                Ok(value) => reply.succeed(value),
                Err(err) => {
                    self.fail(err.clone());
                    reply.fail(err);
                }
            },
            Operation::Put {
                store,
                key,
                value,
                reply,
            } => match self.put(backend, quota, &store, &key, value) {
                Ok(()) => reply.succeed(key),
                Err(err) => {
                    self.fail(err.clone());
                    reply.fail(err);
                }
            },
            Operation::Delete { store, key, reply } => {
                match self.delete(backend, &store, &key) {
                    Ok(()) => reply.succeed(()),
                    Err(err) => {
                        self.fail(err.clone());
                        reply.fail(err);
                    }
                }
            }
            Operation::Clear { store, reply } => match self.clear(backend, &store) {
                Ok(()) => reply.succeed(()),
                Err(err) => {
                    self.fail(err.clone());
                    reply.fail(err);
                }
            },
            Operation::DeleteMatching {
                store,
                filter,
                reply,
            } => match self.delete_matching(backend, &store, &filter) {
                Ok(removed) => reply.succeed(removed),
                Err(err) => {
                    self.fail(err.clone());
                    reply.fail(err);
                }
            },
            Operation::Count { store, reply } => match self.count(backend, &store) {
                Ok(count) => reply.succeed(count),
                Err(err) => {
                    self.fail(err.clone());
                    reply.fail(err);
                }
            },
            Operation::GetAll { store, reply } => match self.scan(backend, &store) {
                Ok(entries) => reply.succeed(entries),
                Err(err) => {
                    self.fail(err.clone());
                    reply.fail(err);
                }
            },
        }
    }

    fn read(
        &self,
        backend: &impl StoreBackend,
        store: &str,
        key: &str,
    ) -> StoreResult<Option<Value>> {
        check_key(key)?;
        if let Some(overlay) = self.overlay.get(store) {
            if let Some(value) = overlay.entries.get(key) {
                return Ok(value.clone());
            }
            if overlay.cleared {
                return Ok(None);
            }
        }
        backend.get(store, key)
    }

    fn scan(&self, backend: &impl StoreBackend, store: &str) -> StoreResult<Vec<(String, Value)>> {
        let overlay = self.overlay.get(store);
        let mut entries: BTreeMap<String, Value> = match overlay {
            Some(overlay) if overlay.cleared => BTreeMap::new(),
            _ => backend.scan(store)?.into_iter().collect(),
        };
        if let Some(overlay) = overlay {
            for (key, value) in &overlay.entries {
                match value {
                    Some(value) => entries.insert(key.clone(), value.clone()),
                    None => entries.remove(key),
                };
            }
        }
        Ok(entries.into_iter().collect())
    }

    fn count(&self, backend: &impl StoreBackend, store: &str) -> StoreResult<usize> {
        match self.overlay.get(store) {
            Some(overlay) => Ok(overlay.count),
            None => backend.len(store),
        }
    }

    fn overlay_mut(
        &mut self,
        backend: &impl StoreBackend,
        store: &str,
    ) -> StoreResult<&mut StoreOverlay> {
        if !self.overlay.contains_key(store) {
            let count = backend.len(store)?;
            self.overlay.insert(
                store.to_string(),
                StoreOverlay {
                    count,
                    ..StoreOverlay::default()
                },
            );
        }
        self.overlay
            .get_mut(store)
            .ok_or_else(|| StoreError::NotInScope(store.to_string()))
    }

    fn put(
        &mut self,
        backend: &impl StoreBackend,
        quota: Option<usize>,
        store: &str,
        key: &str,
        value: Value,
    ) -> StoreResult<()> {
        let exists = self.read(backend, store, key)?.is_some();
        let overlay = self.overlay_mut(backend, store)?;
        if !exists {
            if let Some(limit) = quota {
                if overlay.count >= limit {
                    return Err(StoreError::QuotaExceeded {
                        store: store.to_string(),
                        limit,
                    });
                }
            }
            overlay.count += 1;
        }
        overlay.entries.insert(key.to_string(), Some(value.clone()));
        self.writes.push(Mutation::put(store, key, value));
        Ok(())
    }

    fn delete(&mut self, backend: &impl StoreBackend, store: &str, key: &str) -> StoreResult<()> {
        let exists = self.read(backend, store, key)?.is_some();
        let overlay = self.overlay_mut(backend, store)?;
        if exists {
            overlay.count = overlay.count.saturating_sub(1);
        }
        overlay.entries.insert(key.to_string(), None);
        self.writes.push(Mutation::delete(store, key));
        Ok(())
    }

    fn clear(&mut self, backend: &impl StoreBackend, store: &str) -> StoreResult<()> {
        let overlay = self.overlay_mut(backend, store)?;
        overlay.cleared = true;
        overlay.entries.clear();
        overlay.count = 0;
        self.writes.push(Mutation::clear(store));
        Ok(())
    }

    fn delete_matching(
        &mut self,
        backend: &impl StoreBackend,
        store: &str,
        filter: &EntryFilter,
    ) -> StoreResult<usize> {
        let doomed: Vec<String> = self
            .scan(backend, store)?
            .into_iter()
            .filter(|(key, value)| filter(key.as_str(), value))
            .map(|(key, _)| key)
            .collect();
        for key in &doomed {
            self.delete(backend, store, key)?;
        }
        Ok(doomed.len())
    }
}

fn check_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub(crate) struct Worker<B> {
    backend: B,
    config: StoreConfig,
    availability: StoreResult<()>,
    entries: BTreeMap<u64, TxEntry>,
    closing: Vec<Completer<()>>,
    closed: bool,
}

impl<B: StoreBackend> Worker<B> {
    /// Creates a worker and brings the backend up to the configured schema.
    ///
    /// A backend that cannot be prepared is kept, and every open and
    /// transaction against it fails with the preparation error.
    pub(crate) fn new(mut backend: B, config: StoreConfig) -> Self {
        let availability = prepare(&mut backend, &config);
        if let Err(err) = &availability {
            tracing::warn!(error = %err, "local store unavailable");
        }
        Self {
            backend,
            config,
            availability,
            entries: BTreeMap::new(),
            closing: Vec::new(),
            closed: false,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            self.handle(command);
            self.schedule();

            if self.closed && self.entries.is_empty() {
                break;
            }
        }

        // The backend is released before close requests complete, so a
        // closed file store can be reopened right away.
        let closing = std::mem::take(&mut self.closing);
        drop(self);
        drop(commands);
        for reply in closing {
            reply.succeed(());
        }
        tracing::debug!("store worker stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Open { store, mode, reply } => reply.complete(self.open(store, mode)),
            Command::Begin {
                shared,
                stores,
                mode,
                reply,
            } => self.begin(shared, stores, mode, reply),
            Command::Op { tx, op } => self.route(tx, Deferred::Op(op)),
            Command::BodyFinished { tx, result } => self.route(tx, Deferred::BodyFinished(result)),
            Command::Abort { tx, reason } => self.route(tx, Deferred::Abort(reason)),
            Command::Close { reply } => {
                self.closed = true;
                self.closing.push(reply);
            }
        }
    }

    fn open(&self, store: String, mode: TransactionMode) -> StoreResult<StoreHandle> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.availability.clone()?;
        if !self.backend.has_store(&store)? {
            return Err(StoreError::unavailable(format!(
                "object store {store:?} does not exist"
            )));
        }
        Ok(StoreHandle::new(store, mode))
    }

    fn begin(
        &mut self,
        shared: Arc<TxShared>,
        stores: Vec<String>,
        mode: TransactionMode,
        reply: Completer<()>,
    ) {
        let id = shared.id;
        let mut entry = TxEntry::new(shared, stores, mode, reply);

        if let Err(err) = self.check_begin(&entry.stores) {
            tracing::debug!(tx = id, error = %err, "transaction failed to start");
            entry.started = true;
            entry.locks = false;
            entry.failure = Some(err);
        } else {
            tracing::debug!(tx = id, stores = ?entry.stores, ?mode, "transaction begun");
        }
        self.entries.insert(id, entry);
    }

    fn check_begin(&self, stores: &[String]) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        self.availability.clone()?;
        if stores.is_empty() {
            return Err(StoreError::aborted("transaction scope is empty"));
        }
        for store in stores {
            if !self.backend.has_store(store)? {
                return Err(StoreError::unavailable(format!(
                    "object store {store:?} does not exist"
                )));
            }
        }
        Ok(())
    }

    fn route(&mut self, tx: u64, item: Deferred) {
        let quota = self.config.max_entries_per_store;
        match self.entries.get_mut(&tx) {
            Some(entry) if entry.started => entry.apply(item, &self.backend, quota),
            Some(entry) => entry.deferred.push_back(item),
            None => {
                if let Deferred::Op(op) = item {
                    op.fail(StoreError::TransactionInactive);
                }
            }
        }
    }

    /// Starts every transaction that no longer conflicts and finalizes every
    /// transaction whose requests have all completed, until nothing changes.
    fn schedule(&mut self) {
        loop {
            let mut progressed = false;

            for id in startable(&self.entries) {
                self.start(id);
                progressed = true;
            }

            let ready: Vec<u64> = self
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_ready())
                .map(|(id, _)| *id)
                .collect();

            for id in ready {
                if let Some(entry) = self.entries.remove(&id) {
                    self.finalize(id, entry);
                    progressed = true;
                }
            }

            if !progressed {
                break;
            }
        }
    }

    fn start(&mut self, id: u64) {
        let quota = self.config.max_entries_per_store;
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        if !entry.deferred.is_empty() {
            tracing::debug!(tx = id, buffered = entry.deferred.len(), "queued transaction started");
        }
        entry.started = true;
        while let Some(item) = entry.deferred.pop_front() {
            entry.apply(item, &self.backend, quota);
        }
    }

    fn finalize(&mut self, id: u64, mut entry: TxEntry) {
        let outcome = match entry.failure.take() {
            Some(err) => {
                tracing::debug!(tx = id, error = %err, discarded = entry.writes.len(), "transaction aborted");
                Err(err)
            }
            None if entry.writes.is_empty() => Ok(()),
            None => match self.backend.commit(&entry.writes) {
                Ok(()) => {
                    tracing::debug!(tx = id, writes = entry.writes.len(), "transaction committed");
                    Ok(())
                }
                Err(err) => {
                    tracing::warn!(tx = id, error = %err, "commit failed");
                    Err(err)
                }
            },
        };

        entry.shared.finished.store(true, Ordering::Release);
        if let Some(reply) = entry.reply.take() {
            reply.complete(outcome);
        }
    }
}

fn prepare<B: StoreBackend>(backend: &mut B, config: &StoreConfig) -> StoreResult<()> {
    backend.check_available()?;

    let schema = &config.schema;
    let version = backend.schema_version()?;
    if version > schema.version {
        return Err(StoreError::unavailable(format!(
            "schema mismatch: store is at version {version}, expected {}",
            schema.version
        )));
    }
    if version < schema.version {
        tracing::info!(from = version, to = schema.version, "upgrading local store schema");
        return backend.upgrade(schema);
    }
    for store in &schema.stores {
        if !backend.has_store(store)? {
            return Err(StoreError::unavailable(format!(
                "schema mismatch: object store {store:?} is missing"
            )));
        }
    }
    Ok(())
}

/// Returns the queued transactions that may start now, in id order.
///
/// A transaction waits while any started transaction conflicts with it,
/// whatever its id, and while an earlier queued one does. Begin commands
/// from cloned stores may arrive out of id order.
fn startable(entries: &BTreeMap<u64, TxEntry>) -> Vec<u64> {
    entries
        .iter()
        .filter(|(_, entry)| !entry.started)
        .filter(|(id, entry)| {
            !entries.iter().any(|(other_id, other)| {
                (other.started || other_id < *id) && other.conflicts_with(entry)
            })
        })
        .map(|(id, _)| *id)
        .collect()
}
