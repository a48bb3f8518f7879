//! The local store adapter.

use crate::backend::StoreBackend;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryBackend;
use crate::request::Request;
use crate::transaction::{TransactionMode, TransactionScope, TxShared};
use crate::worker::{Command, Worker};
use fieldsync_protocol::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// An opened object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHandle {
    name: String,
    mode: TransactionMode,
}

impl StoreHandle {
    pub(crate) fn new(name: String, mode: TransactionMode) -> Self {
        Self { name, mode }
    }

    /// Returns the object store name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the mode the store was opened with.
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }
}

/// Asynchronous transactional key-object store.
///
/// `LocalStore` is a cheap handle to a store worker task. Every method
/// returns immediately with a [`Request`]; the worker executes operations
/// in the order they were issued.
///
/// # Example
///
/// ```rust,no_run
/// use fieldsync_store::{LocalStore, TransactionMode};
/// use serde_json::json;
///
/// # async fn demo() -> fieldsync_store::StoreResult<()> {
/// let store = LocalStore::in_memory();
/// store
///     .run_transaction(&["sites", "locations"], TransactionMode::ReadWrite, |tx| {
///         tx.clear("sites");
///         tx.put("sites", "1", json!({"id": 1}));
///         tx.put("locations", "9", json!({"id": 9}));
///         Ok(())
///     })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalStore {
    commands: mpsc::UnboundedSender<Command>,
    next_tx: Arc<AtomicU64>,
}

impl LocalStore {
    /// Spawns a store worker over `backend` on the current tokio runtime.
    ///
    /// The backend is checked and upgraded to the configured schema before
    /// the first command runs. If that fails, every open and transaction
    /// completes with the preparation error.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<B: StoreBackend>(backend: B, config: StoreConfig) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = Worker::new(backend, config);
        tokio::spawn(worker.run(receiver));
        Self {
            commands,
            next_tx: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Spawns a store over a fresh [`MemoryBackend`] with the default schema.
    pub fn in_memory() -> Self {
        Self::spawn(MemoryBackend::new(), StoreConfig::default())
    }

    /// Opens an object store.
    ///
    /// Fails with [`StoreError::Unavailable`] if the local database could
    /// not be prepared or the store does not exist.
    pub fn open(&self, store: &str, mode: TransactionMode) -> Request<StoreHandle> {
        let (request, reply) = Request::pending();
        let _ = self.commands.send(Command::Open {
            store: store.to_string(),
            mode,
            reply,
        });
        request
    }

    /// Reads one entry in its own transaction.
    pub fn get(&self, handle: &StoreHandle, key: &str) -> Request<Option<Value>> {
        self.single(handle.name(), TransactionMode::ReadOnly, |tx| {
            tx.get(handle.name(), key)
        })
    }

    /// Writes one entry in its own transaction. Resolves to the key once
    /// the write has committed.
    pub fn put(&self, handle: &StoreHandle, key: &str, value: Value) -> Request<String> {
        self.single(handle.name(), handle.mode(), |tx| {
            tx.put(handle.name(), key, value)
        })
    }

    /// Deletes one entry in its own transaction.
    pub fn delete(&self, handle: &StoreHandle, key: &str) -> Request<()> {
        self.single(handle.name(), handle.mode(), |tx| {
            tx.delete(handle.name(), key)
        })
    }

    /// Runs a transaction over `stores`.
    ///
    /// `body` runs immediately on the calling thread and issues operations
    /// through the scope. Operations may also be issued later from
    /// completion handlers of requests in the same transaction. The
    /// returned request completes once the transaction has committed, or
    /// with the first error if any request failed, `body` returned an
    /// error, or the scope was aborted. Nothing is written in that case.
    pub fn run_transaction<F>(&self, stores: &[&str], mode: TransactionMode, body: F) -> Request<()>
    where
        F: FnOnce(&TransactionScope) -> StoreResult<()>,
    {
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(TxShared::new(id));
        let stores: Vec<String> = stores.iter().map(|s| s.to_string()).collect();
        let (request, reply) = Request::pending();

        let _ = self.commands.send(Command::Begin {
            shared: Arc::clone(&shared),
            stores: stores.clone(),
            mode,
            reply,
        });

        let scope = TransactionScope::new(shared, Arc::from(stores), mode, self.commands.clone());
        let result = body(&scope);
        let _ = self.commands.send(Command::BodyFinished { tx: id, result });

        request
    }

    /// Closes the store once every running transaction has finished.
    ///
    /// Later opens and transactions complete with [`StoreError::Closed`].
    pub fn close(&self) -> Request<()> {
        let (request, reply) = Request::pending();
        let _ = self.commands.send(Command::Close { reply });
        request
    }

    fn single<T, F>(&self, store: &str, mode: TransactionMode, issue: F) -> Request<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&TransactionScope) -> Request<T>,
    {
        let (outer, reply) = Request::pending();
        let mut inner = None;
        let transaction = self.run_transaction(&[store], mode, |tx| {
            inner = Some(issue(tx));
            Ok(())
        });

        transaction.on_complete(move |outcome| {
            let result = match (outcome, inner) {
                (Err(err), _) => Err(err.clone()),
                (Ok(()), Some(inner)) => inner.outcome().unwrap_or(Err(StoreError::Closed)),
                (Ok(()), None) => Err(StoreError::Closed),
            };
            reply.complete(result);
        });
        outer
    }
}
