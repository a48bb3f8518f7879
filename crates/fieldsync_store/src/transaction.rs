//! Transaction scopes.

use crate::error::StoreError;
use crate::request::{Completer, Request};
use crate::worker::Command;
use fieldsync_protocol::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionMode {
    /// Reads only. Read-only transactions never block each other.
    ReadOnly,
    /// Reads and writes. Excludes every other transaction on the same stores.
    ReadWrite,
}

impl TransactionMode {
    /// Returns true if writes are allowed.
    pub fn is_writable(self) -> bool {
        self == TransactionMode::ReadWrite
    }
}

/// Predicate over `(key, value)` used by [`TransactionScope::delete_matching`].
pub type EntryFilter = Arc<dyn Fn(&str, &Value) -> bool + Send + Sync>;

/// One operation issued inside a transaction.
pub(crate) enum Operation {
    Get {
        store: String,
        key: String,
        reply: Completer<Option<Value>>,
    },
    Put {
        store: String,
        key: String,
        value: Value,
        reply: Completer<String>,
    },
    Delete {
        store: String,
        key: String,
        reply: Completer<()>,
    },
    Clear {
        store: String,
        reply: Completer<()>,
    },
    DeleteMatching {
        store: String,
        filter: EntryFilter,
        reply: Completer<usize>,
    },
    Count {
        store: String,
        reply: Completer<usize>,
    },
    GetAll {
        store: String,
        reply: Completer<Vec<(String, Value)>>,
    },
}

impl Operation {
    pub(crate) fn store(&self) -> &str {
        match self {
            Operation::Get { store, .. }
            | Operation::Put { store, .. }
            | Operation::Delete { store, .. }
            | Operation::Clear { store, .. }
            | Operation::DeleteMatching { store, .. }
            | Operation::Count { store, .. }
            | Operation::GetAll { store, .. } => store,
        }
    }

    pub(crate) fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Put { .. }
                | Operation::Delete { .. }
                | Operation::Clear { .. }
                | Operation::DeleteMatching { .. }
        )
    }

    /// Completes the operation's request with an error.
    pub(crate) fn fail(self, err: StoreError) {
        match self {
            Operation::Get { reply, .. } => reply.fail(err),
            Operation::Put { reply, .. } => reply.fail(err),
            Operation::Delete { reply, .. } => reply.fail(err),
            Operation::Clear { reply, .. } => reply.fail(err),
            Operation::DeleteMatching { reply, .. } => reply.fail(err),
            Operation::Count { reply, .. } => reply.fail(err),
            Operation::GetAll { reply, .. } => reply.fail(err),
        }
    }
}

/// State shared between a scope and the worker entry of its transaction.
#[derive(Debug)]
pub(crate) struct TxShared {
    pub(crate) id: u64,
    /// Operations issued through any clone of the scope.
    pub(crate) issued: AtomicUsize,
    /// Set by the worker before the transaction's request completes.
    pub(crate) finished: AtomicBool,
}

impl TxShared {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            issued: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
        }
    }
}

/// Handle used to issue operations inside a transaction.
///
/// A scope is handed to the transaction body. It can be cloned and moved
/// into completion handlers of earlier requests, so follow-up operations
/// can be issued once a read completes. The transaction commits when the
/// body has returned and every issued request has completed without error.
///
/// Requests issued after the transaction finished complete with
/// [`StoreError::TransactionInactive`].
#[derive(Clone)]
pub struct TransactionScope {
    shared: Arc<TxShared>,
    stores: Arc<[String]>,
    mode: TransactionMode,
    commands: mpsc::UnboundedSender<Command>,
}

impl fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field("id", &self.shared.id)
            .field("stores", &self.stores)
            .field("mode", &self.mode)
            .finish()
    }
}

impl TransactionScope {
    pub(crate) fn new(
        shared: Arc<TxShared>,
        stores: Arc<[String]>,
        mode: TransactionMode,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            shared,
            stores,
            mode,
            commands,
        }
    }

    /// Returns the transaction id.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Returns the access mode.
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns the object stores the transaction may touch.
    pub fn stores(&self) -> &[String] {
        &self.stores
    }

    /// Returns true once the transaction has committed or aborted.
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Reads one entry.
    pub fn get(&self, store: &str, key: &str) -> Request<Option<Value>> {
        self.issue(|reply| Operation::Get {
            store: store.to_string(),
            key: key.to_string(),
            reply,
        })
    }

    /// Inserts or overwrites an entry. Resolves to the key.
    pub fn put(&self, store: &str, key: &str, value: Value) -> Request<String> {
        self.issue(|reply| Operation::Put {
            store: store.to_string(),
            key: key.to_string(),
            value,
            reply,
        })
    }

    /// Removes an entry if present.
    pub fn delete(&self, store: &str, key: &str) -> Request<()> {
        self.issue(|reply| Operation::Delete {
            store: store.to_string(),
            key: key.to_string(),
            reply,
        })
    }

    /// Removes every entry of a store.
    pub fn clear(&self, store: &str) -> Request<()> {
        self.issue(|reply| Operation::Clear {
            store: store.to_string(),
            reply,
        })
    }

    /// Removes every entry for which `filter` returns true. Resolves to the
    /// number of removed entries.
    pub fn delete_matching<F>(&self, store: &str, filter: F) -> Request<usize>
    where
        F: Fn(&str, &Value) -> bool + Send + Sync + 'static,
    {
        self.issue(|reply| Operation::DeleteMatching {
            store: store.to_string(),
            filter: Arc::new(filter),
            reply,
        })
    }

    /// Counts the entries of a store, as seen by this transaction.
    pub fn count(&self, store: &str) -> Request<usize> {
        self.issue(|reply| Operation::Count {
            store: store.to_string(),
            reply,
        })
    }

    /// Returns every entry of a store ordered by key, as seen by this
    /// transaction.
    pub fn get_all(&self, store: &str) -> Request<Vec<(String, Value)>> {
        self.issue(|reply| Operation::GetAll {
            store: store.to_string(),
            reply,
        })
    }

    /// Aborts the transaction. Every write issued in it is discarded and
    /// the transaction completes with [`StoreError::Aborted`].
    pub fn abort(&self) {
        if self.is_finished() {
            return;
        }
        // Counted like an operation so the transaction cannot commit first.
        self.shared.issued.fetch_add(1, Ordering::AcqRel);
        let _ = self.commands.send(Command::Abort {
            tx: self.shared.id,
            reason: "aborted by caller".to_string(),
        });
    }

    fn issue<T, F>(&self, build: F) -> Request<T>
    where
        F: FnOnce(Completer<T>) -> Operation,
    {
        if self.is_finished() {
            return Request::done(Err(StoreError::TransactionInactive));
        }
        let (request, reply) = Request::pending();
        self.shared.issued.fetch_add(1, Ordering::AcqRel);
        // A failed send drops the operation, which resolves its request as closed.
        let _ = self.commands.send(Command::Op {
            tx: self.shared.id,
            op: build(reply),
        });
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ReadyState;
    use serde_json::json;

    fn scope() -> (TransactionScope, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scope = TransactionScope::new(
            Arc::new(TxShared::new(1)),
            Arc::from(vec!["sites".to_string()]),
            TransactionMode::ReadWrite,
            tx,
        );
        (scope, rx)
    }

    #[test]
    fn issuing_counts_operations() {
        let (scope, mut rx) = scope();
        let _ = scope.put("sites", "1", json!(1));
        let _ = scope.get("sites", "1");
        assert_eq!(scope.shared.issued.load(Ordering::SeqCst), 2);

        let first = rx.try_recv().unwrap();
        assert!(matches!(first, Command::Op { tx: 1, op: Operation::Put { .. } }));
    }

    #[test]
    fn finished_scope_rejects_operations() {
        let (scope, mut rx) = scope();
        scope.shared.finished.store(true, Ordering::SeqCst);

        let request = scope.count("sites");
        assert_eq!(request.ready_state(), ReadyState::Done);
        assert_eq!(request.error(), Some(StoreError::TransactionInactive));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn lost_worker_resolves_as_closed() {
        let (scope, rx) = scope();
        drop(rx);
        let request = scope.delete("sites", "1");
        assert_eq!(request.error(), Some(StoreError::Closed));
    }

    #[test]
    fn operation_classification() {
        let (request, reply) = Request::<usize>::pending();
        let op = Operation::Count {
            store: "sites".into(),
            reply,
        };
        assert_eq!(op.store(), "sites");
        assert!(!op.is_write());
        op.fail(StoreError::ReadOnly);
        assert_eq!(request.error(), Some(StoreError::ReadOnly));
        assert!(TransactionMode::ReadWrite.is_writable());
        assert!(!TransactionMode::ReadOnly.is_writable());
    }
}
