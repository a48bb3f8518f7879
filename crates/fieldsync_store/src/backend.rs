//! Storage backend trait definition.

use crate::config::StoreSchema;
use crate::error::{StoreError, StoreResult};
use fieldsync_protocol::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A committed-state key-object store.
///
/// Backends know nothing about transactions, requests or scheduling. The
/// store worker reads committed state through them and hands them one
/// batch of [`Mutation`]s per committed transaction.
///
/// # Invariants
///
/// - `commit` applies the whole batch or none of it
/// - reads reflect every batch that was committed before them
/// - keys within a store are unique
///
/// # Implementors
///
/// - [`crate::MemoryBackend`] - For testing
/// - [`crate::FileBackend`] - For persistent storage
pub trait StoreBackend: Send + 'static {
    /// Checks that the backend may be opened at all.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if access is denied.
    fn check_available(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Returns the schema version the backend was last upgraded to.
    fn schema_version(&self) -> StoreResult<u32>;

    /// Creates every missing store of `schema` and records its version.
    fn upgrade(&mut self, schema: &StoreSchema) -> StoreResult<()>;

    /// Returns true if the object store exists.
    fn has_store(&self, store: &str) -> StoreResult<bool>;

    /// Returns the names of every object store.
    fn store_names(&self) -> StoreResult<Vec<String>>;

    /// Reads one committed entry.
    fn get(&self, store: &str, key: &str) -> StoreResult<Option<Value>>;

    /// Returns every committed entry of a store, ordered by key.
    fn scan(&self, store: &str) -> StoreResult<Vec<(String, Value)>>;

    /// Returns the number of committed entries in a store.
    fn len(&self, store: &str) -> StoreResult<usize>;

    /// Atomically applies a batch of mutations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CommitFailed`] if the batch could not be
    /// applied. Nothing from the batch is visible in that case.
    fn commit(&mut self, batch: &[Mutation]) -> StoreResult<()>;
}

/// A single write against one object store.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Target object store.
    pub store: String,
    /// What to do.
    pub op: MutationOp,
}

/// Kind of write.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOp {
    /// Insert or overwrite an entry.
    Put {
        /// Entry key.
        key: String,
        /// New value.
        value: Value,
    },
    /// Remove an entry if present.
    Delete {
        /// Entry key.
        key: String,
    },
    /// Remove every entry of the store.
    Clear,
}

impl Mutation {
    /// Creates a put mutation.
    pub fn put(store: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            store: store.into(),
            op: MutationOp::Put {
                key: key.into(),
                value,
            },
        }
    }

    /// Creates a delete mutation.
    pub fn delete(store: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            op: MutationOp::Delete { key: key.into() },
        }
    }

    /// Creates a clear mutation.
    pub fn clear(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            op: MutationOp::Clear,
        }
    }
}

/// The complete committed state of a local database.
///
/// Both bundled backends keep one of these; the file backend persists it
/// as CBOR.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Schema version last upgraded to. Zero means never initialized.
    pub version: u32,
    /// Entries per object store.
    pub stores: BTreeMap<String, BTreeMap<String, Value>>,
}

impl StoreSnapshot {
    /// Creates an empty, uninitialized snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates missing stores and raises the version.
    pub fn upgrade(&mut self, schema: &StoreSchema) {
        for store in &schema.stores {
            self.stores.entry(store.clone()).or_default();
        }
        self.version = self.version.max(schema.version);
    }

    /// Returns one entry.
    pub fn get(&self, store: &str, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.store(store)?.get(key).cloned())
    }

    /// Returns every entry of a store, ordered by key.
    pub fn scan(&self, store: &str) -> StoreResult<Vec<(String, Value)>> {
        Ok(self
            .store(store)?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Returns the number of entries in a store.
    pub fn len(&self, store: &str) -> StoreResult<usize> {
        Ok(self.store(store)?.len())
    }

    /// Returns true if no store holds any entry.
    pub fn is_empty(&self) -> bool {
        self.stores.values().all(BTreeMap::is_empty)
    }

    /// Applies a batch in order. On error the snapshot may be partially
    /// modified, so callers apply batches to a copy.
    pub fn apply(&mut self, batch: &[Mutation]) -> StoreResult<()> {
        for mutation in batch {
            let entries = self.stores.get_mut(&mutation.store).ok_or_else(|| {
                StoreError::CommitFailed(format!("unknown object store {:?}", mutation.store))
            })?;
            match &mutation.op {
                MutationOp::Put { key, value } => {
                    entries.insert(key.clone(), value.clone());
                }
                MutationOp::Delete { key } => {
                    entries.remove(key);
                }
                MutationOp::Clear => entries.clear(),
            }
        }
        Ok(())
    }

    fn store(&self, store: &str) -> StoreResult<&BTreeMap<String, Value>> {
        self.stores
            .get(store)
            .ok_or_else(|| StoreError::unavailable(format!("object store {store:?} does not exist")))
    }
}
