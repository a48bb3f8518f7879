//! In-memory store backend.

use crate::backend::{Mutation, StoreBackend, StoreSnapshot};
use crate::config::StoreSchema;
use crate::error::{StoreError, StoreResult};
use fieldsync_protocol::Value;
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory store backend.
///
/// Clones share the same state, so a test can keep one handle for
/// inspection while the store worker owns another.
///
/// # Example
///
/// ```rust
/// use fieldsync_store::{MemoryBackend, StoreBackend, StoreSchema};
///
/// let mut backend = MemoryBackend::new();
/// backend.upgrade(&StoreSchema::field_sync()).unwrap();
/// assert_eq!(backend.schema_version().unwrap(), 1);
/// assert_eq!(backend.len("sites").unwrap(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<StoreSnapshot>>,
    denied: Option<String>,
    commit_failure: Option<String>,
}

impl MemoryBackend {
    /// Creates a new uninitialized backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend seeded with existing state.
    ///
    /// Useful for testing upgrade and mismatch scenarios.
    #[must_use]
    pub fn with_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Arc::new(RwLock::new(snapshot)),
            ..Self::default()
        }
    }

    /// Creates a backend that refuses to open, as when the user denies
    /// storage access.
    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            denied: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Makes every subsequent commit fail with the given reason.
    #[must_use]
    pub fn with_commit_failure(mut self, reason: impl Into<String>) -> Self {
        self.commit_failure = Some(reason.into());
        self
    }

    /// Returns a copy of the committed state.
    #[must_use]
    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.read().clone()
    }

    /// Returns a committed entry, bypassing the store worker.
    #[must_use]
    pub fn entry(&self, store: &str, key: &str) -> Option<Value> {
        self.state
            .read()
            .stores
            .get(store)
            .and_then(|entries| entries.get(key).cloned())
    }
}

impl StoreBackend for MemoryBackend {
    fn check_available(&self) -> StoreResult<()> {
        match &self.denied {
            Some(reason) => Err(StoreError::unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn schema_version(&self) -> StoreResult<u32> {
        Ok(self.state.read().version)
    }

    fn upgrade(&mut self, schema: &StoreSchema) -> StoreResult<()> {
        self.state.write().upgrade(schema);
        Ok(())
    }

    fn has_store(&self, store: &str) -> StoreResult<bool> {
        Ok(self.state.read().stores.contains_key(store))
    }

    fn store_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.state.read().stores.keys().cloned().collect())
    }

    fn get(&self, store: &str, key: &str) -> StoreResult<Option<Value>> {
        self.state.read().get(store, key)
    }

    fn scan(&self, store: &str) -> StoreResult<Vec<(String, Value)>> {
        self.state.read().scan(store)
    }

    fn len(&self, store: &str) -> StoreResult<usize> {
        self.state.read().len(store)
    }

    fn commit(&mut self, batch: &[Mutation]) -> StoreResult<()> {
        if let Some(reason) = &self.commit_failure {
            return Err(StoreError::CommitFailed(reason.clone()));
        }
        let mut state = self.state.write();
        let mut next = state.clone();
        next.apply(batch)?;
        *state = next;
        Ok(())
    }
}
