//! Region payloads.

use crate::Value;
use serde::{Deserialize, Serialize};

/// The content of one region, already mapped to transfer form.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionPayload {
    /// Identifier of the region this payload belongs to.
    pub identifier: String,
    /// Entity changes in application order.
    pub changes: Vec<EntityChange>,
}

impl RegionPayload {
    /// Creates an empty payload for a region.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            changes: Vec::new(),
        }
    }

    /// Appends a change.
    pub fn push(&mut self, change: EntityChange) {
        self.changes.push(change);
    }

    /// Appends a change, builder style.
    #[must_use]
    pub fn with(mut self, change: EntityChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Returns the number of changes.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if the payload carries no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// A single entity change inside a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChange {
    /// Target store.
    pub store: String,
    /// Entity key within the store.
    pub key: String,
    /// What to do with the entity.
    pub op: ChangeOp,
}

/// Operation carried by an [`EntityChange`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeOp {
    /// Insert or overwrite the entity.
    Upsert(Value),
    /// Remove the entity if present.
    Remove,
}

impl EntityChange {
    /// Creates an upsert change.
    pub fn upsert(store: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            store: store.into(),
            key: key.into(),
            op: ChangeOp::Upsert(value),
        }
    }

    /// Creates a removal change.
    pub fn remove(store: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            key: key.into(),
            op: ChangeOp::Remove,
        }
    }

    /// Returns the upserted value, if any.
    pub fn value(&self) -> Option<&Value> {
        match &self.op {
            ChangeOp::Upsert(value) => Some(value),
            ChangeOp::Remove => None,
        }
    }
}
