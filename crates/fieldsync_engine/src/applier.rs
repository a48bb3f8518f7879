//! Store-backed region applier.
//!
//! Writes one region payload into the local store as a single read-write
//! transaction scoped to the store the region owns.
//!
//! # Replace policy
//!
//! - Full-replace regions first delete every entry of their namespace, then
//!   insert the payload. Replaying the same payload yields the same state.
//! - Incremental regions upsert and remove by key and leave other entries
//!   alone.
//!
//! Either way nothing is visible until the transaction commits, and a
//! failing write rolls the whole region back.

use crate::error::{SyncError, SyncResult};
use fieldsync_protocol::{ChangeOp, Namespace, RegionPayload, SyncRegion, Value};
use fieldsync_store::{LocalStore, TransactionMode};

/// What applying one region changed locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedRegion {
    /// Entries written.
    pub upserts: usize,
    /// Entries removed by explicit removals.
    pub removals: usize,
    /// Entries deleted before a full replace.
    pub replaced: usize,
}

impl AppliedRegion {
    /// Number of payload changes applied.
    pub fn changes(&self) -> usize {
        self.upserts + self.removals
    }
}

/// Applies region payloads to a local store.
///
/// # Example
///
/// ```rust,no_run
/// use fieldsync_engine::RegionApplier;
/// use fieldsync_protocol::{EntityChange, RegionPayload, SyncRegion};
/// use fieldsync_store::LocalStore;
/// use serde_json::json;
///
/// # async fn demo() -> fieldsync_engine::SyncResult<()> {
/// let applier = RegionApplier::new(LocalStore::in_memory());
/// let payload = RegionPayload::new("locations")
///     .with(EntityChange::upsert("locations", "300", json!({"id": 300})));
/// let applied = applier.apply(&SyncRegion::new("locations"), payload).await?;
/// assert_eq!(applied.upserts, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RegionApplier {
    store: LocalStore,
}

impl RegionApplier {
    /// Creates an applier over a store.
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Applies a region payload in one transaction.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Protocol`] if the payload does not belong to the
    ///   region; nothing is written
    /// - [`SyncError::Transaction`] if a write or the commit failed; the
    ///   transaction is rolled back
    /// - [`SyncError::StoreUnavailable`] if the store cannot be used at all
    pub async fn apply(
        &self,
        region: &SyncRegion,
        payload: RegionPayload,
    ) -> SyncResult<AppliedRegion> {
        let namespace = validate(region, &payload)?;

        let mut applied = AppliedRegion::default();
        let mut replaced = None;
        let transaction =
            self.store
                .run_transaction(&[namespace.store], TransactionMode::ReadWrite, |tx| {
                    if region.full_replace {
                        replaced = Some(tx.delete_matching(
                            namespace.store,
                            move |_: &str, value: &Value| namespace.contains(value),
                        ));
                    }
                    for change in payload.changes {
                        match change.op {
                            ChangeOp::Upsert(value) => {
                                tx.put(&change.store, &change.key, value);
                                applied.upserts += 1;
                            }
                            ChangeOp::Remove => {
                                tx.delete(&change.store, &change.key);
                                applied.removals += 1;
                            }
                        }
                    }
                    Ok(())
                });

        transaction.await?;
        if let Some(replaced) = replaced {
            applied.replaced = replaced.await?;
        }
        Ok(applied)
    }
}

/// Checks that every change of `payload` lands inside the region's
/// namespace, so a later full replace can find it again.
fn validate(region: &SyncRegion, payload: &RegionPayload) -> SyncResult<Namespace> {
    let namespace = region.kind()?.namespace();
    if payload.identifier != region.identifier {
        return Err(SyncError::Protocol(format!(
            "payload for {} applied to region {}",
            payload.identifier, region.identifier
        )));
    }
    for change in &payload.changes {
        if change.store != namespace.store {
            return Err(SyncError::Protocol(format!(
                "region {} cannot write to store {:?}",
                region.identifier, change.store
            )));
        }
        if let ChangeOp::Upsert(value) = &change.op {
            if !namespace.contains(value) {
                return Err(SyncError::Protocol(format!(
                    "entity {:?} is outside region {}",
                    change.key, region.identifier
                )));
            }
        }
    }
    Ok(namespace)
}
