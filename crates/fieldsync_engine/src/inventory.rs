//! What the local store already holds.
//!
//! No sync log is kept. Which regions are present is reconstructed from
//! the entities themselves, through the namespace of each region kind.

use crate::error::{SyncError, SyncResult};
use fieldsync_protocol::{SyncRegion, Value, LOCAL_STORES};
use fieldsync_store::{LocalStore, TransactionMode};
use std::collections::BTreeMap;

/// A read-only view of every local entry, grouped by store.
#[derive(Debug, Clone, Default)]
pub struct RegionInventory {
    stores: BTreeMap<String, Vec<Value>>,
}

impl RegionInventory {
    /// Reads every local store in one read-only transaction.
    ///
    /// The transaction queues behind any running region write, so the
    /// inventory never sees a region halfway replaced.
    pub async fn load(store: &LocalStore) -> SyncResult<Self> {
        let mut reads = Vec::new();
        let transaction = store.run_transaction(&LOCAL_STORES, TransactionMode::ReadOnly, |tx| {
            for name in LOCAL_STORES {
                reads.push((name, tx.get_all(name)));
            }
            Ok(())
        });
        transaction.await.map_err(SyncError::StoreUnavailable)?;

        let mut stores = BTreeMap::new();
        for (name, read) in reads {
            let entries = read.await.map_err(SyncError::StoreUnavailable)?;
            stores.insert(
                name.to_string(),
                entries.into_iter().map(|(_, value)| value).collect(),
            );
        }
        Ok(Self { stores })
    }

    /// Returns the number of entries of a store.
    pub fn len(&self, store: &str) -> usize {
        self.stores.get(store).map_or(0, Vec::len)
    }

    /// Returns true if no store holds any entry.
    pub fn is_empty(&self) -> bool {
        self.stores.values().all(Vec::is_empty)
    }

    /// Returns true if at least one local entry belongs to the region.
    ///
    /// Regions with unparsable identifiers are never present.
    pub fn contains(&self, region: &SyncRegion) -> bool {
        let Ok(kind) = region.kind() else {
            return false;
        };
        let namespace = kind.namespace();
        self.stores
            .get(namespace.store)
            .is_some_and(|values| values.iter().any(|v| namespace.contains(v)))
    }

    /// Returns the regions of `catalog` with no local entry, in catalog
    /// order.
    ///
    /// A region that is legitimately empty on the server is always
    /// reported; fetching it again is harmless.
    pub fn missing_regions(&self, catalog: &[SyncRegion]) -> Vec<SyncRegion> {
        catalog
            .iter()
            .filter(|region| !self.contains(region))
            .cloned()
            .collect()
    }
}
