//! Store configuration.

use fieldsync_protocol::LOCAL_STORES;

/// The object stores a local database is expected to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSchema {
    /// Schema version. A backend at a lower version is upgraded; a backend
    /// at a higher version cannot be opened.
    pub version: u32,
    /// Object store names.
    pub stores: Vec<String>,
}

impl StoreSchema {
    /// Creates a schema with the given version and stores.
    pub fn new<I, S>(version: u32, stores: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version,
            stores: stores.into_iter().map(Into::into).collect(),
        }
    }

    /// The five-store layout used by sync clients, at version 1.
    pub fn field_sync() -> Self {
        Self::new(1, LOCAL_STORES)
    }

    /// Returns true if the schema declares the store.
    pub fn contains(&self, store: &str) -> bool {
        self.stores.iter().any(|s| s == store)
    }
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self::field_sync()
    }
}

/// Configuration for a [`crate::LocalStore`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreConfig {
    /// Expected schema.
    pub schema: StoreSchema,
    /// Maximum number of entries per object store. `None` means unlimited.
    pub max_entries_per_store: Option<usize>,
}

impl StoreConfig {
    /// Creates a new configuration with the default schema and no quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expected schema.
    pub fn with_schema(mut self, schema: StoreSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Sets the per-store entry quota.
    pub fn with_max_entries_per_store(mut self, limit: usize) -> Self {
        self.max_entries_per_store = Some(limit);
        self
    }
}
