//! Test fixtures and store helpers.
//!
//! Provides a small sample dataset with a known region layout, catalog
//! servers over it, and local stores with inspectable state.

use fieldsync_catalog::{
    Activity, AdminEntity, AdminLevel, CatalogServer, CatalogSource, Country, Database, Dataset,
    InMemoryDataset, Location, OrgUnit, Site,
};
use fieldsync_protocol::{UserContext, Value};
use fieldsync_store::{FileBackend, LocalStore, MemoryBackend, StoreConfig, StoreSnapshot};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Regions the scenario user sees in [`scenario_dataset`], in catalog order.
///
/// Two databases share country 1, so its single admin level is listed
/// once, and only database 5 has sites.
pub const SCENARIO_REGIONS: [&str; 5] = [
    "schema",
    "admin/1",
    "locations",
    "site-tables",
    "site/5/9",
];

/// Builds an org unit.
pub fn org_unit(id: u32, name: &str, parent_id: Option<u32>) -> OrgUnit {
    OrgUnit {
        id,
        name: name.to_string(),
        parent_id,
    }
}

/// Builds a database.
pub fn database(id: u32, name: &str, country_id: u32, owner_org_unit_id: u32) -> Database {
    Database {
        id,
        name: name.to_string(),
        country_id,
        owner_org_unit_id,
    }
}

/// Builds a live site with a single `beds` value.
pub fn site(id: u32, activity_id: u32, partner_id: u32, beds: i64) -> Site {
    Site {
        id,
        activity_id,
        partner_id,
        location_id: None,
        values: BTreeMap::from([("beds".to_string(), json!(beds))]),
        deleted: false,
    }
}

/// The sample dataset.
///
/// - Country 1 (Congo) with admin level 1 and two entities
/// - Org unit 1 (HQ) with partner 9 below it
/// - Databases 5 (Health) and 6 (Nutrition), both in country 1, owned by HQ
/// - Sites 101 and 102 in database 5, reported by partner 9
pub fn scenario_dataset() -> Dataset {
    Dataset {
        countries: vec![Country {
            id: 1,
            name: "Congo".into(),
        }],
        admin_levels: vec![AdminLevel {
            id: 1,
            country_id: 1,
            name: "Province".into(),
            parent_id: None,
        }],
        admin_entities: vec![
            AdminEntity {
                id: 11,
                level_id: 1,
                name: "Kivu".into(),
                parent_id: None,
            },
            AdminEntity {
                id: 12,
                level_id: 1,
                name: "Katanga".into(),
                parent_id: None,
            },
        ],
        org_units: vec![org_unit(1, "HQ", None), org_unit(9, "Field partner", Some(1))],
        databases: vec![
            database(5, "Health", 1, 1),
            database(6, "Nutrition", 1, 1),
        ],
        activities: vec![
            Activity {
                id: 50,
                database_id: 5,
                name: "Clinics".into(),
                attributes: vec!["beds".into()],
            },
            Activity {
                id: 60,
                database_id: 6,
                name: "Feeding".into(),
                attributes: vec![],
            },
        ],
        locations: vec![Location {
            id: 300,
            name: "Goma".into(),
            country_id: 1,
            admin_entity_ids: vec![11],
        }],
        sites: vec![site(101, 50, 9, 12), site(102, 50, 9, 4)],
    }
}

/// The user whose scope covers the whole sample dataset.
pub fn scenario_user() -> UserContext {
    UserContext::new(1, 1)
}

/// A catalog server over the sample dataset.
///
/// The dataset handle is returned so tests can edit it between syncs.
pub fn scenario_server() -> (Arc<InMemoryDataset>, CatalogServer) {
    let dataset = Arc::new(InMemoryDataset::new(scenario_dataset()));
    let source: Arc<dyn CatalogSource> = dataset.clone();
    let server = CatalogServer::new(source);
    (dataset, server)
}

/// A local store whose committed state can be inspected directly.
///
/// Must be created inside a tokio runtime.
pub struct TestStore {
    /// The store instance.
    pub store: LocalStore,
    /// Shares state with the backend owned by the store worker.
    backend: MemoryBackend,
}

impl TestStore {
    /// Creates an in-memory store with the FieldSync schema.
    pub fn memory() -> Self {
        Self::with_backend(MemoryBackend::new(), StoreConfig::default())
    }

    /// Creates a store over a given backend and configuration.
    pub fn with_backend(backend: MemoryBackend, config: StoreConfig) -> Self {
        let store = LocalStore::spawn(backend.clone(), config);
        Self { store, backend }
    }

    /// Returns a copy of the committed state.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.backend.snapshot()
    }

    /// Returns the committed entries of one store, by key.
    pub fn entries(&self, store: &str) -> BTreeMap<String, Value> {
        self.backend
            .snapshot()
            .stores
            .remove(store)
            .unwrap_or_default()
    }

    /// Returns the committed keys of one store, ascending.
    pub fn keys(&self, store: &str) -> Vec<String> {
        self.entries(store).into_keys().collect()
    }

    /// Returns one committed entry.
    pub fn entry(&self, store: &str, key: &str) -> Option<Value> {
        self.backend.entry(store, key)
    }
}

impl std::ops::Deref for TestStore {
    type Target = LocalStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// A temporary location for a file-backed store.
pub struct TempStorePath {
    /// Path of the store snapshot file.
    pub path: PathBuf,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
}

impl TempStorePath {
    /// Creates a fresh temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: temp_dir.path().join("fieldsync.store"),
            _temp_dir: temp_dir,
        }
    }

    /// Opens a store over the file. Must be called inside a tokio runtime.
    pub fn open(&self) -> LocalStore {
        let backend = FileBackend::open(&self.path).expect("Failed to open store file");
        LocalStore::spawn(backend, StoreConfig::default())
    }
}

impl Default for TempStorePath {
    fn default() -> Self {
        Self::new()
    }
}
