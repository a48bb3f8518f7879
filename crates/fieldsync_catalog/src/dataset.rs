//! In-memory dataset.

use crate::error::{CatalogError, CatalogResult};
use crate::model::{
    Activity, AdminEntity, AdminLevel, Country, Database, Dataset, Location, OrgUnit, Site,
};
use crate::source::CatalogSource;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// A [`CatalogSource`] over an in-memory [`Dataset`].
///
/// The dataset can be edited while it is being served, which lets tests
/// and demos change the data between two sync runs.
///
/// # Example
///
/// ```
/// use fieldsync_catalog::{CatalogSource, Dataset, InMemoryDataset};
///
/// let dataset = InMemoryDataset::new(Dataset::default());
/// assert!(dataset.site_pairs().unwrap().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryDataset {
    tables: RwLock<Dataset>,
    outage: RwLock<Option<String>>,
}

impl InMemoryDataset {
    /// Wraps a dataset.
    pub fn new(dataset: Dataset) -> Self {
        Self {
            tables: RwLock::new(dataset),
            outage: RwLock::new(None),
        }
    }

    /// Parses a dataset from JSON.
    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let dataset: Dataset = serde_json::from_str(json)
            .map_err(|e| CatalogError::InvalidRequest(format!("malformed dataset: {e}")))?;
        Ok(Self::new(dataset))
    }

    /// Loads a dataset from a JSON file.
    pub fn load(path: &Path) -> CatalogResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CatalogError::Unavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Returns a copy of the tables.
    pub fn snapshot(&self) -> Dataset {
        self.tables.read().clone()
    }

    /// Applies an edit to the tables.
    pub fn update<F: FnOnce(&mut Dataset)>(&self, edit: F) {
        edit(&mut self.tables.write());
    }

    /// Makes every query fail with [`CatalogError::Unavailable`] until
    /// [`InMemoryDataset::restore`] is called.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.outage.write() = Some(reason.into());
    }

    /// Ends a simulated outage.
    pub fn restore(&self) {
        *self.outage.write() = None;
    }

    fn read<T>(&self, query: impl FnOnce(&Dataset) -> T) -> CatalogResult<T> {
        if let Some(reason) = self.outage.read().as_ref() {
            return Err(CatalogError::Unavailable(reason.clone()));
        }
        Ok(query(&self.tables.read()))
    }
}

fn sorted_by_id<T: Clone>(rows: impl Iterator<Item = T>, id: impl Fn(&T) -> u32) -> Vec<T> {
    let mut rows: Vec<T> = rows.collect();
    rows.sort_by_key(|row| id(row));
    rows
}

impl CatalogSource for InMemoryDataset {
    fn org_unit(&self, id: u32) -> CatalogResult<Option<OrgUnit>> {
        self.read(|d| d.org_units.iter().find(|u| u.id == id).cloned())
    }

    fn org_unit_children(&self, parent_id: u32) -> CatalogResult<Vec<OrgUnit>> {
        self.read(|d| {
            sorted_by_id(
                d.org_units
                    .iter()
                    .filter(|u| u.parent_id == Some(parent_id))
                    .cloned(),
                |u| u.id,
            )
        })
    }

    fn databases_alphabetically(&self) -> CatalogResult<Vec<Database>> {
        self.read(|d| {
            let mut databases = d.databases.clone();
            databases.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            databases
        })
    }

    fn country(&self, id: u32) -> CatalogResult<Option<Country>> {
        self.read(|d| d.countries.iter().find(|c| c.id == id).cloned())
    }

    fn admin_levels(&self, country_id: u32) -> CatalogResult<Vec<AdminLevel>> {
        self.read(|d| {
            sorted_by_id(
                d.admin_levels
                    .iter()
                    .filter(|l| l.country_id == country_id)
                    .cloned(),
                |l| l.id,
            )
        })
    }

    fn admin_level(&self, id: u32) -> CatalogResult<Option<AdminLevel>> {
        self.read(|d| d.admin_levels.iter().find(|l| l.id == id).cloned())
    }

    fn admin_entities(&self, level_id: u32) -> CatalogResult<Vec<AdminEntity>> {
        self.read(|d| {
            sorted_by_id(
                d.admin_entities
                    .iter()
                    .filter(|e| e.level_id == level_id)
                    .cloned(),
                |e| e.id,
            )
        })
    }

    fn activities(&self, database_id: u32) -> CatalogResult<Vec<Activity>> {
        self.read(|d| {
            sorted_by_id(
                d.activities
                    .iter()
                    .filter(|a| a.database_id == database_id)
                    .cloned(),
                |a| a.id,
            )
        })
    }

    fn locations(&self, country_id: u32) -> CatalogResult<Vec<Location>> {
        self.read(|d| {
            sorted_by_id(
                d.locations
                    .iter()
                    .filter(|l| l.country_id == country_id)
                    .cloned(),
                |l| l.id,
            )
        })
    }

    fn site_pairs(&self) -> CatalogResult<Vec<(u32, u32)>> {
        self.read(|d| {
            let database_of: HashMap<u32, u32> =
                d.activities.iter().map(|a| (a.id, a.database_id)).collect();
            let pairs: BTreeSet<(u32, u32)> = d
                .sites
                .iter()
                .filter_map(|s| database_of.get(&s.activity_id).map(|db| (*db, s.partner_id)))
                .collect();
            pairs.into_iter().collect()
        })
    }

    fn sites(&self, database_id: u32, partner_id: u32) -> CatalogResult<Vec<Site>> {
        self.read(|d| {
            let activities: BTreeSet<u32> = d
                .activities
                .iter()
                .filter(|a| a.database_id == database_id)
                .map(|a| a.id)
                .collect();
            sorted_by_id(
                d.sites
                    .iter()
                    .filter(|s| s.partner_id == partner_id && activities.contains(&s.activity_id))
                    .cloned(),
                |s| s.id,
            )
        })
    }
}
