//! The query layer the catalog reads the dataset through.

use crate::error::CatalogResult;
use crate::model::{Activity, AdminEntity, AdminLevel, Country, Database, Location, OrgUnit, Site};

/// Read access to the authoritative dataset.
///
/// Implementations map any storage failure to
/// [`crate::CatalogError::Unavailable`]. Every listing is returned in a
/// stable order so that catalogs are deterministic.
pub trait CatalogSource: Send + Sync {
    /// Looks up an org unit.
    fn org_unit(&self, id: u32) -> CatalogResult<Option<OrgUnit>>;

    /// Returns the direct children of an org unit, ordered by id.
    fn org_unit_children(&self, parent_id: u32) -> CatalogResult<Vec<OrgUnit>>;

    /// Returns every database ordered by name, ties broken by id.
    fn databases_alphabetically(&self) -> CatalogResult<Vec<Database>>;

    /// Looks up a country.
    fn country(&self, id: u32) -> CatalogResult<Option<Country>>;

    /// Returns the admin levels of a country, ordered by id.
    fn admin_levels(&self, country_id: u32) -> CatalogResult<Vec<AdminLevel>>;

    /// Looks up an admin level.
    fn admin_level(&self, id: u32) -> CatalogResult<Option<AdminLevel>>;

    /// Returns the entities of an admin level, ordered by id.
    fn admin_entities(&self, level_id: u32) -> CatalogResult<Vec<AdminEntity>>;

    /// Returns the activities of a database, ordered by id.
    fn activities(&self, database_id: u32) -> CatalogResult<Vec<Activity>>;

    /// Returns the locations of a country, ordered by id.
    fn locations(&self, country_id: u32) -> CatalogResult<Vec<Location>>;

    /// Returns every distinct `(database id, partner org unit id)` pair that
    /// at least one site is attached to, in ascending order.
    fn site_pairs(&self) -> CatalogResult<Vec<(u32, u32)>>;

    /// Returns the sites of one database reported by one partner, deleted
    /// ones included, ordered by id.
    fn sites(&self, database_id: u32, partner_id: u32) -> CatalogResult<Vec<Site>>;
}
