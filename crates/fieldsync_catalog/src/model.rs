//! The authoritative dataset, as seen by the catalog.
//!
//! These are plain relational rows. Sites reach their database through
//! their activity, and reach their partner through `partner_id`.

use fieldsync_protocol::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A country. Databases belong to exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    /// Country ID.
    pub id: u32,
    /// Display name.
    pub name: String,
}

/// An administrative level of a country (province, district, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminLevel {
    /// Level ID.
    pub id: u32,
    /// Owning country.
    pub country_id: u32,
    /// Display name.
    pub name: String,
    /// Parent level, for nested levels.
    #[serde(default)]
    pub parent_id: Option<u32>,
}

/// One administrative area of a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminEntity {
    /// Entity ID.
    pub id: u32,
    /// Level this entity belongs to.
    pub level_id: u32,
    /// Display name.
    pub name: String,
    /// Enclosing entity of the parent level.
    #[serde(default)]
    pub parent_id: Option<u32>,
}

/// A node of the organizational tree. Partners are org units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgUnit {
    /// Org unit ID.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Parent unit; `None` for a root.
    #[serde(default)]
    pub parent_id: Option<u32>,
}

/// A user database: a set of activities reported on in one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /// Database ID.
    pub id: u32,
    /// Display name, used for catalog ordering.
    pub name: String,
    /// Country the database reports on.
    pub country_id: u32,
    /// Org unit owning the database.
    pub owner_org_unit_id: u32,
}

/// An activity of a database. Sites are reported against activities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    /// Activity ID.
    pub id: u32,
    /// Owning database.
    pub database_id: u32,
    /// Display name.
    pub name: String,
    /// Indicator columns recorded for each site.
    #[serde(default)]
    pub attributes: Vec<String>,
}

/// A geographic location sites can be attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    /// Location ID.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Country the location lies in.
    pub country_id: u32,
    /// Admin entities enclosing the location.
    #[serde(default)]
    pub admin_entity_ids: Vec<u32>,
}

/// A site record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    /// Site ID.
    pub id: u32,
    /// Activity the site reports on.
    pub activity_id: u32,
    /// Partner org unit that reported the site.
    pub partner_id: u32,
    /// Where the site is.
    #[serde(default)]
    pub location_id: Option<u32>,
    /// Recorded indicator values.
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    /// Soft deletion marker. Deleted sites are sent to clients as removals.
    #[serde(default)]
    pub deleted: bool,
}

/// Every table of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dataset {
    /// Countries.
    pub countries: Vec<Country>,
    /// Admin levels.
    pub admin_levels: Vec<AdminLevel>,
    /// Admin entities.
    pub admin_entities: Vec<AdminEntity>,
    /// Org units.
    pub org_units: Vec<OrgUnit>,
    /// User databases.
    pub databases: Vec<Database>,
    /// Activities.
    pub activities: Vec<Activity>,
    /// Locations.
    pub locations: Vec<Location>,
    /// Sites.
    pub sites: Vec<Site>,
}
