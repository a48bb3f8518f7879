//! Sync regions and their identifier layout.
//!
//! A region identifier is path-like and encodes which slice of the
//! authoritative dataset it covers:
//!
//! | identifier          | kind                     | store          |
//! |---------------------|--------------------------|----------------|
//! | `schema`            | [`RegionKind::Schema`]     | `schema`       |
//! | `admin/<level>`     | [`RegionKind::AdminLevel`] | `admin-levels` |
//! | `locations`         | [`RegionKind::Locations`]  | `locations`    |
//! | `site-tables`       | [`RegionKind::SiteTables`] | `site-tables`  |
//! | `site/<db>/<unit>`  | [`RegionKind::Sites`]      | `sites`        |

use crate::error::{ProtocolError, ProtocolResult};
use crate::{
    Value, ADMIN_LEVELS_STORE, LOCATIONS_STORE, SCHEMA_STORE, SITES_STORE, SITE_TABLES_STORE,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity field holding the admin level an admin record belongs to.
pub const LEVEL_ID_FIELD: &str = "levelId";
/// Entity field holding the database a site belongs to.
pub const DATABASE_ID_FIELD: &str = "databaseId";
/// Entity field holding the partner org unit a site belongs to.
pub const ORG_UNIT_ID_FIELD: &str = "orgUnitId";

/// An independently fetchable partition of the authoritative dataset.
///
/// Regions are value objects computed fresh for every catalog request.
/// Their order in a catalog is significant: later regions may reference
/// entities created by earlier ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRegion {
    /// Globally unique, path-like identifier.
    pub identifier: String,
    /// Whether the local copy is discarded and replaced on every sync.
    #[serde(rename = "isFullReplace")]
    pub full_replace: bool,
}

impl SyncRegion {
    /// Creates an incremental region.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            full_replace: false,
        }
    }

    /// Creates a full-replace region.
    pub fn full(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            full_replace: true,
        }
    }

    /// Creates a region for a kind, using the kind's replace policy.
    pub fn from_kind(kind: &RegionKind) -> Self {
        Self {
            identifier: kind.to_string(),
            full_replace: kind.is_full_replace(),
        }
    }

    /// Parses the identifier into a [`RegionKind`].
    pub fn kind(&self) -> ProtocolResult<RegionKind> {
        RegionKind::parse(&self.identifier)
    }
}

impl fmt::Display for SyncRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.full_replace {
            write!(f, "{} (full)", self.identifier)
        } else {
            f.write_str(&self.identifier)
        }
    }
}

/// The parsed form of a region identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegionKind {
    /// Databases, activities and countries.
    Schema,
    /// One admin level and its entities.
    AdminLevel(u32),
    /// All locations.
    Locations,
    /// Structural definitions for site storage.
    SiteTables,
    /// Sites of one database reported by one partner org unit.
    Sites {
        /// Database ID.
        database_id: u32,
        /// Partner org unit ID.
        org_unit_id: u32,
    },
}

impl RegionKind {
    /// Parses a region identifier.
    pub fn parse(identifier: &str) -> ProtocolResult<Self> {
        let invalid = || ProtocolError::InvalidRegion(identifier.to_string());
        let mut parts = identifier.split('/');
        let head = parts.next().ok_or_else(invalid)?;
        let ids: Vec<u32> = parts
            .map(|part| part.parse::<u32>().map_err(|_| invalid()))
            .collect::<ProtocolResult<_>>()?;

        match (head, ids.as_slice()) {
            ("schema", []) => Ok(RegionKind::Schema),
            ("admin", [level]) => Ok(RegionKind::AdminLevel(*level)),
            ("locations", []) => Ok(RegionKind::Locations),
            ("site-tables", []) => Ok(RegionKind::SiteTables),
            ("site", [database_id, org_unit_id]) => Ok(RegionKind::Sites {
                database_id: *database_id,
                org_unit_id: *org_unit_id,
            }),
            _ => Err(invalid()),
        }
    }

    /// Returns whether regions of this kind are replaced wholesale.
    ///
    /// Schema and admin levels are small, frequently changing reference
    /// sets; everything else is applied incrementally.
    pub fn is_full_replace(&self) -> bool {
        matches!(self, RegionKind::Schema | RegionKind::AdminLevel(_))
    }

    /// Returns the local store this region writes to.
    pub fn store(&self) -> &'static str {
        self.namespace().store
    }

    /// Returns the slice of the local store owned by this region.
    pub fn namespace(&self) -> Namespace {
        match *self {
            RegionKind::Schema => Namespace::whole(SCHEMA_STORE),
            RegionKind::AdminLevel(level_id) => Namespace {
                store: ADMIN_LEVELS_STORE,
                filter: NamespaceFilter::AdminLevel(level_id),
            },
            RegionKind::Locations => Namespace::whole(LOCATIONS_STORE),
            RegionKind::SiteTables => Namespace::whole(SITE_TABLES_STORE),
            RegionKind::Sites {
                database_id,
                org_unit_id,
            } => Namespace {
                store: SITES_STORE,
                filter: NamespaceFilter::SitePair {
                    database_id,
                    org_unit_id,
                },
            },
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKind::Schema => f.write_str("schema"),
            RegionKind::AdminLevel(level) => write!(f, "admin/{level}"),
            RegionKind::Locations => f.write_str("locations"),
            RegionKind::SiteTables => f.write_str("site-tables"),
            RegionKind::Sites {
                database_id,
                org_unit_id,
            } => write!(f, "site/{database_id}/{org_unit_id}"),
        }
    }
}

/// The entries of one local store that belong to a region.
///
/// Region identifiers are never persisted; membership is reconstructed
/// from fields the entities carry themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Namespace {
    /// Store name.
    pub store: &'static str,
    /// Which entries of the store belong to the region.
    pub filter: NamespaceFilter,
}

/// Membership rule of a [`Namespace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceFilter {
    /// Every entry of the store.
    All,
    /// Entries whose `levelId` matches.
    AdminLevel(u32),
    /// Entries whose `databaseId` and `orgUnitId` match.
    SitePair {
        /// Database ID.
        database_id: u32,
        /// Partner org unit ID.
        org_unit_id: u32,
    },
}

impl Namespace {
    fn whole(store: &'static str) -> Self {
        Self {
            store,
            filter: NamespaceFilter::All,
        }
    }

    /// Returns true if the stored value belongs to this namespace.
    pub fn contains(&self, value: &Value) -> bool {
        let field_is = |name: &str, expected: u32| {
            value.get(name).and_then(Value::as_u64) == Some(u64::from(expected))
        };
        match self.filter {
            NamespaceFilter::All => true,
            NamespaceFilter::AdminLevel(level_id) => field_is(LEVEL_ID_FIELD, level_id),
            NamespaceFilter::SitePair {
                database_id,
                org_unit_id,
            } => field_is(DATABASE_ID_FIELD, database_id) && field_is(ORG_UNIT_ID_FIELD, org_unit_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn parse_fixed_regions() {
        assert_eq!(RegionKind::parse("schema").unwrap(), RegionKind::Schema);
        assert_eq!(RegionKind::parse("locations").unwrap(), RegionKind::Locations);
        assert_eq!(RegionKind::parse("site-tables").unwrap(), RegionKind::SiteTables);
    }

    #[test]
    fn parse_parameterized_regions() {
        assert_eq!(RegionKind::parse("admin/42").unwrap(), RegionKind::AdminLevel(42));
        assert_eq!(
            RegionKind::parse("site/7/3").unwrap(),
            RegionKind::Sites {
                database_id: 7,
                org_unit_id: 3
            }
        );
    }

    #[test]
    fn parse_rejects_malformed_identifiers() {
        for bad in ["", "admin", "admin/x", "admin/1/2", "site/7", "schema/1", "sites/1/2"] {
            assert!(
                matches!(RegionKind::parse(bad), Err(ProtocolError::InvalidRegion(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn replace_policy_by_kind() {
        assert!(SyncRegion::from_kind(&RegionKind::Schema).full_replace);
        assert!(SyncRegion::from_kind(&RegionKind::AdminLevel(1)).full_replace);
        assert!(!SyncRegion::from_kind(&RegionKind::Locations).full_replace);
        assert!(!SyncRegion::from_kind(&RegionKind::SiteTables).full_replace);
    }

    #[test]
    fn region_serializes_with_wire_field_names() {
        let json = serde_json::to_value(SyncRegion::full("admin/4")).unwrap();
        assert_eq!(json, json!({"identifier": "admin/4", "isFullReplace": true}));
    }

    #[test]
    fn admin_namespace_matches_level_field() {
        let ns = RegionKind::AdminLevel(4).namespace();
        assert_eq!(ns.store, ADMIN_LEVELS_STORE);
        assert!(ns.contains(&json!({"id": 10, "levelId": 4})));
        assert!(!ns.contains(&json!({"id": 11, "levelId": 5})));
        assert!(!ns.contains(&json!({"id": 12})));
    }

    #[test]
    fn site_namespace_needs_both_fields() {
        let ns = RegionKind::Sites {
            database_id: 1,
            org_unit_id: 2,
        }
        .namespace();
        assert!(ns.contains(&json!({"databaseId": 1, "orgUnitId": 2})));
        assert!(!ns.contains(&json!({"databaseId": 1, "orgUnitId": 3})));
        assert!(!ns.contains(&json!({"databaseId": 1})));
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(level in any::<u32>(), db in any::<u32>(), unit in any::<u32>()) {
            for kind in [
                RegionKind::Schema,
                RegionKind::AdminLevel(level),
                RegionKind::Locations,
                RegionKind::SiteTables,
                RegionKind::Sites { database_id: db, org_unit_id: unit },
            ] {
                prop_assert_eq!(RegionKind::parse(&kind.to_string()).unwrap(), kind);
            }
        }
    }
}
