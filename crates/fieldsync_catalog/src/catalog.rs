//! Region enumeration.

use crate::error::CatalogResult;
use crate::scope::UserScope;
use crate::source::CatalogSource;
use fieldsync_protocol::{RegionKind, SyncRegion, UserContext};
use std::collections::HashSet;
use std::sync::Arc;

/// Partitions the dataset visible to a user into sync regions.
///
/// The catalog is a pure function of the user's scope and the current
/// dataset. It keeps no state between calls and never persists regions.
///
/// Regions are listed in the order a client must apply them:
///
/// 1. `schema` (full replace)
/// 2. `admin/<level>` for each admin level of every country covered by a
///    visible database, each country once (full replace)
/// 3. `locations`
/// 4. `site-tables`
/// 5. `site/<database>/<partner>` for each pair with at least one site
#[derive(Clone)]
pub struct RegionCatalog {
    source: Arc<dyn CatalogSource>,
}

impl RegionCatalog {
    /// Creates a catalog over a data source.
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }

    /// Returns the underlying data source.
    pub fn source(&self) -> &dyn CatalogSource {
        self.source.as_ref()
    }

    /// Lists the regions visible to `user`, in application order.
    ///
    /// # Errors
    ///
    /// - [`crate::CatalogError::Authorization`] if the user's scope cannot
    ///   be resolved
    /// - [`crate::CatalogError::Unavailable`] if any query fails; no
    ///   partial listing is returned
    pub fn list_regions(&self, user: &UserContext) -> CatalogResult<Vec<SyncRegion>> {
        let source = self.source();
        let scope = UserScope::resolve(source, user)?;
        let databases = scope.visible_databases(source)?;

        let mut regions = vec![SyncRegion::from_kind(&RegionKind::Schema)];

        let mut countries_added = HashSet::new();
        for database in &databases {
            if !countries_added.insert(database.country_id) {
                continue;
            }
            for level in source.admin_levels(database.country_id)? {
                regions.push(SyncRegion::from_kind(&RegionKind::AdminLevel(level.id)));
            }
        }
        let admin_regions = regions.len() - 1;

        regions.push(SyncRegion::from_kind(&RegionKind::Locations));
        regions.push(SyncRegion::from_kind(&RegionKind::SiteTables));

        let visible: HashSet<u32> = databases.iter().map(|db| db.id).collect();
        let mut site_regions = 0;
        for (database_id, org_unit_id) in source.site_pairs()? {
            if visible.contains(&database_id) {
                regions.push(SyncRegion::from_kind(&RegionKind::Sites {
                    database_id,
                    org_unit_id,
                }));
                site_regions += 1;
            }
        }

        tracing::debug!(
            user = user.user_id,
            databases = databases.len(),
            countries = countries_added.len(),
            admin_regions,
            site_regions,
            "listed sync regions"
        );

        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::InMemoryDataset;
    use crate::error::CatalogError;
    use crate::model::{Activity, AdminLevel, Database, Dataset, OrgUnit, Site};

    fn level(id: u32, country_id: u32) -> AdminLevel {
        AdminLevel {
            id,
            country_id,
            name: format!("level {id}"),
            parent_id: None,
        }
    }

    fn database(id: u32, name: &str, country_id: u32, owner: u32) -> Database {
        Database {
            id,
            name: name.into(),
            country_id,
            owner_org_unit_id: owner,
        }
    }

    fn site(id: u32, activity_id: u32, partner_id: u32) -> Site {
        Site {
            id,
            activity_id,
            partner_id,
            location_id: None,
            values: Default::default(),
            deleted: false,
        }
    }

    fn catalog() -> RegionCatalog {
        let dataset = Dataset {
            org_units: vec![
                OrgUnit {
                    id: 1,
                    name: "HQ".into(),
                    parent_id: None,
                },
                OrgUnit {
                    id: 9,
                    name: "Field office".into(),
                    parent_id: Some(1),
                },
                OrgUnit {
                    id: 20,
                    name: "Other NGO".into(),
                    parent_id: None,
                },
            ],
            admin_levels: vec![level(2, 100), level(1, 100), level(3, 200)],
            databases: vec![
                database(5, "Nutrition", 100, 1),
                database(6, "Education", 200, 9),
                database(7, "Health", 100, 1),
                database(8, "Shelter", 300, 20),
            ],
            activities: vec![
                Activity {
                    id: 50,
                    database_id: 5,
                    name: "Feeding".into(),
                    attributes: vec![],
                },
                Activity {
                    id: 80,
                    database_id: 8,
                    name: "Tents".into(),
                    attributes: vec![],
                },
            ],
            sites: vec![site(1, 50, 9), site(2, 50, 9), site(3, 80, 20)],
            ..Dataset::default()
        };
        RegionCatalog::new(Arc::new(InMemoryDataset::new(dataset)))
    }

    fn identifiers(regions: &[SyncRegion]) -> Vec<&str> {
        regions.iter().map(|r| r.identifier.as_str()).collect()
    }

    #[test]
    fn lists_regions_in_application_order() {
        let regions = catalog().list_regions(&UserContext::new(1, 1)).unwrap();

        // Databases alphabetically: Education (200), Health (100), Nutrition (100).
        assert_eq!(
            identifiers(&regions),
            vec![
                "schema",
                "admin/3",
                "admin/1",
                "admin/2",
                "locations",
                "site-tables",
                "site/5/9",
            ]
        );
        assert!(regions[0].full_replace);
        assert!(regions[1..4].iter().all(|r| r.full_replace));
        assert!(regions[4..].iter().all(|r| !r.full_replace));
    }

    #[test]
    fn narrower_scope_sees_fewer_regions() {
        let regions = catalog().list_regions(&UserContext::new(2, 9)).unwrap();
        assert_eq!(
            identifiers(&regions),
            vec!["schema", "admin/3", "locations", "site-tables"]
        );
    }

    #[test]
    fn partners_outside_the_tree_keep_their_site_regions() {
        let dataset = Dataset {
            org_units: vec![
                OrgUnit {
                    id: 1,
                    name: "HQ".into(),
                    parent_id: None,
                },
                OrgUnit {
                    id: 20,
                    name: "Other NGO".into(),
                    parent_id: None,
                },
            ],
            databases: vec![database(5, "Nutrition", 100, 1)],
            activities: vec![Activity {
                id: 50,
                database_id: 5,
                name: "Feeding".into(),
                attributes: vec![],
            }],
            sites: vec![site(1, 50, 20)],
            ..Dataset::default()
        };
        let catalog = RegionCatalog::new(Arc::new(InMemoryDataset::new(dataset)));

        let regions = catalog.list_regions(&UserContext::new(1, 1)).unwrap();
        assert_eq!(
            identifiers(&regions),
            vec!["schema", "locations", "site-tables", "site/5/20"]
        );
    }

    #[test]
    fn listing_is_deterministic() {
        let catalog = catalog();
        let user = UserContext::new(1, 1);
        assert_eq!(
            catalog.list_regions(&user).unwrap(),
            catalog.list_regions(&user).unwrap()
        );
    }

    #[test]
    fn unresolvable_scope_is_unauthorized() {
        let err = catalog()
            .list_regions(&UserContext::unassigned(4))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Authorization(_)));
    }

    #[test]
    fn data_access_failure_aborts_listing() {
        let dataset = Arc::new(InMemoryDataset::new(Dataset::default()));
        dataset.fail_with("replica lagging");
        let catalog = RegionCatalog::new(dataset);
        let err = catalog.list_regions(&UserContext::new(1, 1)).unwrap_err();
        assert_eq!(err, CatalogError::Unavailable("replica lagging".into()));
    }
}
