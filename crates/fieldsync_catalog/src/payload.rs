//! Region payload construction.
//!
//! Every entity is written in transfer form: a JSON object carrying the
//! fields clients use to tell which region owns it (`levelId` for admin
//! records, `databaseId` and `orgUnitId` for sites).

use crate::error::{CatalogError, CatalogResult};
use crate::scope::UserScope;
use crate::source::CatalogSource;
use fieldsync_protocol::{
    EntityChange, RegionKind, RegionPayload, UserContext, ADMIN_LEVELS_STORE, LOCATIONS_STORE,
    SCHEMA_STORE, SITES_STORE, SITE_TABLES_STORE,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Builds the payload of one region for one user.
#[derive(Clone)]
pub struct PayloadBuilder {
    source: Arc<dyn CatalogSource>,
}

impl PayloadBuilder {
    /// Creates a builder over a data source.
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self { source }
    }

    /// Builds the payload of `identifier` as visible to `user`.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::InvalidRequest`] for a malformed identifier
    /// - [`CatalogError::UnknownRegion`] for an admin level that does not exist
    /// - [`CatalogError::Authorization`] for a region outside the user's scope
    /// - [`CatalogError::Unavailable`] if a query fails
    pub fn build(&self, user: &UserContext, identifier: &str) -> CatalogResult<RegionPayload> {
        let kind = RegionKind::parse(identifier)?;
        let source = self.source.as_ref();
        let scope = UserScope::resolve(source, user)?;

        let mut payload = RegionPayload::new(identifier);
        match kind {
            RegionKind::Schema => self.schema(&scope, &mut payload)?,
            RegionKind::AdminLevel(level_id) => self.admin_level(&scope, level_id, &mut payload)?,
            RegionKind::Locations => self.locations(&scope, &mut payload)?,
            RegionKind::SiteTables => self.site_tables(&scope, &mut payload)?,
            RegionKind::Sites {
                database_id,
                org_unit_id,
            } => self.sites(&scope, database_id, org_unit_id, &mut payload)?,
        }

        tracing::debug!(
            user = user.user_id,
            region = identifier,
            changes = payload.len(),
            "built region payload"
        );
        Ok(payload)
    }

    fn visible_countries(&self, scope: &UserScope) -> CatalogResult<BTreeSet<u32>> {
        Ok(scope
            .visible_databases(self.source.as_ref())?
            .iter()
            .map(|db| db.country_id)
            .collect())
    }

    fn schema(&self, scope: &UserScope, payload: &mut RegionPayload) -> CatalogResult<()> {
        let source = self.source.as_ref();
        let databases = scope.visible_databases(source)?;

        let countries: BTreeSet<u32> = databases.iter().map(|db| db.country_id).collect();
        for country_id in countries {
            if let Some(country) = source.country(country_id)? {
                payload.push(EntityChange::upsert(
                    SCHEMA_STORE,
                    format!("country/{}", country.id),
                    json!({"type": "country", "id": country.id, "name": country.name}),
                ));
            }
        }

        for unit_id in scope.units() {
            if let Some(unit) = source.org_unit(unit_id)? {
                payload.push(EntityChange::upsert(
                    SCHEMA_STORE,
                    format!("partner/{}", unit.id),
                    json!({"type": "partner", "id": unit.id, "name": unit.name, "parentId": unit.parent_id}),
                ));
            }
        }

        for database in &databases {
            payload.push(EntityChange::upsert(
                SCHEMA_STORE,
                format!("database/{}", database.id),
                json!({
                    "type": "database",
                    "id": database.id,
                    "name": database.name,
                    "countryId": database.country_id,
                    "ownerOrgUnitId": database.owner_org_unit_id,
                }),
            ));
            for activity in source.activities(database.id)? {
                payload.push(EntityChange::upsert(
                    SCHEMA_STORE,
                    format!("activity/{}", activity.id),
                    json!({
                        "type": "activity",
                        "id": activity.id,
                        "databaseId": activity.database_id,
                        "name": activity.name,
                    }),
                ));
            }
        }
        Ok(())
    }

    fn admin_level(
        &self,
        scope: &UserScope,
        level_id: u32,
        payload: &mut RegionPayload,
    ) -> CatalogResult<()> {
        let source = self.source.as_ref();
        let level = source
            .admin_level(level_id)?
            .ok_or_else(|| CatalogError::UnknownRegion(format!("admin/{level_id}")))?;
        if !self.visible_countries(scope)?.contains(&level.country_id) {
            return Err(CatalogError::Authorization(format!(
                "admin level {level_id} belongs to a country outside the user's databases"
            )));
        }

        payload.push(EntityChange::upsert(
            ADMIN_LEVELS_STORE,
            format!("level/{}", level.id),
            json!({
                "type": "adminLevel",
                "id": level.id,
                "levelId": level.id,
                "countryId": level.country_id,
                "name": level.name,
                "parentId": level.parent_id,
            }),
        ));
        for entity in source.admin_entities(level_id)? {
            payload.push(EntityChange::upsert(
                ADMIN_LEVELS_STORE,
                format!("entity/{}", entity.id),
                json!({
                    "type": "adminEntity",
                    "id": entity.id,
                    "levelId": entity.level_id,
                    "name": entity.name,
                    "parentId": entity.parent_id,
                }),
            ));
        }
        Ok(())
    }

    fn locations(&self, scope: &UserScope, payload: &mut RegionPayload) -> CatalogResult<()> {
        for country_id in self.visible_countries(scope)? {
            for location in self.source.locations(country_id)? {
                payload.push(EntityChange::upsert(
                    LOCATIONS_STORE,
                    location.id.to_string(),
                    json!({
                        "id": location.id,
                        "name": location.name,
                        "countryId": location.country_id,
                        "adminEntityIds": location.admin_entity_ids,
                    }),
                ));
            }
        }
        Ok(())
    }

    fn site_tables(&self, scope: &UserScope, payload: &mut RegionPayload) -> CatalogResult<()> {
        let source = self.source.as_ref();
        for database in scope.visible_databases(source)? {
            for activity in source.activities(database.id)? {
                payload.push(EntityChange::upsert(
                    SITE_TABLES_STORE,
                    activity.id.to_string(),
                    json!({
                        "activityId": activity.id,
                        "databaseId": database.id,
                        "columns": activity.attributes,
                    }),
                ));
            }
        }
        Ok(())
    }

    fn sites(
        &self,
        scope: &UserScope,
        database_id: u32,
        org_unit_id: u32,
        payload: &mut RegionPayload,
    ) -> CatalogResult<()> {
        let source = self.source.as_ref();
        let database_visible = scope
            .visible_databases(source)?
            .iter()
            .any(|db| db.id == database_id);
        if !database_visible {
            return Err(CatalogError::Authorization(format!(
                "sites of database {database_id} are outside the user's scope"
            )));
        }

        for site in source.sites(database_id, org_unit_id)? {
            let key = site.id.to_string();
            if site.deleted {
                payload.push(EntityChange::remove(SITES_STORE, key));
            } else {
                payload.push(EntityChange::upsert(
                    SITES_STORE,
                    key,
                    json!({
                        "id": site.id,
                        "activityId": site.activity_id,
                        "databaseId": database_id,
                        "orgUnitId": org_unit_id,
                        "locationId": site.location_id,
                        "values": site.values,
                    }),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::InMemoryDataset;
    use crate::model::{Activity, AdminEntity, AdminLevel, Country, Database, Dataset, OrgUnit, Site};
    use fieldsync_protocol::{ChangeOp, Namespace};

    fn builder() -> PayloadBuilder {
        let dataset = Dataset {
            countries: vec![
                Country {
                    id: 1,
                    name: "Congo".into(),
                },
                Country {
                    id: 2,
                    name: "Chad".into(),
                },
            ],
            admin_levels: vec![
                AdminLevel {
                    id: 10,
                    country_id: 1,
                    name: "Province".into(),
                    parent_id: None,
                },
                AdminLevel {
                    id: 20,
                    country_id: 2,
                    name: "Region".into(),
                    parent_id: None,
                },
            ],
            admin_entities: vec![AdminEntity {
                id: 100,
                level_id: 10,
                name: "Kivu".into(),
                parent_id: None,
            }],
            org_units: vec![
                OrgUnit {
                    id: 3,
                    name: "HQ".into(),
                    parent_id: None,
                },
                OrgUnit {
                    id: 4,
                    name: "Elsewhere".into(),
                    parent_id: None,
                },
            ],
            databases: vec![Database {
                id: 5,
                name: "Health".into(),
                country_id: 1,
                owner_org_unit_id: 3,
            }],
            activities: vec![Activity {
                id: 50,
                database_id: 5,
                name: "Clinics".into(),
                attributes: vec!["beds".into()],
            }],
            sites: vec![
                Site {
                    id: 7,
                    activity_id: 50,
                    partner_id: 3,
                    location_id: Some(1),
                    values: [("beds".to_string(), json!(12))].into_iter().collect(),
                    deleted: false,
                },
                Site {
                    id: 8,
                    activity_id: 50,
                    partner_id: 3,
                    location_id: None,
                    values: Default::default(),
                    deleted: true,
                },
            ],
            ..Dataset::default()
        };
        PayloadBuilder::new(Arc::new(InMemoryDataset::new(dataset)))
    }

    fn user() -> UserContext {
        UserContext::new(1, 3)
    }

    #[test]
    fn site_payload_carries_namespace_fields() {
        let payload = builder().build(&user(), "site/5/3").unwrap();
        assert_eq!(payload.identifier, "site/5/3");
        assert_eq!(payload.len(), 2);

        let namespace = RegionKind::parse("site/5/3").unwrap().namespace();
        let live = &payload.changes[0];
        assert_eq!(live.store, SITES_STORE);
        assert!(namespace.contains(live.value().unwrap()));
        assert_eq!(live.value().unwrap()["values"]["beds"], 12);

        assert_eq!(payload.changes[1].key, "8");
        assert_eq!(payload.changes[1].op, ChangeOp::Remove);
    }

    #[test]
    fn admin_payload_belongs_to_its_level() {
        let payload = builder().build(&user(), "admin/10").unwrap();
        let namespace: Namespace = RegionKind::AdminLevel(10).namespace();
        assert_eq!(payload.len(), 2);
        assert!(payload
            .changes
            .iter()
            .all(|c| c.store == ADMIN_LEVELS_STORE && namespace.contains(c.value().unwrap())));
    }

    #[test]
    fn schema_payload_lists_visible_structure() {
        let payload = builder().build(&user(), "schema").unwrap();
        let keys: Vec<&str> = payload.changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["country/1", "partner/3", "database/5", "activity/50"]
        );
    }

    #[test]
    fn site_tables_describe_activities() {
        let payload = builder().build(&user(), "site-tables").unwrap();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload.changes[0].value().unwrap()["columns"], json!(["beds"]));
    }

    #[test]
    fn out_of_scope_regions_are_refused() {
        let builder = builder();
        assert!(matches!(
            builder.build(&user(), "admin/20"),
            Err(CatalogError::Authorization(_))
        ));
        assert!(matches!(
            builder.build(&UserContext::new(2, 4), "site/5/3"),
            Err(CatalogError::Authorization(_))
        ));
    }

    #[test]
    fn partner_outside_the_tree_is_fetchable() {
        let builder = builder();
        let payload = builder.build(&user(), "site/5/4").unwrap();
        assert!(payload.is_empty());

        let dataset = Arc::new(InMemoryDataset::new(Dataset::default()));
        dataset.update(|d| {
            d.org_units.push(OrgUnit {
                id: 3,
                name: "HQ".into(),
                parent_id: None,
            });
            d.databases.push(Database {
                id: 5,
                name: "Health".into(),
                country_id: 1,
                owner_org_unit_id: 3,
            });
            d.activities.push(Activity {
                id: 50,
                database_id: 5,
                name: "Clinics".into(),
                attributes: vec![],
            });
            d.sites.push(Site {
                id: 9,
                activity_id: 50,
                partner_id: 4,
                location_id: None,
                values: Default::default(),
                deleted: false,
            });
        });
        let payload = PayloadBuilder::new(dataset).build(&user(), "site/5/4").unwrap();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload.changes[0].value().unwrap()["orgUnitId"], 4);
    }

    #[test]
    fn unknown_and_malformed_regions() {
        let builder = builder();
        assert!(matches!(
            builder.build(&user(), "admin/99"),
            Err(CatalogError::UnknownRegion(_))
        ));
        assert!(matches!(
            builder.build(&user(), "reminders"),
            Err(CatalogError::InvalidRequest(_))
        ));
    }

    #[test]
    fn empty_pair_yields_empty_payload() {
        let builder = builder();
        let payload = builder.build(&user(), "site/5/3").unwrap();
        assert!(!payload.is_empty());

        let dataset = Arc::new(InMemoryDataset::new(Dataset::default()));
        dataset.update(|d| {
            d.org_units.push(OrgUnit {
                id: 3,
                name: "HQ".into(),
                parent_id: None,
            });
            d.databases.push(Database {
                id: 5,
                name: "Health".into(),
                country_id: 1,
                owner_org_unit_id: 3,
            });
        });
        let payload = PayloadBuilder::new(dataset).build(&user(), "site/5/3").unwrap();
        assert!(payload.is_empty());
    }
}
