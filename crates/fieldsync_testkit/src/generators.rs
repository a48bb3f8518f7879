//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random datasets whose rows
//! reference each other consistently: every database points at an
//! existing country and org unit, every site at an existing activity and
//! partner.

use fieldsync_catalog::{
    Activity, AdminEntity, AdminLevel, Country, Database, Dataset, Location, OrgUnit, Site,
};
use fieldsync_protocol::UserContext;
use proptest::prelude::*;
use proptest::sample::Index;
use serde_json::json;
use std::collections::BTreeMap;

/// Database names are drawn from a small pool so that ties are common.
const DATABASE_NAMES: [&str; 4] = ["Education", "Health", "Nutrition", "Shelter"];

/// Raw choices a dataset is built from.
type DatasetPlan = (
    Vec<usize>,
    Vec<Index>,
    Vec<(usize, Index, Index)>,
    Vec<(Index, Vec<String>)>,
    Vec<(Index, Index, bool)>,
);

/// Strategy for generating a referentially consistent dataset.
///
/// Countries are numbered from 1, org unit 1 is the only root and every
/// other unit hangs below a lower-numbered one. Site IDs start at 1000.
pub fn dataset_strategy() -> impl Strategy<Value = Dataset> {
    (
        prop::collection::vec(0usize..3, 1..4),
        prop::collection::vec(any::<Index>(), 1..8),
        prop::collection::vec((0..DATABASE_NAMES.len(), any::<Index>(), any::<Index>()), 0..6),
        prop::collection::vec(
            (any::<Index>(), prop::collection::vec("[a-z]{1,6}", 0..3)),
            0..8,
        ),
        prop::collection::vec((any::<Index>(), any::<Index>(), any::<bool>()), 0..24),
    )
        .prop_map(build_dataset)
}

/// Strategy for generating a dataset together with a user rooted at one
/// of its org units.
pub fn scoped_dataset_strategy() -> impl Strategy<Value = (Dataset, UserContext)> {
    (dataset_strategy(), any::<Index>()).prop_map(|(dataset, root)| {
        let unit = &dataset.org_units[root.index(dataset.org_units.len())];
        let user = UserContext::new(7, unit.id);
        (dataset, user)
    })
}

fn build_dataset(plan: DatasetPlan) -> Dataset {
    let (levels_per_country, parents, databases, activities, sites) = plan;
    let mut dataset = Dataset::default();

    let mut next_level = 1;
    for (i, levels) in levels_per_country.iter().enumerate() {
        let country_id = i as u32 + 1;
        dataset.countries.push(Country {
            id: country_id,
            name: format!("Country {country_id}"),
        });
        dataset.locations.push(Location {
            id: 500 + country_id,
            name: format!("Capital {country_id}"),
            country_id,
            admin_entity_ids: vec![],
        });
        for _ in 0..*levels {
            dataset.admin_levels.push(AdminLevel {
                id: next_level,
                country_id,
                name: format!("Level {next_level}"),
                parent_id: None,
            });
            dataset.admin_entities.push(AdminEntity {
                id: 100 + next_level,
                level_id: next_level,
                name: format!("Area {next_level}"),
                parent_id: None,
            });
            next_level += 1;
        }
    }
    let countries = dataset.countries.len();

    for (i, parent) in parents.iter().enumerate() {
        let id = i as u32 + 1;
        let parent_id = if i == 0 {
            None
        } else {
            Some(parent.index(i) as u32 + 1)
        };
        dataset.org_units.push(OrgUnit {
            id,
            name: format!("Unit {id}"),
            parent_id,
        });
    }
    let units = dataset.org_units.len();

    for (i, (name, country, owner)) in databases.iter().enumerate() {
        dataset.databases.push(Database {
            id: i as u32 + 1,
            name: DATABASE_NAMES[*name].to_string(),
            country_id: country.index(countries) as u32 + 1,
            owner_org_unit_id: owner.index(units) as u32 + 1,
        });
    }

    if !dataset.databases.is_empty() {
        for (i, (database, attributes)) in activities.into_iter().enumerate() {
            let id = 200 + i as u32;
            dataset.activities.push(Activity {
                id,
                database_id: dataset.databases[database.index(dataset.databases.len())].id,
                name: format!("Activity {id}"),
                attributes,
            });
        }
    }

    if !dataset.activities.is_empty() {
        for (i, (activity, partner, deleted)) in sites.iter().enumerate() {
            let id = 1000 + i as u32;
            dataset.sites.push(Site {
                id,
                activity_id: dataset.activities[activity.index(dataset.activities.len())].id,
                partner_id: partner.index(units) as u32 + 1,
                location_id: None,
                values: BTreeMap::from([("count".to_string(), json!(i))]),
                deleted: *deleted,
            });
        }
    }

    dataset
}
