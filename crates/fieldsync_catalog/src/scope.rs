//! Organizational scope of a requesting user.

use crate::error::{CatalogError, CatalogResult};
use crate::model::Database;
use crate::source::CatalogSource;
use fieldsync_protocol::UserContext;
use std::collections::{BTreeSet, VecDeque};

/// The org units a user may see: their root unit and every descendant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserScope {
    root: u32,
    units: BTreeSet<u32>,
}

impl UserScope {
    /// Crawls the org-unit tree below the user's root unit.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Authorization`] if the user has no root unit
    /// or the unit does not exist.
    pub fn resolve(source: &dyn CatalogSource, user: &UserContext) -> CatalogResult<Self> {
        let root = user.org_unit_id.ok_or_else(|| {
            CatalogError::Authorization(format!("user {} has no org unit", user.user_id))
        })?;
        if source.org_unit(root)?.is_none() {
            return Err(CatalogError::Authorization(format!(
                "org unit {root} of user {} does not exist",
                user.user_id
            )));
        }

        let mut units = BTreeSet::from([root]);
        let mut queue = VecDeque::from([root]);
        while let Some(unit) = queue.pop_front() {
            for child in source.org_unit_children(unit)? {
                // The visited set also guards against cycles in bad data.
                if units.insert(child.id) {
                    queue.push_back(child.id);
                }
            }
        }

        Ok(Self { root, units })
    }

    /// Returns the root unit.
    pub fn root(&self) -> u32 {
        self.root
    }

    /// Returns true if the unit is the root or one of its descendants.
    pub fn contains(&self, org_unit_id: u32) -> bool {
        self.units.contains(&org_unit_id)
    }

    /// Returns every unit in scope, ascending.
    pub fn units(&self) -> impl Iterator<Item = u32> + '_ {
        self.units.iter().copied()
    }

    /// Returns the databases owned by units in scope, alphabetically.
    pub fn visible_databases(&self, source: &dyn CatalogSource) -> CatalogResult<Vec<Database>> {
        Ok(source
            .databases_alphabetically()?
            .into_iter()
            .filter(|db| self.contains(db.owner_org_unit_id))
            .collect())
    }
}
