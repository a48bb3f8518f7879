//! Dependencies between regions of one catalog.
//!
//! A region whose dependency failed or was skipped is not attempted in the
//! same run. Dependencies only ever point at regions listed in the same
//! run; a dependency on a region that is not part of the run is treated as
//! satisfied, which is what makes resuming a partial run possible.

use fieldsync_protocol::{RegionKind, SyncRegion};
use std::collections::{BTreeMap, BTreeSet};

/// Explicitly declared dependency edges, keyed by region identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl Dependencies {
    /// Creates an empty edge set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `region` depends on `dependency`.
    pub fn declare(&mut self, region: impl Into<String>, dependency: impl Into<String>) {
        self.edges
            .entry(region.into())
            .or_default()
            .insert(dependency.into());
    }

    /// Builder form of [`Dependencies::declare`].
    #[must_use]
    pub fn with(mut self, region: impl Into<String>, dependency: impl Into<String>) -> Self {
        self.declare(region, dependency);
        self
    }

    /// Returns the declared dependencies of a region.
    pub fn of(&self, identifier: &str) -> impl Iterator<Item = &str> + '_ {
        self.edges
            .get(identifier)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Returns true if no edge is declared.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// How dependencies between regions are decided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DependencyPolicy {
    /// Regions are independent; every region is attempted.
    None,
    /// Dependencies follow from region kinds: every other region depends on
    /// `schema`, and site regions also depend on `locations` and
    /// `site-tables`.
    #[default]
    ByKind,
    /// Only the declared edges apply.
    Explicit(Dependencies),
}

impl DependencyPolicy {
    /// Returns the dependencies of `region` among `run`, in run order.
    pub fn dependencies_of(&self, region: &SyncRegion, run: &[SyncRegion]) -> Vec<String> {
        let declared: BTreeSet<String> = match self {
            DependencyPolicy::None => BTreeSet::new(),
            DependencyPolicy::ByKind => match region.kind() {
                Ok(kind) => kind_dependencies(kind)
                    .iter()
                    .map(|k| k.to_string())
                    .collect(),
                Err(_) => BTreeSet::new(),
            },
            DependencyPolicy::Explicit(deps) => {
                deps.of(&region.identifier).map(str::to_string).collect()
            }
        };

        run.iter()
            .map(|r| &r.identifier)
            .filter(|id| **id != region.identifier && declared.contains(*id))
            .cloned()
            .collect()
    }
}

fn kind_dependencies(kind: RegionKind) -> &'static [RegionKind] {
    match kind {
        RegionKind::Schema => &[],
        RegionKind::AdminLevel(_) | RegionKind::Locations | RegionKind::SiteTables => {
            &[RegionKind::Schema]
        }
        RegionKind::Sites { .. } => &[
            RegionKind::Schema,
            RegionKind::Locations,
            RegionKind::SiteTables,
        ],
    }
}
