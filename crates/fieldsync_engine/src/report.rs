//! Per-region outcomes of a sync run.

use crate::error::SyncError;
use fieldsync_protocol::SyncRegion;
use std::fmt;
use std::time::Duration;

/// Why a region was not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A region this one depends on failed or was skipped.
    DependencyFailed {
        /// The first unsatisfied dependency, in run order.
        dependency: String,
    },
    /// The run was cancelled before the region was reached.
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DependencyFailed { dependency } => {
                write!(f, "dependency {dependency} did not commit")
            }
            SkipReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome of one region.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionOutcome {
    /// The region's transaction committed.
    Committed {
        /// Number of payload changes applied.
        changes: usize,
    },
    /// Fetching or applying the region failed; nothing of it was written.
    Failed(SyncError),
    /// The region was not attempted.
    Skipped(SkipReason),
}

impl RegionOutcome {
    /// Returns true for [`RegionOutcome::Committed`].
    pub fn is_committed(&self) -> bool {
        matches!(self, RegionOutcome::Committed { .. })
    }
}

/// A region and what happened to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionReport {
    /// The region.
    pub region: SyncRegion,
    /// Its outcome.
    pub outcome: RegionOutcome,
}

/// Result of a sync run: one entry per region, in catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Every region of the run, in the order processed.
    pub regions: Vec<RegionReport>,
    /// Fingerprint of the catalog the run was based on, if it was listed.
    pub fingerprint: Option<String>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl SyncReport {
    /// Returns the outcome of a region.
    pub fn outcome(&self, identifier: &str) -> Option<&RegionOutcome> {
        self.regions
            .iter()
            .find(|r| r.region.identifier == identifier)
            .map(|r| &r.outcome)
    }

    /// Number of committed regions.
    pub fn committed(&self) -> usize {
        self.regions
            .iter()
            .filter(|r| r.outcome.is_committed())
            .count()
    }

    /// Number of failed regions.
    pub fn failed(&self) -> usize {
        self.regions
            .iter()
            .filter(|r| matches!(r.outcome, RegionOutcome::Failed(_)))
            .count()
    }

    /// Number of skipped regions.
    pub fn skipped(&self) -> usize {
        self.regions
            .iter()
            .filter(|r| matches!(r.outcome, RegionOutcome::Skipped(_)))
            .count()
    }

    /// Total payload changes applied.
    pub fn changes(&self) -> usize {
        self.regions
            .iter()
            .map(|r| match r.outcome {
                RegionOutcome::Committed { changes } => changes,
                _ => 0,
            })
            .sum()
    }

    /// Returns true if every region committed.
    pub fn is_complete(&self) -> bool {
        self.regions.iter().all(|r| r.outcome.is_committed())
    }

    /// Returns the failed and skipped regions, in catalog order.
    pub fn retry_regions(&self) -> Vec<SyncRegion> {
        self.regions
            .iter()
            .filter(|r| !r.outcome.is_committed())
            .map(|r| r.region.clone())
            .collect()
    }
}
