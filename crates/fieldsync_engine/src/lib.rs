//! # FieldSync Engine
//!
//! Client-side region synchronization for FieldSync.
//!
//! This crate provides:
//! - [`RegionSyncOrchestrator`] - walks a region catalog, fetches each
//!   region and writes it to the local store in its own transaction
//! - [`RegionApplier`] - full-replace and incremental region writes
//! - [`RegionTransport`] with [`MessageTransport`] (CBOR messages) and
//!   [`MockTransport`]
//! - Dependency policies, retry with exponential backoff, cancellation
//! - [`RegionInventory`] - which catalog regions are missing locally
//!
//! ## Sync model
//!
//! 1. List the catalog (server is authoritative for the region list)
//! 2. For each region, in order: fetch, then apply in one transaction
//! 3. Record `Committed`, `Failed` or `Skipped` per region
//!
//! ## Key Invariants
//!
//! - Region *i+1* is not fetched before region *i*'s transaction completed
//! - A failed region leaves earlier regions committed and itself untouched
//! - A region whose dependency failed or was skipped is never attempted
//! - Replaying a full-replace region with the same payload is a no-op
//! - Nothing about past runs is persisted; resumption diffs the catalog
//!   against what the store holds

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod applier;
mod config;
mod dependency;
mod error;
mod inventory;
mod message;
mod orchestrator;
mod report;
mod transport;

pub use applier::{AppliedRegion, RegionApplier};
pub use config::{RetryConfig, SyncConfig};
pub use dependency::{Dependencies, DependencyPolicy};
pub use error::{SyncError, SyncResult};
pub use inventory::RegionInventory;
pub use message::{LoopbackClient, LoopbackServer, MessageClient, MessageTransport};
pub use orchestrator::{CancelHandle, RegionSyncOrchestrator, SyncState, SyncStats};
pub use report::{RegionOutcome, RegionReport, SkipReason, SyncReport};
pub use transport::{MockTransport, RegionTransport};
