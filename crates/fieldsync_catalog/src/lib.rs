//! # FieldSync Catalog
//!
//! Server side of region synchronization.
//!
//! This crate provides:
//! - [`RegionCatalog`] - partitions the dataset visible to a user into an
//!   ordered list of sync regions
//! - [`PayloadBuilder`] - produces the entity changes of one region
//! - [`CatalogServer`] - answers catalog and fetch messages, in memory or
//!   over CBOR bytes
//! - [`CatalogSource`] - the query layer boundary, with
//!   [`InMemoryDataset`] as reference implementation
//!
//! # Scope
//!
//! A user sees the databases owned by their org unit or any unit below
//! it, and every site region of those databases, whichever partner
//! reported the sites.
//! Catalogs are recomputed on every request and never stored.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod catalog;
mod dataset;
mod error;
mod model;
mod payload;
mod scope;
mod server;
mod source;

pub use catalog::RegionCatalog;
pub use dataset::InMemoryDataset;
pub use error::{CatalogError, CatalogResult};
pub use model::{
    Activity, AdminEntity, AdminLevel, Country, Database, Dataset, Location, OrgUnit, Site,
};
pub use payload::PayloadBuilder;
pub use scope::UserScope;
pub use server::{fingerprint, CatalogServer};
pub use source::CatalogSource;
