//! # FieldSync Protocol
//!
//! Sync region types, wire messages and CBOR codecs shared by the
//! catalog server and the offline client.
//!
//! This crate provides:
//! - [`SyncRegion`] and [`RegionKind`] for the partitioning scheme
//! - [`RegionPayload`] and [`EntityChange`] for region transfer
//! - Catalog and fetch messages wrapped in [`SyncMessage`]
//! - CBOR encoding/decoding via [`encode`] and [`decode`]
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod messages;
mod payload;
mod region;

pub use codec::{decode, encode};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    CatalogRequest, CatalogResponse, ErrorKind, ErrorResponse, FetchRequest, SyncMessage,
    UserContext,
};
pub use payload::{ChangeOp, EntityChange, RegionPayload};
pub use region::{
    Namespace, NamespaceFilter, RegionKind, SyncRegion, DATABASE_ID_FIELD, LEVEL_ID_FIELD,
    ORG_UNIT_ID_FIELD,
};

/// Opaque entity value stored locally and carried in region payloads.
pub use serde_json::Value;

/// Store holding databases, activities and countries.
pub const SCHEMA_STORE: &str = "schema";
/// Store holding admin levels and their entities.
pub const ADMIN_LEVELS_STORE: &str = "admin-levels";
/// Store holding locations.
pub const LOCATIONS_STORE: &str = "locations";
/// Store holding site table definitions.
pub const SITE_TABLES_STORE: &str = "site-tables";
/// Store holding site records.
pub const SITES_STORE: &str = "sites";

/// Every object store a client keeps, in creation order.
pub const LOCAL_STORES: [&str; 5] = [
    SCHEMA_STORE,
    ADMIN_LEVELS_STORE,
    LOCATIONS_STORE,
    SITE_TABLES_STORE,
    SITES_STORE,
];
