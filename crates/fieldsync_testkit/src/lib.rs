//! # FieldSync Testkit
//!
//! Test utilities for FieldSync.
//!
//! This crate provides:
//! - Sample datasets and catalog servers with a known region layout
//! - Local store helpers over memory and temporary files
//! - Property-based dataset generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fieldsync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn sync_sample() {
//!     let (dataset, server) = scenario_server();
//!     let store = TestStore::memory();
//!     // ... run a sync against `server` into `store`
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
