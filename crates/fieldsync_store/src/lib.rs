//! # FieldSync Store
//!
//! Asynchronous transactional object store used by offline clients.
//!
//! Every store operation yields a [`Request`]: a single-assignment result
//! slot that moves from `Pending` to `Done` exactly once, either with a
//! value or with an error. Completion handlers registered with
//! [`Request::on_complete`] are invoked exactly once, even when registered
//! after the request finished, and a request can be awaited as a future.
//!
//! ## Design Principles
//!
//! - Operations are executed by a single store worker task, in issue order
//! - Writes inside a transaction are buffered and become visible atomically
//!   on commit; any failed request aborts and rolls back the transaction
//! - Transactions whose store scopes conflict with an active read-write
//!   transaction are queued until it finishes
//! - Backends are plain committed-state maps with an atomic batch commit
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - For tests and ephemeral clients
//! - [`FileBackend`] - CBOR snapshot file, replaced atomically on commit
//!
//! ## Example
//!
//! ```rust,no_run
//! use fieldsync_store::{LocalStore, MemoryBackend, StoreConfig, TransactionMode};
//! use serde_json::json;
//!
//! # async fn demo() -> fieldsync_store::StoreResult<()> {
//! let store = LocalStore::spawn(MemoryBackend::new(), StoreConfig::default());
//! let sites = store.open("sites", TransactionMode::ReadWrite).await?;
//! store.put(&sites, "1", json!({"id": 1})).await?;
//! assert!(store.get(&sites, "1").await?.is_some());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod config;
mod error;
mod file;
mod memory;
mod request;
mod store;
mod transaction;
mod worker;

pub use backend::{Mutation, MutationOp, StoreBackend, StoreSnapshot};
pub use config::{StoreConfig, StoreSchema};
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use request::{ReadyState, Request};
pub use store::{LocalStore, StoreHandle};
pub use transaction::{EntryFilter, TransactionMode, TransactionScope};

pub use fieldsync_protocol::Value;
