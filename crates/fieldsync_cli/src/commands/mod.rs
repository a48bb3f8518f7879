//! CLI command implementations.

pub mod catalog;
pub mod inspect;
pub mod missing;
pub mod sync;

use fieldsync_catalog::{CatalogServer, CatalogSource, InMemoryDataset};
use fieldsync_protocol::UserContext;
use fieldsync_store::{FileBackend, LocalStore, StoreConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// CLI errors not raised by the FieldSync crates.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A path option the command needs was not given.
    #[error("{option} is required for {command}")]
    MissingOption {
        /// Option name.
        option: &'static str,
        /// Command name.
        command: &'static str,
    },

    /// The sync run ended with regions that did not commit.
    #[error("sync incomplete: {failed} region(s) failed, {skipped} skipped")]
    Incomplete {
        /// Failed regions.
        failed: usize,
        /// Skipped regions.
        skipped: usize,
    },
}

/// What a command operates on.
pub struct Target {
    /// Dataset file, if given.
    pub dataset: Option<PathBuf>,
    /// Store file, if given.
    pub store: Option<PathBuf>,
    /// User the catalog is computed for.
    pub user: UserContext,
}

impl Target {
    /// Returns the dataset path or a usage error.
    pub fn dataset_path(&self, command: &'static str) -> Result<&Path, CliError> {
        self.dataset.as_deref().ok_or(CliError::MissingOption {
            option: "--dataset",
            command,
        })
    }

    /// Returns the store path or a usage error.
    pub fn store_path(&self, command: &'static str) -> Result<&Path, CliError> {
        self.store.as_deref().ok_or(CliError::MissingOption {
            option: "--store",
            command,
        })
    }
}

/// Builds the user context; org unit 0 means unassigned.
pub fn user_context(user_id: u32, org_unit: u32) -> UserContext {
    if org_unit == 0 {
        UserContext::unassigned(user_id)
    } else {
        UserContext::new(user_id, org_unit)
    }
}

/// Loads a dataset file and serves it.
pub fn load_server(path: &Path) -> Result<CatalogServer, Box<dyn std::error::Error>> {
    let source: Arc<dyn CatalogSource> = Arc::new(InMemoryDataset::load(path)?);
    tracing::debug!(path = %path.display(), "loaded dataset");
    Ok(CatalogServer::new(source))
}

/// Opens the file-backed store. Must be called inside a tokio runtime.
pub fn open_store(path: &Path) -> Result<LocalStore, Box<dyn std::error::Error>> {
    let backend = FileBackend::open(path)?;
    Ok(LocalStore::spawn(backend, StoreConfig::default()))
}
