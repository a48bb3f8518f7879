//! File-based store backend for persistent storage.

use crate::backend::{Mutation, StoreBackend, StoreSnapshot};
use crate::config::StoreSchema;
use crate::error::{StoreError, StoreResult};
use fieldsync_protocol::Value;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A file-based store backend.
///
/// The committed state is kept in memory and written to disk as a CBOR
/// snapshot on every commit. Data survives process restarts.
///
/// # Durability
///
/// Each commit writes the new snapshot to a temporary file, syncs it and
/// renames it over the previous one, so a crash leaves either the old or
/// the new state on disk, never a mix.
///
/// # Locking
///
/// An exclusive lock on a sibling `.lock` file is held for the lifetime
/// of the backend. A second opener, in this or another process, gets
/// [`StoreError::Unavailable`].
///
/// # Example
///
/// ```no_run
/// use fieldsync_store::{FileBackend, LocalStore, StoreConfig};
/// use std::path::Path;
///
/// # async fn demo() -> fieldsync_store::StoreResult<()> {
/// let backend = FileBackend::open(Path::new("client.fsdb"))?;
/// let store = LocalStore::spawn(backend, StoreConfig::default());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    snapshot: StoreSnapshot,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another opener holds the lock (returns `Unavailable`)
    /// - The existing snapshot cannot be decoded
    /// - I/O errors occur
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.with_extension("lock"))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::unavailable(format!(
                "{} is locked by another process",
                path.display()
            )));
        }

        let snapshot = if path.exists() {
            let bytes = fs::read(path)?;
            fieldsync_protocol::decode(&bytes).map_err(|e| StoreError::Codec(e.to_string()))?
        } else {
            StoreSnapshot::new()
        };

        tracing::debug!(path = %path.display(), version = snapshot.version, "opened file store");

        Ok(Self {
            path: path.to_path_buf(),
            snapshot,
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, snapshot: &StoreSnapshot) -> StoreResult<()> {
        let bytes =
            fieldsync_protocol::encode(snapshot).map_err(|e| StoreError::Codec(e.to_string()))?;

        let temp_path = self.path.with_extension("tmp");
        {
            let mut temp = File::create(&temp_path)?;
            temp.write_all(&bytes)?;
            temp.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl StoreBackend for FileBackend {
    fn schema_version(&self) -> StoreResult<u32> {
        Ok(self.snapshot.version)
    }

    fn upgrade(&mut self, schema: &StoreSchema) -> StoreResult<()> {
        let mut next = self.snapshot.clone();
        next.upgrade(schema);
        self.persist(&next)?;
        self.snapshot = next;
        Ok(())
    }

    fn has_store(&self, store: &str) -> StoreResult<bool> {
        Ok(self.snapshot.stores.contains_key(store))
    }

    fn store_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.snapshot.stores.keys().cloned().collect())
    }

    fn get(&self, store: &str, key: &str) -> StoreResult<Option<Value>> {
        self.snapshot.get(store, key)
    }

    fn scan(&self, store: &str) -> StoreResult<Vec<(String, Value)>> {
        self.snapshot.scan(store)
    }

    fn len(&self, store: &str) -> StoreResult<usize> {
        self.snapshot.len(store)
    }

    fn commit(&mut self, batch: &[Mutation]) -> StoreResult<()> {
        let mut next = self.snapshot.clone();
        next.apply(batch)?;
        self.persist(&next)
            .map_err(|e| StoreError::CommitFailed(e.to_string()))?;
        self.snapshot = next;
        Ok(())
    }
}
