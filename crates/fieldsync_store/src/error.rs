//! Error types for local store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
///
/// Errors are `Clone` because a single request outcome is delivered to
/// every observer of the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be opened (schema mismatch, quota, denial, lock).
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Why the store could not be opened.
        reason: String,
    },

    /// The store has been closed or its worker is gone.
    #[error("store is closed")]
    Closed,

    /// The object store is not part of the transaction scope.
    #[error("object store {0:?} is not in the transaction scope")]
    NotInScope(String),

    /// A write was issued in a read-only context.
    #[error("write attempted in a read-only transaction")]
    ReadOnly,

    /// A request was issued after its transaction finished.
    #[error("transaction is no longer active")]
    TransactionInactive,

    /// The transaction was aborted.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },

    /// A write would grow a store past its entry quota.
    #[error("quota exceeded for store {store:?}: limit is {limit} entries")]
    QuotaExceeded {
        /// Store name.
        store: String,
        /// Configured entry limit.
        limit: usize,
    },

    /// A key is not acceptable.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// The backend refused to commit a batch.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Persisted data could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// Creates an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Returns true if the store itself cannot be used.
    ///
    /// Such errors are fatal for a whole sync run rather than for a single
    /// transaction.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. } | StoreError::Closed)
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_classification() {
        assert!(StoreError::unavailable("quota").is_unavailable());
        assert!(StoreError::Closed.is_unavailable());
        assert!(!StoreError::aborted("user").is_unavailable());
        assert!(!StoreError::CommitFailed("disk".into()).is_unavailable());
    }

    #[test]
    fn error_display() {
        let err = StoreError::QuotaExceeded {
            store: "sites".into(),
            limit: 10,
        };
        let msg = err.to_string();
        assert!(msg.contains("sites"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn io_errors_convert() {
        let err: StoreError = io::Error::other("disk gone").into();
        assert!(matches!(err, StoreError::Io(ref m) if m.contains("disk gone")));
    }
}
