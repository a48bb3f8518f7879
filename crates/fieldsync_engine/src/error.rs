//! Error types for the sync engine.

use fieldsync_protocol::{ErrorKind, ErrorResponse, ProtocolError};
use fieldsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The catalog cannot be resolved for this user.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Server-side region enumeration failed.
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Local storage cannot be opened.
    #[error("local store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The local write or commit of a region failed and was rolled back.
    #[error("local transaction failed: {0}")]
    Transaction(#[source] StoreError),

    /// Malformed payload or region identifier.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::CatalogUnavailable(_) => true,
            _ => false,
        }
    }

    /// Returns true if this error ends a whole run rather than one region.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Authorization(_)
                | SyncError::CatalogUnavailable(_)
                | SyncError::StoreUnavailable(_)
        )
    }

    /// Maps a server error answering a catalog request.
    pub fn from_catalog_response(response: ErrorResponse) -> Self {
        match response.kind {
            ErrorKind::Authorization => SyncError::Authorization(response.message),
            ErrorKind::Unavailable => SyncError::CatalogUnavailable(response.message),
            ErrorKind::NotFound | ErrorKind::Invalid => SyncError::Protocol(response.message),
        }
    }

    /// Maps a server error answering a region fetch. Fetch errors only
    /// ever fail the region they belong to.
    pub fn from_fetch_response(response: ErrorResponse) -> Self {
        match response.kind {
            ErrorKind::Unavailable => SyncError::transport_retryable(response.message),
            ErrorKind::Authorization | ErrorKind::NotFound => {
                SyncError::transport_fatal(format!("{:?}: {}", response.kind, response.message))
            }
            ErrorKind::Invalid => SyncError::Protocol(response.message),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        if err.is_unavailable() {
            SyncError::StoreUnavailable(err)
        } else {
            SyncError::Transaction(err)
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection lost").is_retryable());
        assert!(!SyncError::transport_fatal("bad request").is_retryable());
        assert!(SyncError::CatalogUnavailable("replica down".into()).is_retryable());
        assert!(!SyncError::Protocol("garbage".into()).is_retryable());
    }

    #[test]
    fn fatal_errors() {
        assert!(SyncError::Authorization("no unit".into()).is_fatal());
        assert!(SyncError::StoreUnavailable(StoreError::Closed).is_fatal());
        assert!(!SyncError::Transaction(StoreError::InvalidKey(String::new())).is_fatal());
        assert!(!SyncError::transport_retryable("timeout").is_fatal());
    }

    #[test]
    fn store_errors_split_by_availability() {
        assert!(matches!(
            SyncError::from(StoreError::unavailable("schema mismatch")),
            SyncError::StoreUnavailable(_)
        ));
        assert!(matches!(
            SyncError::from(StoreError::CommitFailed("disk full".into())),
            SyncError::Transaction(_)
        ));
    }

    #[test]
    fn server_errors_map_by_request() {
        let unavailable = ErrorResponse::new(ErrorKind::Unavailable, "down");
        assert_eq!(
            SyncError::from_catalog_response(unavailable.clone()),
            SyncError::CatalogUnavailable("down".into())
        );
        assert!(SyncError::from_fetch_response(unavailable).is_retryable());

        let denied = ErrorResponse::new(ErrorKind::Authorization, "outside scope");
        assert!(SyncError::from_catalog_response(denied.clone()).is_fatal());
        assert!(!SyncError::from_fetch_response(denied).is_fatal());
    }

    #[test]
    fn error_display() {
        let err = SyncError::Transaction(StoreError::CommitFailed("disk full".into()));
        assert_eq!(
            err.to_string(),
            "local transaction failed: commit failed: disk full"
        );
    }
}
