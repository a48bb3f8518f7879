//! Error types for the region catalog.

use fieldsync_protocol::{ErrorKind, ErrorResponse, ProtocolError};
use thiserror::Error;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors that can occur while listing or serving regions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The user's scope cannot be resolved, or the requested region lies
    /// outside of it.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// The underlying data could not be read.
    #[error("catalog unavailable: {0}")]
    Unavailable(String),

    /// The region identifier is well formed but names nothing.
    #[error("unknown region: {0}")]
    UnknownRegion(String),

    /// The request could not be understood.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CatalogError {
    /// Returns true if the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CatalogError::Authorization(_)
                | CatalogError::UnknownRegion(_)
                | CatalogError::InvalidRequest(_)
        )
    }

    /// Returns true if the server failed to answer a valid request.
    pub fn is_server_error(&self) -> bool {
        matches!(self, CatalogError::Unavailable(_))
    }

    /// Converts the error to its wire form.
    pub fn to_response(&self) -> ErrorResponse {
        let kind = match self {
            CatalogError::Authorization(_) => ErrorKind::Authorization,
            CatalogError::Unavailable(_) => ErrorKind::Unavailable,
            CatalogError::UnknownRegion(_) => ErrorKind::NotFound,
            CatalogError::InvalidRequest(_) => ErrorKind::Invalid,
        };
        ErrorResponse::new(kind, self.to_string())
    }
}

impl From<ProtocolError> for CatalogError {
    fn from(err: ProtocolError) -> Self {
        CatalogError::InvalidRequest(err.to_string())
    }
}
