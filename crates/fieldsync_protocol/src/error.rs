//! Error types for the sync protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while handling protocol values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A region identifier does not follow any known layout.
    #[error("invalid region identifier: {0:?}")]
    InvalidRegion(String),

    /// A value could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// Bytes could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A message of the wrong type was received.
    #[error("unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Expected message name.
        expected: &'static str,
        /// Received message name.
        actual: &'static str,
    },
}
