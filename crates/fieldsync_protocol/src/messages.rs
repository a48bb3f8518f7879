//! Protocol messages exchanged between client and catalog server.

use crate::error::{ProtocolError, ProtocolResult};
use crate::payload::RegionPayload;
use crate::region::SyncRegion;
use serde::{Deserialize, Serialize};

/// The authenticated identity a request is made on behalf of.
///
/// The org unit is the root of the user's organizational scope. A user
/// without one cannot be given a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserContext {
    /// User ID.
    pub user_id: u32,
    /// Root org unit of the user's scope.
    pub org_unit_id: Option<u32>,
}

impl UserContext {
    /// Creates a user context rooted at an org unit.
    pub fn new(user_id: u32, org_unit_id: u32) -> Self {
        Self {
            user_id,
            org_unit_id: Some(org_unit_id),
        }
    }

    /// Creates a user context with no org unit.
    pub fn unassigned(user_id: u32) -> Self {
        Self {
            user_id,
            org_unit_id: None,
        }
    }
}

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Catalog request.
    CatalogRequest(CatalogRequest),
    /// Catalog response.
    CatalogResponse(CatalogResponse),
    /// Region fetch request.
    FetchRequest(FetchRequest),
    /// Region fetch response.
    FetchResponse(RegionPayload),
    /// Error response.
    Error(ErrorResponse),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::CatalogRequest(_) => 1,
            SyncMessage::CatalogResponse(_) => 2,
            SyncMessage::FetchRequest(_) => 3,
            SyncMessage::FetchResponse(_) => 4,
            SyncMessage::Error(_) => 5,
        }
    }

    /// Returns the message name.
    pub fn name(&self) -> &'static str {
        match self {
            SyncMessage::CatalogRequest(_) => "CatalogRequest",
            SyncMessage::CatalogResponse(_) => "CatalogResponse",
            SyncMessage::FetchRequest(_) => "FetchRequest",
            SyncMessage::FetchResponse(_) => "FetchResponse",
            SyncMessage::Error(_) => "Error",
        }
    }

    /// Unwraps a catalog response.
    ///
    /// An [`ErrorResponse`] is returned as `Ok(Err(..))` so the caller can
    /// map it to its own taxonomy.
    pub fn into_catalog_response(self) -> ProtocolResult<Result<CatalogResponse, ErrorResponse>> {
        match self {
            SyncMessage::CatalogResponse(response) => Ok(Ok(response)),
            SyncMessage::Error(error) => Ok(Err(error)),
            other => Err(ProtocolError::UnexpectedMessage {
                expected: "CatalogResponse",
                actual: other.name(),
            }),
        }
    }

    /// Unwraps a fetch response.
    pub fn into_fetch_response(self) -> ProtocolResult<Result<RegionPayload, ErrorResponse>> {
        match self {
            SyncMessage::FetchResponse(payload) => Ok(Ok(payload)),
            SyncMessage::Error(error) => Ok(Err(error)),
            other => Err(ProtocolError::UnexpectedMessage {
                expected: "FetchResponse",
                actual: other.name(),
            }),
        }
    }
}

/// Request for the ordered region list of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRequest {
    /// Requesting user.
    pub user: UserContext,
}

impl CatalogRequest {
    /// Creates a new catalog request.
    pub fn new(user: UserContext) -> Self {
        Self { user }
    }
}

/// Ordered region list for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogResponse {
    /// Regions in the order the client must apply them.
    pub regions: Vec<SyncRegion>,
    /// Digest of the ordered region list.
    ///
    /// Two responses with the same fingerprint describe the same scope.
    pub fingerprint: String,
}

impl CatalogResponse {
    /// Creates a new catalog response.
    pub fn new(regions: Vec<SyncRegion>, fingerprint: impl Into<String>) -> Self {
        Self {
            regions,
            fingerprint: fingerprint.into(),
        }
    }
}

/// Request for the payload of one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Requesting user.
    pub user: UserContext,
    /// Region identifier.
    pub identifier: String,
}

impl FetchRequest {
    /// Creates a new fetch request.
    pub fn new(user: UserContext, identifier: impl Into<String>) -> Self {
        Self {
            user,
            identifier: identifier.into(),
        }
    }
}

/// Classification of a server-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The user's scope could not be resolved or does not cover the request.
    Authorization,
    /// The server could not read its dataset.
    Unavailable,
    /// The requested region does not exist.
    NotFound,
    /// The request was malformed.
    Invalid,
}

/// Error response from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl ErrorResponse {
    /// Creates a new error response.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    #[test]
    fn message_type_codes_are_distinct() {
        let user = UserContext::new(1, 2);
        let messages = [
            SyncMessage::CatalogRequest(CatalogRequest::new(user)),
            SyncMessage::CatalogResponse(CatalogResponse::new(vec![], "")),
            SyncMessage::FetchRequest(FetchRequest::new(user, "schema")),
            SyncMessage::FetchResponse(RegionPayload::new("schema")),
            SyncMessage::Error(ErrorResponse::new(ErrorKind::Invalid, "bad")),
        ];
        let mut codes: Vec<u8> = messages.iter().map(SyncMessage::type_code).collect();
        codes.dedup();
        assert_eq!(codes, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn catalog_message_over_the_wire() {
        let message = SyncMessage::CatalogResponse(CatalogResponse::new(
            vec![SyncRegion::full("schema"), SyncRegion::new("site/1/2")],
            "abc",
        ));
        let decoded: SyncMessage = decode(&encode(&message).unwrap()).unwrap();
        let response = decoded.into_catalog_response().unwrap().unwrap();
        assert_eq!(response.regions.len(), 2);
        assert_eq!(response.fingerprint, "abc");
    }

    #[test]
    fn error_response_is_surfaced() {
        let message = SyncMessage::Error(ErrorResponse::new(ErrorKind::Authorization, "no unit"));
        let error = message.into_fetch_response().unwrap().unwrap_err();
        assert_eq!(error.kind, ErrorKind::Authorization);
    }

    #[test]
    fn wrong_message_type_is_rejected() {
        let message = SyncMessage::FetchResponse(RegionPayload::new("schema"));
        let result = message.into_catalog_response();
        assert!(matches!(
            result,
            Err(ProtocolError::UnexpectedMessage {
                expected: "CatalogResponse",
                actual: "FetchResponse"
            })
        ));
    }
}
