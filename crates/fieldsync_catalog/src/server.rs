//! Reference catalog server.

use crate::catalog::RegionCatalog;
use crate::error::{CatalogError, CatalogResult};
use crate::payload::PayloadBuilder;
use crate::source::CatalogSource;
use fieldsync_protocol::{
    CatalogRequest, CatalogResponse, FetchRequest, RegionPayload, SyncMessage, SyncRegion,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Serves catalogs and region payloads.
///
/// The server is transport agnostic: an HTTP layer, a loopback transport
/// in tests, or the CLI call [`CatalogServer::handle_message`] or
/// [`CatalogServer::handle_bytes`] directly.
///
/// # Example
///
/// ```
/// use fieldsync_catalog::{CatalogServer, Dataset, InMemoryDataset};
/// use fieldsync_protocol::{CatalogRequest, UserContext};
/// use std::sync::Arc;
///
/// let server = CatalogServer::new(Arc::new(InMemoryDataset::new(Dataset::default())));
/// let response = server.handle_catalog(CatalogRequest::new(UserContext::unassigned(1)));
/// assert!(response.is_err());
/// ```
#[derive(Clone)]
pub struct CatalogServer {
    catalog: RegionCatalog,
    payloads: PayloadBuilder,
}

impl CatalogServer {
    /// Creates a server over a data source.
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            catalog: RegionCatalog::new(Arc::clone(&source)),
            payloads: PayloadBuilder::new(source),
        }
    }

    /// Returns the region catalog.
    pub fn catalog(&self) -> &RegionCatalog {
        &self.catalog
    }

    /// Handles a catalog request.
    pub fn handle_catalog(&self, request: CatalogRequest) -> CatalogResult<CatalogResponse> {
        let regions = self.catalog.list_regions(&request.user)?;
        let fingerprint = fingerprint(&regions);
        Ok(CatalogResponse::new(regions, fingerprint))
    }

    /// Handles a region fetch.
    pub fn handle_fetch(&self, request: FetchRequest) -> CatalogResult<RegionPayload> {
        self.payloads.build(&request.user, &request.identifier)
    }

    /// Handles a sync message. Failures are answered with
    /// [`SyncMessage::Error`].
    pub fn handle_message(&self, message: SyncMessage) -> SyncMessage {
        let result = match message {
            SyncMessage::CatalogRequest(req) => {
                self.handle_catalog(req).map(SyncMessage::CatalogResponse)
            }
            SyncMessage::FetchRequest(req) => self.handle_fetch(req).map(SyncMessage::FetchResponse),
            other => Err(CatalogError::InvalidRequest(format!(
                "unexpected message type: {}",
                other.name()
            ))),
        };

        result.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "request failed");
            SyncMessage::Error(err.to_response())
        })
    }

    /// Handles a CBOR-encoded sync message and returns the encoded reply.
    ///
    /// # Errors
    ///
    /// Returns an error only if the reply cannot be encoded. Undecodable
    /// requests are answered with an encoded error message.
    pub fn handle_bytes(&self, bytes: &[u8]) -> CatalogResult<Vec<u8>> {
        let reply = match fieldsync_protocol::decode::<SyncMessage>(bytes) {
            Ok(message) => self.handle_message(message),
            Err(err) => SyncMessage::Error(CatalogError::from(err).to_response()),
        };
        Ok(fieldsync_protocol::encode(&reply)?)
    }
}

/// Computes the SHA-256 fingerprint of an ordered region list, hex encoded.
///
/// Any change in membership, order or replace policy changes the
/// fingerprint.
pub fn fingerprint(regions: &[SyncRegion]) -> String {
    let mut hasher = Sha256::new();
    for region in regions {
        hasher.update(region.identifier.as_bytes());
        hasher.update([u8::from(region.full_replace)]);
        hasher.update(b"\n");
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
