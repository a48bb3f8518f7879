//! Transport layer abstraction for region sync.

use crate::error::{SyncError, SyncResult};
use fieldsync_protocol::{CatalogResponse, RegionPayload, SyncRegion};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

/// A region transport talks to the catalog server on behalf of one
/// authenticated user.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (CBOR messages over HTTP, a loopback to an in-process
/// server, a mock for testing, etc.).
pub trait RegionTransport: Send + Sync {
    /// Requests the ordered region catalog.
    fn list_regions(&self) -> SyncResult<CatalogResponse>;

    /// Fetches the payload of one region.
    fn fetch_region(&self, identifier: &str) -> SyncResult<RegionPayload>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool {
        true
    }
}

/// A mock transport for testing.
///
/// Fetches are answered from registered payloads. Errors queued with
/// [`MockTransport::fail_fetch`] are returned first, one per fetch.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    catalog: Mutex<Option<SyncResult<CatalogResponse>>>,
    payloads: Mutex<HashMap<String, RegionPayload>>,
    failures: Mutex<HashMap<String, VecDeque<SyncError>>>,
    fetch_log: Mutex<Vec<String>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Sets the catalog answered by [`RegionTransport::list_regions`].
    pub fn set_catalog(&self, regions: Vec<SyncRegion>) {
        *self.catalog.lock() = Some(Ok(CatalogResponse::new(regions, "mock")));
    }

    /// Makes catalog requests fail.
    pub fn fail_catalog(&self, err: SyncError) {
        *self.catalog.lock() = Some(Err(err));
    }

    /// Registers the payload of a region.
    pub fn set_payload(&self, payload: RegionPayload) {
        self.payloads
            .lock()
            .insert(payload.identifier.clone(), payload);
    }

    /// Queues an error for the next fetch of a region.
    pub fn fail_fetch(&self, identifier: &str, err: SyncError) {
        self.failures
            .lock()
            .entry(identifier.to_string())
            .or_default()
            .push_back(err);
    }

    /// Returns the identifiers fetched so far, in order.
    pub fn fetch_log(&self) -> Vec<String> {
        self.fetch_log.lock().clone()
    }

    /// Forgets the fetches made so far.
    pub fn clear_fetch_log(&self) {
        self.fetch_log.lock().clear();
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl RegionTransport for MockTransport {
    fn list_regions(&self) -> SyncResult<CatalogResponse> {
        if !self.is_connected() {
            return Err(SyncError::transport_retryable("not connected"));
        }
        self.catalog
            .lock()
            .clone()
            .unwrap_or_else(|| Err(SyncError::Protocol("no mock catalog set".into())))
    }

    fn fetch_region(&self, identifier: &str) -> SyncResult<RegionPayload> {
        self.fetch_log.lock().push(identifier.to_string());
        if !self.is_connected() {
            return Err(SyncError::transport_retryable("not connected"));
        }
        if let Some(err) = self
            .failures
            .lock()
            .get_mut(identifier)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        self.payloads
            .lock()
            .get(identifier)
            .cloned()
            .ok_or_else(|| SyncError::transport_fatal(format!("no mock payload for {identifier}")))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
