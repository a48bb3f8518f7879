//! CBOR message transport.
//!
//! This module provides a transport that exchanges CBOR-encoded
//! [`SyncMessage`]s with a catalog server. The byte channel is abstracted
//! via a trait to allow different implementations (an HTTP client, a
//! loopback to an in-process server, etc.).

use crate::error::{SyncError, SyncResult};
use crate::transport::RegionTransport;
use fieldsync_protocol::{
    CatalogRequest, CatalogResponse, FetchRequest, RegionPayload, SyncMessage, UserContext,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Byte channel to a catalog server.
pub trait MessageClient: Send + Sync {
    /// Sends an encoded request and returns the encoded reply.
    fn exchange(&self, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the channel is healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Region transport over CBOR-encoded sync messages.
///
/// Every request carries the user context the transport was created for.
pub struct MessageTransport<C: MessageClient> {
    user: UserContext,
    client: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: MessageClient> MessageTransport<C> {
    /// Creates a transport acting for `user`.
    pub fn new(user: UserContext, client: C) -> Self {
        Self {
            user,
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the user requests are made for.
    pub fn user(&self) -> UserContext {
        self.user
    }

    /// Returns the last channel error.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Marks the transport as disconnected.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn send(&self, message: &SyncMessage) -> SyncResult<SyncMessage> {
        if !self.is_connected() {
            return Err(SyncError::transport_retryable("not connected"));
        }

        let body = fieldsync_protocol::encode(message)
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;

        let reply = self.client.exchange(body).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            SyncError::transport_retryable(e)
        })?;
        *self.last_error.write() = None;

        fieldsync_protocol::decode(&reply)
            .map_err(|e| SyncError::Protocol(format!("failed to decode reply: {e}")))
    }
}

impl<C: MessageClient> RegionTransport for MessageTransport<C> {
    fn list_regions(&self) -> SyncResult<CatalogResponse> {
        let reply = self.send(&SyncMessage::CatalogRequest(CatalogRequest::new(self.user)))?;
        reply
            .into_catalog_response()?
            .map_err(SyncError::from_catalog_response)
    }

    fn fetch_region(&self, identifier: &str) -> SyncResult<RegionPayload> {
        let request = FetchRequest::new(self.user, identifier);
        let reply = self.send(&SyncMessage::FetchRequest(request))?;
        let payload = reply
            .into_fetch_response()?
            .map_err(SyncError::from_fetch_response)?;
        if payload.identifier != identifier {
            return Err(SyncError::Protocol(format!(
                "asked for {identifier}, received {}",
                payload.identifier
            )));
        }
        Ok(payload)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }
}

/// Servers that answer encoded messages in process.
pub trait LoopbackServer {
    /// Handles an encoded request and returns the encoded reply.
    fn handle_bytes(&self, body: &[u8]) -> Result<Vec<u8>, String>;
}

impl<F> LoopbackServer for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, String>,
{
    fn handle_bytes(&self, body: &[u8]) -> Result<Vec<u8>, String> {
        self(body)
    }
}

/// A message client that routes requests directly to an in-process server.
///
/// Useful for testing and demos without actual network overhead. The
/// request still goes through the full encode and decode path.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer + Send + Sync> MessageClient for LoopbackClient<S> {
    fn exchange(&self, body: Vec<u8>) -> Result<Vec<u8>, String> {
        self.server.handle_bytes(&body)
    }
}
