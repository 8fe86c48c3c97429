//! Transport layer abstraction.
//!
//! Both sides of the wire are traits so the server loop and the client
//! mirrors work over any backend. A transport carries three things:
//! request-response pairs, server-controlled room membership, and room
//! broadcasts with originator exclusion.

use crate::error::SyncResult;
use crate::protocol::SyncMessage;
use async_trait::async_trait;
use replicant_types::ClientId;
use std::any::Any;

/// Opaque token used to send a response back to an incoming request.
/// Each transport implementation wraps its own channel type inside this.
pub struct ResponseToken(Box<dyn Any + Send>);

impl ResponseToken {
    /// Wraps a transport-specific response channel.
    pub fn new<T: Any + Send + 'static>(inner: T) -> Self {
        Self(Box::new(inner))
    }

    /// Unwraps back to the transport-specific type.
    pub fn downcast<T: Any + Send + 'static>(self) -> Option<T> {
        self.0.downcast::<T>().ok().map(|b| *b)
    }
}

/// An incoming request received by the server side of a transport.
pub struct IncomingRequest {
    /// The client that sent the request.
    pub client_id: ClientId,
    /// The request message.
    pub message: SyncMessage,
    /// Opaque token to send the response back through.
    pub response_token: ResponseToken,
}

/// The authority's side of the wire.
#[async_trait]
pub trait ServerTransport: Send + Sync {
    /// Receives the next incoming request.
    /// Returns `None` when the transport is shutting down.
    async fn recv_request(&self) -> Option<IncomingRequest>;

    /// Sends a response to a previously received request.
    async fn respond(&self, token: ResponseToken, message: SyncMessage) -> SyncResult<()>;

    /// Adds a client to a room. Membership is server-controlled; clients
    /// never join rooms themselves.
    async fn join(&self, client_id: ClientId, room: &str) -> SyncResult<()>;

    /// Sends a message to every member of a room except `exclude`.
    async fn broadcast(
        &self,
        room: &str,
        message: SyncMessage,
        exclude: Option<ClientId>,
    ) -> SyncResult<()>;
}

/// A mirror's side of the wire.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// The identity this connection presents to the authority.
    fn client_id(&self) -> ClientId;

    /// Sends a request and waits for the authority's response.
    async fn request(&self, message: SyncMessage) -> SyncResult<SyncMessage>;

    /// Receives the next room broadcast pushed by the authority.
    /// Returns `None` when the connection is gone.
    async fn recv_broadcast(&self) -> Option<SyncMessage>;
}
