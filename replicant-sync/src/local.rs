//! In-process transport over tokio channels.
//!
//! [`LocalHub`] is the server end; each [`LocalHub::connect`] hands out a
//! [`LocalConnection`] client end wired to it. Same-process mirrors
//! (dashboards embedded in the authority, tests) talk through this pair
//! with no serialization or sockets involved — the messages themselves are
//! still the full wire protocol.

use crate::error::{SyncError, SyncResult};
use crate::protocol::SyncMessage;
use crate::transport::{ClientTransport, IncomingRequest, ResponseToken, ServerTransport};
use async_trait::async_trait;
use replicant_types::ClientId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// The tables hold no invariants across a panic, so a poisoned lock is
/// safe to keep using.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The server end of the in-process transport.
#[derive(Clone)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    requests_tx: mpsc::UnboundedSender<IncomingRequest>,
    requests_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<IncomingRequest>>,
    clients: Mutex<HashMap<ClientId, mpsc::UnboundedSender<SyncMessage>>>,
    rooms: Mutex<HashMap<String, HashSet<ClientId>>>,
}

impl LocalHub {
    /// Creates a hub with no connections.
    #[must_use]
    pub fn new() -> Self {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(HubInner {
                requests_tx,
                requests_rx: tokio::sync::Mutex::new(requests_rx),
                clients: Mutex::new(HashMap::new()),
                rooms: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Opens a new client connection to this hub.
    pub fn connect(&self) -> LocalConnection {
        let client_id = ClientId::new();
        let (broadcast_tx, broadcast_rx) = mpsc::unbounded_channel();
        lock(&self.inner.clients).insert(client_id, broadcast_tx);
        debug!("local client {client_id} connected");
        LocalConnection {
            client_id,
            requests: self.inner.requests_tx.clone(),
            broadcasts: tokio::sync::Mutex::new(broadcast_rx),
        }
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServerTransport for LocalHub {
    async fn recv_request(&self) -> Option<IncomingRequest> {
        self.inner.requests_rx.lock().await.recv().await
    }

    async fn respond(&self, token: ResponseToken, message: SyncMessage) -> SyncResult<()> {
        let tx = token
            .downcast::<oneshot::Sender<SyncMessage>>()
            .ok_or_else(|| SyncError::Transport("foreign response token".into()))?;
        tx.send(message).map_err(|_| SyncError::ChannelClosed)
    }

    async fn join(&self, client_id: ClientId, room: &str) -> SyncResult<()> {
        lock(&self.inner.rooms)
            .entry(room.to_string())
            .or_default()
            .insert(client_id);
        Ok(())
    }

    async fn broadcast(
        &self,
        room: &str,
        message: SyncMessage,
        exclude: Option<ClientId>,
    ) -> SyncResult<()> {
        let members: Vec<ClientId> = {
            let rooms = lock(&self.inner.rooms);
            match rooms.get(room) {
                Some(members) => members
                    .iter()
                    .copied()
                    .filter(|id| Some(*id) != exclude)
                    .collect(),
                None => return Ok(()),
            }
        };

        let mut clients = lock(&self.inner.clients);
        for member in members {
            if let Some(tx) = clients.get(&member) {
                if tx.send(message.clone()).is_err() {
                    // Connection dropped; forget it.
                    clients.remove(&member);
                }
            }
        }
        Ok(())
    }
}

/// A client connection handed out by [`LocalHub::connect`].
pub struct LocalConnection {
    client_id: ClientId,
    requests: mpsc::UnboundedSender<IncomingRequest>,
    broadcasts: tokio::sync::Mutex<mpsc::UnboundedReceiver<SyncMessage>>,
}

#[async_trait]
impl ClientTransport for LocalConnection {
    fn client_id(&self) -> ClientId {
        self.client_id
    }

    async fn request(&self, message: SyncMessage) -> SyncResult<SyncMessage> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(IncomingRequest {
                client_id: self.client_id,
                message,
                response_token: ResponseToken::new(tx),
            })
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    async fn recv_broadcast(&self) -> Option<SyncMessage> {
        self.broadcasts.lock().await.recv().await
    }
}
