//! The authority's request and fan-out loops.

use crate::error::SyncResult;
use crate::protocol::{
    ChangeRejected, ChangeReplicant, DeclareReplicant, ReadReplicant, RejectReason,
    ReplicantAssigned, ReplicantChanged, ReplicantDeclared, ReplicantRead, SyncMessage,
    PROTOCOL_VERSION,
};
use crate::transport::{IncomingRequest, ResponseToken, ServerTransport};
use replicant_schema::SchemaCompiler;
use replicant_store::{DeclareOptions, ReplicantStore, StoreError, StoreEvent};
use replicant_types::{ClientId, ReplicantId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Serves a [`ReplicantStore`] over a [`ServerTransport`].
///
/// Two concerns share one loop: answering client requests against the
/// store, and fanning the store's committed events out to each replicant's
/// room (excluding the originating client, whose acknowledgement already
/// carries the committed revision). Rejections are answered to the caller
/// only and never broadcast.
pub struct SyncServer {
    store: ReplicantStore,
    transport: Arc<dyn ServerTransport>,
    schemas: SchemaCompiler,
}

impl SyncServer {
    /// Creates a server with no registered schema documents.
    pub fn new(store: ReplicantStore, transport: Arc<dyn ServerTransport>) -> Self {
        Self::with_schemas(store, transport, SchemaCompiler::new())
    }

    /// Creates a server resolving `schemaPath` declarations against the
    /// given compiler.
    pub fn with_schemas(
        store: ReplicantStore,
        transport: Arc<dyn ServerTransport>,
        schemas: SchemaCompiler,
    ) -> Self {
        Self {
            store,
            transport,
            schemas,
        }
    }

    /// Runs until the transport shuts down.
    pub async fn run(&self) {
        let mut events = self.store.subscribe();
        info!("sync server running");
        loop {
            tokio::select! {
                request = self.transport.recv_request() => {
                    let Some(request) = request else {
                        info!("transport closed, sync server stopping");
                        break;
                    };
                    if let Err(e) = self.handle_request(request).await {
                        warn!("failed to answer request: {e}");
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Err(e) = self.fan_out(event).await {
                            warn!("failed to broadcast event: {e}");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Mirrors behind a lagged fan-out see a revision gap
                        // and resync themselves.
                        warn!("event fan-out lagged, {missed} event(s) dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    async fn handle_request(&self, request: IncomingRequest) -> SyncResult<()> {
        let IncomingRequest {
            client_id,
            message,
            response_token,
        } = request;

        match message {
            SyncMessage::DeclareReplicant(declare) => {
                self.handle_declare(client_id, declare, response_token).await
            }
            SyncMessage::AssignReplicant(assign) => {
                let response = match self
                    .store
                    .assign_by(&assign.id, assign.value.clone(), Some(client_id))
                    .await
                {
                    Ok(revision) => SyncMessage::ReplicantAssigned(ReplicantAssigned {
                        id: assign.id,
                        value: assign.value,
                        revision,
                    }),
                    Err(e) => reject(assign.id, e),
                };
                self.transport.respond(response_token, response).await
            }
            SyncMessage::ChangeReplicant(change) => {
                let ChangeReplicant {
                    id,
                    revision: client_revision,
                    schema_sum,
                    operations,
                } = change;
                debug!(
                    "client {client_id} sent {} operation(s) for {id} at revision {client_revision}",
                    operations.len()
                );
                let response = match self
                    .store
                    .apply_operations_by(&id, schema_sum, operations.clone(), Some(client_id))
                    .await
                {
                    Ok(revision) => SyncMessage::ReplicantChanged(ReplicantChanged {
                        id,
                        revision,
                        operations,
                    }),
                    Err(e) => reject(id, e),
                };
                self.transport.respond(response_token, response).await
            }
            SyncMessage::ReadReplicant(ReadReplicant { id }) => {
                // Reads do not declare and do not join the room.
                let value = self.store.read(&id).await;
                self.transport
                    .respond(
                        response_token,
                        SyncMessage::ReplicantRead(ReplicantRead { id, value }),
                    )
                    .await
            }
            other => {
                warn!("client {client_id} sent unexpected {other:?}");
                self.transport
                    .respond(
                        response_token,
                        SyncMessage::error("unexpected message type"),
                    )
                    .await
            }
        }
    }

    async fn handle_declare(
        &self,
        client_id: ClientId,
        declare: DeclareReplicant,
        response_token: ResponseToken,
    ) -> SyncResult<()> {
        if declare.version != PROTOCOL_VERSION {
            let response = SyncMessage::error(format!(
                "protocol version {} not supported (server speaks {PROTOCOL_VERSION})",
                declare.version
            ));
            return self.transport.respond(response_token, response).await;
        }

        let schema = match &declare.schema_path {
            Some(path) => match self.schemas.compile_document(path) {
                Ok(compiled) => Some(compiled.as_value().clone()),
                Err(e) => {
                    let response =
                        SyncMessage::error(format!("schema document `{path}`: {e}"));
                    return self.transport.respond(response_token, response).await;
                }
            },
            None => None,
        };

        let opts = DeclareOptions {
            default_value: declare.default_value,
            schema,
            persistent: declare.persistent,
            ..Default::default()
        };
        let response = match self.store.declare(declare.id.clone(), opts).await {
            Ok(snapshot) => {
                // Declaring subscribes the client to this replicant's room.
                self.transport
                    .join(client_id, &room(&snapshot.id))
                    .await?;
                SyncMessage::ReplicantDeclared(ReplicantDeclared {
                    id: snapshot.id,
                    value: snapshot.value,
                    revision: snapshot.revision,
                    schema: snapshot.schema,
                    schema_sum: snapshot.schema_sum,
                })
            }
            Err(e) => reject(declare.id, e),
        };
        self.transport.respond(response_token, response).await
    }

    async fn fan_out(&self, event: StoreEvent) -> SyncResult<()> {
        match event {
            StoreEvent::Assigned {
                id,
                value,
                revision,
                origin,
            } => {
                let message = SyncMessage::ReplicantAssigned(ReplicantAssigned {
                    id: id.clone(),
                    value,
                    revision,
                });
                self.transport.broadcast(&room(&id), message, origin).await
            }
            StoreEvent::Changed {
                id,
                revision,
                operations,
                origin,
            } => {
                let message = SyncMessage::ReplicantChanged(ReplicantChanged {
                    id: id.clone(),
                    revision,
                    operations,
                });
                self.transport.broadcast(&room(&id), message, origin).await
            }
        }
    }
}

/// The room a replicant's updates are broadcast to.
fn room(id: &ReplicantId) -> String {
    format!("replicant:{id}")
}

fn reject(id: ReplicantId, error: StoreError) -> SyncMessage {
    let reason = match error {
        StoreError::SchemaMismatch {
            current, client, ..
        } => RejectReason::SchemaMismatch { current, client },
        StoreError::InvalidValue { violations, .. }
        | StoreError::InvalidDefault { violations, .. } => {
            RejectReason::InvalidValue { violations }
        }
        StoreError::Operation { source, .. } => RejectReason::BadOperation {
            message: source.to_string(),
        },
        StoreError::NotFound(_) => RejectReason::NotDeclared,
        other @ StoreError::SchemaCompile { .. } => {
            return SyncMessage::error(other.to_string());
        }
    };
    SyncMessage::ChangeRejected(ChangeRejected { id, reason })
}
