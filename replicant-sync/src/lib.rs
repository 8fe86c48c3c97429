//! Revisioned replication of replicants between an authority and its
//! mirrors.
//!
//! The authority owns the canonical state in a
//! [`ReplicantStore`](replicant_store::ReplicantStore); mirrors hold local
//! copies and edit them optimistically. Every accepted change produces a
//! new revision, acknowledged to the editor and broadcast to the rest of
//! the replicant's room in commit order. Mirrors that observe a revision
//! gap or a stale schema fingerprint re-declare and start over from a
//! fresh snapshot.
//!
//! # Components
//!
//! - **Protocol**: the wire messages shared by every mirror implementation
//! - **Transport**: traits for each side of the wire, plus an in-process
//!   channel pair ([`LocalHub`]/[`LocalConnection`])
//! - **Server**: request handling and room fan-out over a store
//! - **Client**: mirrors with optimistic edits, rollback and resync

mod client;
mod error;
mod local;
mod protocol;
mod server;
mod transport;

pub use client::{ChangeEvent, ListenerId, ReplicantClient};
pub use error::{SyncError, SyncResult};
pub use local::{LocalConnection, LocalHub};
pub use protocol::{
    AssignReplicant, ChangeRejected, ChangeReplicant, DeclareReplicant, ErrorMessage,
    ReadReplicant, RejectReason, ReplicantAssigned, ReplicantChanged, ReplicantDeclared,
    ReplicantRead, SyncMessage, PROTOCOL_VERSION,
};
pub use server::SyncServer;
pub use transport::{ClientTransport, IncomingRequest, ResponseToken, ServerTransport};
