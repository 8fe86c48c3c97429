//! Error types for the sync layer.

use crate::protocol::RejectReason;
use replicant_tracker::OpError;
use replicant_types::ReplicantId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level failure (connection gone, send failed).
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer sent a message that makes no sense in this state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The channel to the peer closed mid-operation.
    #[error("channel closed")]
    ChannelClosed,

    /// The replicant was used before being declared on this client.
    #[error("replicant {0} has not been declared on this client")]
    NotDeclared(ReplicantId),

    /// The mirror is mid-resync after a revision gap or schema mismatch;
    /// edits are refused until the fresh declaration lands.
    #[error("replicant {0} is resynchronizing")]
    Resyncing(ReplicantId),

    /// The authority rejected a change. The local mirror has been rolled
    /// back (or resynced, for a schema mismatch).
    #[error("change to replicant {id} rejected: {reason}")]
    Rejected { id: ReplicantId, reason: RejectReason },

    /// A local mutation failed before anything was sent.
    #[error(transparent)]
    Operation(#[from] OpError),

    /// The authority reported an error outside the reject taxonomy.
    #[error("server error: {0}")]
    Server(String),
}
