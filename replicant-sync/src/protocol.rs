//! Sync protocol messages.
//!
//! The protocol is request-response with server-pushed broadcasts on top:
//! a mirror declares a replicant (joining its update room), then either
//! assigns whole values or sends recorded operation batches. The authority
//! answers every request, and fans each committed change out to the rest of
//! the room in commit order.
//!
//! Messages serialize as `{"type": ..., "payload": ...}` with camelCase
//! type names and fields — the contract shared by every mirror
//! implementation, whatever language it is written in.

use replicant_schema::Violation;
use replicant_types::{Operation, ReplicantId, Revision, SchemaSum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

/// A sync protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SyncMessage {
    /// Client → server: declare a replicant and join its update room.
    DeclareReplicant(DeclareReplicant),

    /// Server → client: declaration response with the authoritative state.
    ReplicantDeclared(ReplicantDeclared),

    /// Client → server: overwrite the replicant's value wholesale.
    AssignReplicant(AssignReplicant),

    /// Server → room and server → assigner: an assignment was committed.
    ReplicantAssigned(ReplicantAssigned),

    /// Client → server: apply a recorded operation batch.
    ChangeReplicant(ChangeReplicant),

    /// Server → room and server → changer: a batch was committed.
    ReplicantChanged(ReplicantChanged),

    /// Client → server: one-shot read without declaring or joining.
    ReadReplicant(ReadReplicant),

    /// Server → client: read response.
    ReplicantRead(ReplicantRead),

    /// Server → caller only: a change was rejected; nothing was committed.
    ChangeRejected(ChangeRejected),

    /// Server → client: failure outside the rejection taxonomy.
    Error(ErrorMessage),
}

impl SyncMessage {
    /// Builds a generic error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorMessage {
            message: message.into(),
        })
    }
}

/// Declares a replicant, creating it server-side on first declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclareReplicant {
    /// Protocol version the client speaks.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Identity of the replicant being declared.
    #[serde(flatten)]
    pub id: ReplicantId,
    /// Value to use if nothing valid was persisted. Honored only by the
    /// first declaration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// ID of a schema document registered with the authority's compiler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_path: Option<String>,
    /// Whether committed values are persisted.
    #[serde(default = "default_persistent")]
    pub persistent: bool,
}

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

fn default_persistent() -> bool {
    true
}

impl DeclareReplicant {
    /// Creates a declaration with no default, no schema, persistence on.
    pub fn new(id: ReplicantId) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id,
            default_value: None,
            schema_path: None,
            persistent: true,
        }
    }

    /// Sets the value to use when nothing valid was persisted.
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// References a schema document registered with the authority.
    #[must_use]
    pub fn with_schema_path(mut self, path: impl Into<String>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    /// Disables persistence for this replicant.
    #[must_use]
    pub fn transient(mut self) -> Self {
        self.persistent = false;
        self
    }
}

/// The authoritative state handed back by a declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicantDeclared {
    #[serde(flatten)]
    pub id: ReplicantId,
    pub value: Value,
    pub revision: Revision,
    /// Resolved, self-contained schema document, if one governs the
    /// replicant. Mirrors validate against this copy locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_sum: Option<SchemaSum>,
}

/// Overwrites a replicant's value wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignReplicant {
    #[serde(flatten)]
    pub id: ReplicantId,
    pub value: Value,
}

/// A committed assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicantAssigned {
    #[serde(flatten)]
    pub id: ReplicantId,
    pub value: Value,
    pub revision: Revision,
}

/// Applies a recorded operation batch atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReplicant {
    #[serde(flatten)]
    pub id: ReplicantId,
    /// The revision the mirror produced this batch against. Diagnostic
    /// only; acceptance is governed by the schema fingerprint.
    pub revision: Revision,
    /// Fingerprint of the schema the batch was recorded under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_sum: Option<SchemaSum>,
    pub operations: Vec<Operation>,
}

/// A committed operation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicantChanged {
    #[serde(flatten)]
    pub id: ReplicantId,
    pub revision: Revision,
    pub operations: Vec<Operation>,
}

/// One-shot read of a replicant's current value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReplicant {
    #[serde(flatten)]
    pub id: ReplicantId,
}

/// Read response. `value` is absent when the replicant was never declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicantRead {
    #[serde(flatten)]
    pub id: ReplicantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// A rejected change. Sent to the caller only, never broadcast; the
/// authoritative state is exactly what it was before the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRejected {
    #[serde(flatten)]
    pub id: ReplicantId,
    pub reason: RejectReason,
}

/// Why the authority refused a change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RejectReason {
    /// The client's schema fingerprint is stale. The client must
    /// re-declare to resync before editing again.
    SchemaMismatch {
        current: Option<SchemaSum>,
        client: Option<SchemaSum>,
    },

    /// The resulting value violates the replicant's schema.
    InvalidValue { violations: Vec<Violation> },

    /// An operation in the batch could not be replayed.
    BadOperation { message: String },

    /// The replicant was never declared with the authority.
    NotDeclared,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::SchemaMismatch { current, client } => write!(
                f,
                "schema mismatch (authority {current:?}, client {client:?})"
            ),
            RejectReason::InvalidValue { violations } => {
                write!(
                    f,
                    "invalid value: {}",
                    replicant_schema::describe_violations(violations)
                )
            }
            RejectReason::BadOperation { message } => write!(f, "bad operation: {message}"),
            RejectReason::NotDeclared => write!(f, "replicant not declared"),
        }
    }
}

/// Generic error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub message: String,
}
