//! Error types for the replicant store.

use replicant_schema::{describe_violations, CompileError, Violation};
use replicant_tracker::OpError;
use replicant_types::{ReplicantId, SchemaSum};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The schema document supplied at declare time failed to compile.
    #[error("schema for replicant {id} failed to compile: {source}")]
    SchemaCompile {
        id: ReplicantId,
        #[source]
        source: CompileError,
    },

    /// The caller-supplied default value violates the replicant's own
    /// schema. This is a programmer error and fails the declare loudly.
    #[error("default value for replicant {id} violates its schema: {}", describe_violations(.violations))]
    InvalidDefault {
        id: ReplicantId,
        violations: Vec<Violation>,
    },

    /// An assignment or post-operation value violates the schema. The store
    /// is left untouched.
    #[error("invalid value for replicant {id}: {}", describe_violations(.violations))]
    InvalidValue {
        id: ReplicantId,
        violations: Vec<Violation>,
    },

    /// The client's schema fingerprint is stale. The whole batch was
    /// dropped; the client must re-declare to resync.
    #[error(
        "schema mismatch for replicant {id} (store {current:?}, client {client:?}); \
         the change was dropped, re-declare to resync"
    )]
    SchemaMismatch {
        id: ReplicantId,
        current: Option<SchemaSum>,
        client: Option<SchemaSum>,
    },

    /// The targeted replicant was never declared.
    #[error("replicant {0} has not been declared")]
    NotFound(ReplicantId),

    /// An operation in the batch could not be replayed (bad path, wrong
    /// container type, out-of-range index). The store is left untouched.
    #[error("operation rejected for replicant {id}: {source}")]
    Operation {
        id: ReplicantId,
        #[source]
        source: OpError,
    },
}
