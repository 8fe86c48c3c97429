//! Replicant records and declare-time options.

use replicant_schema::CompiledSchema;
use replicant_types::{ReplicantId, Revision, SchemaSum};
use serde_json::Value;
use std::time::Duration;

/// How long a committed change may sit before it is persisted, unless the
/// declare overrides it.
pub const DEFAULT_PERSISTENCE_INTERVAL: Duration = Duration::from_millis(1000);

/// Options honored by the *first* declaration of a replicant.
///
/// Later declarations of the same `(namespace, name)` return the existing
/// replicant and ignore these entirely.
#[derive(Debug, Clone)]
pub struct DeclareOptions {
    /// Value to use when nothing valid was persisted. Must satisfy the
    /// schema, if one is given — a default that fails its own schema is a
    /// programmer error and fails the declare.
    pub default_value: Option<Value>,

    /// Schema document governing every committed value of this replicant.
    pub schema: Option<Value>,

    /// Whether committed values are written through the persistence adapter.
    pub persistent: bool,

    /// Debounce window for persistence writes.
    pub persistence_interval: Duration,
}

impl Default for DeclareOptions {
    fn default() -> Self {
        Self {
            default_value: None,
            schema: None,
            persistent: true,
            persistence_interval: DEFAULT_PERSISTENCE_INTERVAL,
        }
    }
}

/// The state of a replicant at one committed revision, as handed to mirrors.
#[derive(Debug, Clone)]
pub struct ReplicantSnapshot {
    /// The replicant's identity.
    pub id: ReplicantId,
    /// The committed value.
    pub value: Value,
    /// The revision this value was committed at.
    pub revision: Revision,
    /// The resolved, self-contained schema document, if one governs this
    /// replicant.
    pub schema: Option<Value>,
    /// Fingerprint of the schema, if any.
    pub schema_sum: Option<SchemaSum>,
}

/// The authoritative record for one replicant. Guarded by a per-replicant
/// lock inside the store.
#[derive(Debug)]
pub(crate) struct ReplicantEntry {
    pub value: Value,
    pub revision: Revision,
    pub schema: Option<CompiledSchema>,
    pub persistent: bool,
    pub persistence_interval: Duration,
}

impl ReplicantEntry {
    pub fn schema_sum(&self) -> Option<SchemaSum> {
        self.schema.as_ref().map(|s| s.sum().clone())
    }

    pub fn snapshot(&self, id: &ReplicantId) -> ReplicantSnapshot {
        ReplicantSnapshot {
            id: id.clone(),
            value: self.value.clone(),
            revision: self.revision,
            schema: self.schema.as_ref().map(|s| s.as_value().clone()),
            schema_sum: self.schema_sum(),
        }
    }
}
