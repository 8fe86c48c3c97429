//! Core type definitions for the replicant state-replication system.
//!
//! This crate defines the fundamental, transport-agnostic types shared by
//! every other crate in the workspace:
//! - Replicant and client identifiers
//! - Monotonic revision counters
//! - Schema fingerprints
//! - Structural mutation operations and their paths
//!
//! All behavior (validation, operation replay, storage, sync) lives in the
//! crates built on top of these types, not here.

mod ids;
mod operation;
mod path;
mod revision;

pub use ids::{ClientId, ReplicantId};
pub use operation::{OpArgs, Operation};
pub use path::OpPath;
pub use revision::Revision;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable fingerprint of a compiled schema's content.
///
/// Two mirrors validating against the same schema hold the same sum; a
/// differing sum means the mirror's validation assumptions are stale and it
/// must resync.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaSum(String);

impl SchemaSum {
    /// Wraps a precomputed fingerprint (hex digest).
    pub fn new(sum: impl Into<String>) -> Self {
        Self(sum.into())
    }

    /// Returns the fingerprint as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaSum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
