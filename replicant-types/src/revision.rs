//! Monotonic revision counters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a replicant's state after each committed change.
///
/// Starts at 0 on creation and increases by exactly 1 for every accepted
/// assignment or operation batch. It never decreases or skips while the
/// authoritative process is alive.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(u64);

impl Revision {
    /// The revision of a freshly created replicant.
    pub const ZERO: Revision = Revision(0);

    /// Creates a revision from a raw counter value.
    #[must_use]
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    /// The raw counter value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// The revision produced by one committed change on top of this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether this revision is the direct successor of `prev`.
    ///
    /// A mirror receiving a broadcast whose revision does not follow its own
    /// has missed a message and must resync.
    #[must_use]
    pub const fn follows(&self, prev: Revision) -> bool {
        self.0 == prev.0 + 1
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
