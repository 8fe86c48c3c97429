//! The authoritative replicant store.
//!
//! Owns the canonical `{value, revision, schema}` for every
//! `(namespace, name)` pair: applies assignments and operation batches,
//! validates against the replicant's schema, increments revisions, persists
//! (debounced) through a [`PersistenceAdapter`], and publishes every
//! committed change on a local broadcast bus.
//!
//! # Concurrency
//!
//! Each replicant lives behind its own lock, so validate-then-commit is
//! atomic per replicant and revisions never race, while distinct replicants
//! proceed fully concurrently. Persistence is fire-and-forget from the
//! commit path: adapter failures are logged, never surfaced, and never block
//! the in-memory commit.
//!
//! # Intra-process delivery
//!
//! Same-process consumers (server-side extensions) subscribe to the store's
//! event bus directly via [`ReplicantStore::subscribe`] — they see their own
//! and everyone else's committed changes without a network hop. The network
//! layer subscribes to the same bus and fans events out to remote mirrors.

mod adapter;
mod error;
mod persist;
mod replicant;
mod store;

pub use adapter::{JsonFileAdapter, MemoryAdapter, PersistError, PersistResult, PersistenceAdapter};
pub use error::{StoreError, StoreResult};
pub use replicant::{DeclareOptions, ReplicantSnapshot, DEFAULT_PERSISTENCE_INTERVAL};
pub use store::{ReplicantStore, StoreEvent};
