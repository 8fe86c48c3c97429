//! Structural mutation tracking and operation replay.
//!
//! Mirrors edit their local copy through [`TrackedValue`], an explicit
//! observable container: every mutator validates its target, performs the
//! edit in place, and records one [`Operation`](replicant_types::Operation)
//! in a pending batch. Edits performed synchronously between two
//! [`TrackedValue::take_batch`] calls coalesce into a single batch.
//!
//! The free functions [`apply_operation`]/[`apply_batch`] replay recorded
//! operations against any other copy of the value, and
//! [`unapply_operation`]/[`rewind`] run them backwards, reconstructing the
//! pre-edit value from the post-edit one without storing two full copies.
//!
//! Authoritative installs (remote assigns, resyncs) bypass observation:
//! [`TrackedValue::overwrite`] swaps the value in without recording, and
//! [`TrackedValue::apply_remote`] replays a remote batch without re-emitting
//! it.

mod error;
mod ops;
mod tracked;

pub use error::{OpError, OpResult};
pub use ops::{apply_batch, apply_operation, rewind, unapply_operation};
pub use tracked::TrackedValue;
