//! Structural mutation operations.
//!
//! An operation is one discrete, replayable edit at a path within a
//! replicant's value. A batch of operations applies atomically and in array
//! order, and is associated with the schema fingerprint in effect when the
//! client produced it.
//!
//! Argument payloads carry everything needed to replay the edit exactly on
//! another copy *and* to invert it: `update` and `delete` carry the old
//! value, `arraySplice` carries the removed elements, `arraySort` carries
//! the permutation, `arrayFill` and `arrayCopyWithin` carry the overwritten
//! slice.

use crate::OpPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One discrete, replayable mutation at a given path.
///
/// Serializes as `{"path": ..., "method": ..., "args": ...}` — the wire
/// contract shared with every mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Route from the value root to the mutated container.
    pub path: OpPath,
    /// The mutation method and its arguments.
    #[serde(flatten)]
    pub args: OpArgs,
}

impl Operation {
    /// Creates an operation from a path and arguments.
    #[must_use]
    pub fn new(path: OpPath, args: OpArgs) -> Self {
        Self { path, args }
    }

    /// The wire name of this operation's method.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match &self.args {
            OpArgs::Overwrite { .. } => "overwrite",
            OpArgs::Add { .. } => "add",
            OpArgs::Update { .. } => "update",
            OpArgs::Delete { .. } => "delete",
            OpArgs::ArraySplice { .. } => "arraySplice",
            OpArgs::ArrayPush { .. } => "arrayPush",
            OpArgs::ArrayPop { .. } => "arrayPop",
            OpArgs::ArrayShift { .. } => "arrayShift",
            OpArgs::ArrayUnshift { .. } => "arrayUnshift",
            OpArgs::ArraySort { .. } => "arraySort",
            OpArgs::ArrayReverse => "arrayReverse",
            OpArgs::ArrayFill { .. } => "arrayFill",
            OpArgs::ArrayCopyWithin { .. } => "arrayCopyWithin",
        }
    }
}

/// The method of an operation together with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args")]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OpArgs {
    /// Replace the value at the path wholesale.
    Overwrite { new_value: Value },

    /// Add a property that did not previously exist on an object.
    Add { prop: String, new_value: Value },

    /// Replace an existing property's value on an object.
    Update {
        prop: String,
        old_value: Value,
        new_value: Value,
    },

    /// Remove a property from an object.
    Delete { prop: String, old_value: Value },

    /// Remove `removed` and insert `inserted` at `index`.
    ArraySplice {
        index: usize,
        removed: Vec<Value>,
        inserted: Vec<Value>,
    },

    /// Append values to the end of an array.
    ArrayPush { values: Vec<Value> },

    /// Remove the last element of an array.
    ArrayPop { removed: Option<Value> },

    /// Remove the first element of an array.
    ArrayShift { removed: Option<Value> },

    /// Insert values at the front of an array, preserving their order.
    ArrayUnshift { values: Vec<Value> },

    /// Reorder an array: the element now at position `i` came from position
    /// `indices[i]` of the previous array.
    ArraySort { indices: Vec<usize> },

    /// Reverse an array in place.
    ArrayReverse,

    /// Set every element in `start..end` to `value`. `overwritten` is the
    /// slice replaced, for inversion.
    ArrayFill {
        value: Value,
        start: usize,
        end: usize,
        overwritten: Vec<Value>,
    },

    /// Copy the slice `start..end` to position `target` (clamped at the
    /// array end). `overwritten` is the slice replaced, for inversion.
    ArrayCopyWithin {
        target: usize,
        start: usize,
        end: usize,
        overwritten: Vec<Value>,
    },
}
