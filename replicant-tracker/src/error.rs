//! Error types for operation replay.

use replicant_types::OpPath;
use thiserror::Error;

/// Result type for operation replay and tracked mutation.
pub type OpResult<T> = Result<T, OpError>;

/// Errors that can occur while applying, recording or inverting operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpError {
    /// The operation's path does not exist in the value.
    #[error("path `{0}` does not exist")]
    PathNotFound(OpPath),

    /// The operation expects an object at its path.
    #[error("expected an object at `{0}`")]
    NotAnObject(OpPath),

    /// The operation expects an array at its path.
    #[error("expected an array at `{0}`")]
    NotAnArray(OpPath),

    /// An array index is out of range.
    #[error("index {index} out of bounds at `{path}` (len {len})")]
    IndexOutOfBounds {
        path: OpPath,
        index: usize,
        len: usize,
    },

    /// A sort permutation does not match the array it reorders.
    #[error("sort permutation of length {got} does not match array length {len} at `{path}`")]
    BadPermutation { path: OpPath, got: usize, len: usize },

    /// The operation cannot be run backwards.
    #[error("`{0}` operations are not invertible")]
    NotInvertible(&'static str),
}
