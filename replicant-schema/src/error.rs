//! Error types for schema compilation and validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for schema compilation.
pub type SchemaResult<T> = Result<T, CompileError>;

/// Errors that can occur while compiling a schema document.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A `$ref` pointed at something that does not exist.
    #[error("unresolvable reference `{reference}` at {path}")]
    UnresolvedRef { reference: String, path: String },

    /// References form a cycle.
    #[error("reference cycle through `{reference}`")]
    RefCycle { reference: String },

    /// A cross-document reference named a document the compiler was never given.
    #[error("unknown schema document `{0}`")]
    UnknownDocument(String),

    /// The document is structurally invalid (wrong keyword shapes).
    #[error("invalid schema document at {path}: {reason}")]
    InvalidDocument { path: String, reason: String },
}

/// One violated constraint, with the path of the offending value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Path of the value that violated the constraint (`/` for the root).
    pub path: String,
    /// Human-readable description of the constraint.
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Joins a violation list into one human-readable line.
pub fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
