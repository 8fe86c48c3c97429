//! Schema compilation, validation and default generation for replicants.
//!
//! A schema is a plain JSON document (`type`, `properties`, `default`,
//! `required`, `additionalProperties`, `items`, `enum`, `$ref`). Compiling
//! resolves every internal and cross-document reference into one
//! self-contained document, fingerprints it, and yields a [`CompiledSchema`]
//! that can validate values and deterministically generate their default.
//!
//! Everything here is a pure function over immutable compiled schemas —
//! no I/O, no shared state.

mod canonical;
mod compiled;
mod compiler;
mod error;

pub use compiled::CompiledSchema;
pub use compiler::{compile, SchemaCompiler};
pub use error::{describe_violations, CompileError, SchemaResult, Violation};
