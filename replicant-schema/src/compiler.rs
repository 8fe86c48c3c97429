//! Schema compilation: reference resolution and structural checks.

use crate::compiled::CompiledSchema;
use crate::error::{CompileError, SchemaResult};
use serde_json::{Map, Value};

const KNOWN_TYPES: [&str; 7] = [
    "object", "array", "string", "number", "integer", "boolean", "null",
];

/// Compiles a schema document that contains no cross-document references.
pub fn compile(schema: &Value) -> SchemaResult<CompiledSchema> {
    SchemaCompiler::new().compile(schema)
}

/// Resolves schema documents into self-contained [`CompiledSchema`]s.
///
/// External documents registered with [`add_document`](Self::add_document)
/// can be referenced from any schema as `doc-id#/pointer`; internal
/// references use the bare `#/pointer` form.
#[derive(Debug, Default)]
pub struct SchemaCompiler {
    documents: std::collections::HashMap<String, Value>,
}

impl SchemaCompiler {
    /// Creates a compiler with no external documents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema document that other schemas may reference.
    pub fn add_document(&mut self, id: impl Into<String>, document: Value) {
        self.documents.insert(id.into(), document);
    }

    /// Returns a registered document, if any.
    #[must_use]
    pub fn document(&self, id: &str) -> Option<&Value> {
        self.documents.get(id)
    }

    /// Compiles a registered document by ID.
    pub fn compile_document(&self, id: &str) -> SchemaResult<CompiledSchema> {
        let root = self
            .documents
            .get(id)
            .ok_or_else(|| CompileError::UnknownDocument(id.to_string()))?;
        self.compile(&root.clone())
    }

    /// Resolves all references in `schema` and checks its structure.
    pub fn compile(&self, schema: &Value) -> SchemaResult<CompiledSchema> {
        let mut stack = Vec::new();
        let resolved = self.resolve(schema, schema, "/", &mut stack)?;
        check_structure(&resolved, "/")?;
        Ok(CompiledSchema::from_resolved(resolved))
    }

    fn resolve(
        &self,
        node: &Value,
        current_doc: &Value,
        path: &str,
        stack: &mut Vec<String>,
    ) -> SchemaResult<Value> {
        match node {
            Value::Object(map) => {
                if let Some(reference) = map.get("$ref") {
                    let reference = reference.as_str().ok_or_else(|| {
                        CompileError::InvalidDocument {
                            path: path.to_string(),
                            reason: "$ref must be a string".to_string(),
                        }
                    })?;
                    return self.resolve_ref(reference, current_doc, path, stack);
                }

                let mut out = Map::with_capacity(map.len());
                for (key, val) in map {
                    let child_path = format!("{}{}/", path, key);
                    out.insert(key.clone(), self.resolve(val, current_doc, &child_path, stack)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let child_path = format!("{}{}/", path, i);
                    out.push(self.resolve(item, current_doc, &child_path, stack)?);
                }
                Ok(Value::Array(out))
            }
            scalar => Ok(scalar.clone()),
        }
    }

    fn resolve_ref(
        &self,
        reference: &str,
        current_doc: &Value,
        path: &str,
        stack: &mut Vec<String>,
    ) -> SchemaResult<Value> {
        if stack.iter().any(|seen| seen == reference) {
            return Err(CompileError::RefCycle {
                reference: reference.to_string(),
            });
        }

        let (doc_id, pointer) = match reference.split_once('#') {
            Some((doc, ptr)) => (doc, ptr),
            None => (reference, ""),
        };

        let doc = if doc_id.is_empty() {
            current_doc
        } else {
            self.documents
                .get(doc_id)
                .ok_or_else(|| CompileError::UnresolvedRef {
                    reference: reference.to_string(),
                    path: path.to_string(),
                })?
        };

        let target = if pointer.is_empty() {
            doc
        } else {
            doc.pointer(pointer)
                .ok_or_else(|| CompileError::UnresolvedRef {
                    reference: reference.to_string(),
                    path: path.to_string(),
                })?
        };

        stack.push(reference.to_string());
        // The target may itself contain references, resolved relative to the
        // document it lives in.
        let resolved = self.resolve(&target.clone(), doc, path, stack)?;
        stack.pop();
        Ok(resolved)
    }
}

/// Checks keyword shapes on a fully-resolved schema.
fn check_structure(schema: &Value, path: &str) -> SchemaResult<()> {
    let map = match schema {
        Value::Object(map) => map,
        _ => {
            return Err(CompileError::InvalidDocument {
                path: path.to_string(),
                reason: "schema must be an object".to_string(),
            })
        }
    };

    if let Some(ty) = map.get("type") {
        let ty = ty.as_str().ok_or_else(|| CompileError::InvalidDocument {
            path: path.to_string(),
            reason: "`type` must be a string".to_string(),
        })?;
        if !KNOWN_TYPES.contains(&ty) {
            return Err(CompileError::InvalidDocument {
                path: path.to_string(),
                reason: format!("unknown type `{ty}`"),
            });
        }
    }

    if let Some(props) = map.get("properties") {
        let props = props
            .as_object()
            .ok_or_else(|| CompileError::InvalidDocument {
                path: path.to_string(),
                reason: "`properties` must be an object".to_string(),
            })?;
        for (key, sub) in props {
            check_structure(sub, &format!("{path}properties/{key}/"))?;
        }
    }

    if let Some(required) = map.get("required") {
        let ok = required
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string));
        if !ok {
            return Err(CompileError::InvalidDocument {
                path: path.to_string(),
                reason: "`required` must be an array of strings".to_string(),
            });
        }
    }

    if let Some(additional) = map.get("additionalProperties") {
        match additional {
            Value::Bool(_) => {}
            Value::Object(_) => {
                check_structure(additional, &format!("{path}additionalProperties/"))?
            }
            _ => {
                return Err(CompileError::InvalidDocument {
                    path: path.to_string(),
                    reason: "`additionalProperties` must be a boolean or a schema".to_string(),
                })
            }
        }
    }

    if let Some(items) = map.get("items") {
        check_structure(items, &format!("{path}items/"))?;
    }

    if let Some(choices) = map.get("enum") {
        if !choices.is_array() {
            return Err(CompileError::InvalidDocument {
                path: path.to_string(),
                reason: "`enum` must be an array".to_string(),
            });
        }
    }

    Ok(())
}
