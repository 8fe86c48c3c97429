//! Compiled schemas: validation and default generation.

use crate::canonical::canonical_string;
use crate::error::Violation;
use replicant_types::SchemaSum;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A self-contained, reference-free schema with a stable fingerprint.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    root: Value,
    sum: SchemaSum,
}

impl CompiledSchema {
    /// Wraps a fully-resolved schema document. Called by the compiler.
    pub(crate) fn from_resolved(root: Value) -> Self {
        let digest = Sha256::digest(canonical_string(&root).as_bytes());
        let sum = SchemaSum::new(hex::encode(digest));
        Self { root, sum }
    }

    /// The fingerprint of this schema's canonical serialization.
    #[must_use]
    pub fn sum(&self) -> &SchemaSum {
        &self.sum
    }

    /// The resolved, self-contained schema document.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Deterministically builds the minimal value satisfying every `default`
    /// declaration at every level.
    ///
    /// An explicit `default` wins; otherwise the type's zero value is used,
    /// recursing into object properties. Arrays default to empty.
    #[must_use]
    pub fn generate_default(&self) -> Value {
        generate(&self.root)
    }

    /// Validates a value, returning every violated constraint with its path.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<Violation>> {
        let mut violations = Vec::new();
        check(&self.root, value, "/", &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

fn generate(schema: &Value) -> Value {
    let map = match schema.as_object() {
        Some(map) => map,
        None => return Value::Null,
    };

    if let Some(default) = map.get("default") {
        return default.clone();
    }

    match map.get("type").and_then(Value::as_str) {
        Some("object") => {
            let mut out = Map::new();
            if let Some(props) = map.get("properties").and_then(Value::as_object) {
                for (key, sub) in props {
                    out.insert(key.clone(), generate(sub));
                }
            }
            Value::Object(out)
        }
        Some("array") => Value::Array(Vec::new()),
        Some("string") => Value::String(String::new()),
        Some("number") | Some("integer") => Value::from(0),
        Some("boolean") => Value::Bool(false),
        _ => Value::Null,
    }
}

fn check(schema: &Value, value: &Value, path: &str, out: &mut Vec<Violation>) {
    let map = match schema.as_object() {
        Some(map) => map,
        None => return,
    };

    if let Some(choices) = map.get("enum").and_then(Value::as_array) {
        if !choices.contains(value) {
            out.push(Violation::new(
                path,
                format!("value is not one of the allowed enum values ({} allowed)", choices.len()),
            ));
        }
    }

    if let Some(expected) = map.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            out.push(Violation::new(
                path,
                format!("expected type `{expected}`, got `{}`", type_name(value)),
            ));
            // A mistyped value cannot be meaningfully descended into.
            return;
        }
    }

    if let Value::Object(fields) = value {
        let properties = map.get("properties").and_then(Value::as_object);

        if let Some(props) = properties {
            for (key, sub) in props {
                if let Some(field) = fields.get(key) {
                    check(sub, field, &child_path(path, key), out);
                }
            }
        }

        if let Some(required) = map.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !fields.contains_key(key) {
                    out.push(Violation::new(
                        path,
                        format!("missing required property `{key}`"),
                    ));
                }
            }
        }

        match map.get("additionalProperties") {
            Some(Value::Bool(false)) => {
                for key in fields.keys() {
                    if properties.is_none_or(|props| !props.contains_key(key)) {
                        out.push(Violation::new(
                            path,
                            format!("additional property `{key}` is not allowed"),
                        ));
                    }
                }
            }
            Some(extra_schema @ Value::Object(_)) => {
                for (key, field) in fields {
                    if properties.is_none_or(|props| !props.contains_key(key)) {
                        check(extra_schema, field, &child_path(path, key), out);
                    }
                }
            }
            _ => {}
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, map.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item_schema, item, &child_path(path, &i.to_string()), out);
        }
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path == "/" {
        format!("/{key}")
    } else {
        format!("{path}/{key}")
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        _ => false,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
