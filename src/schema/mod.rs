//! SchemaCompiler (C1) — compiles a declarative type description into a
//! validator, cached by the content hash of its canonical form.
//!
//! Mirrors the shape of the teacher's `capabilities/capability.rs::ToolArgSchema`
//! (object/array/string/enum/number with minLength/maxLength/enum/items), but
//! generalized to a recursive schema tree rooted at object/array/primitive/enum.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Issue;

/// A declarative schema node as authored in agent YAML under `schema.input`
/// or `schema.output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SchemaNode {
    #[serde(rename = "object")]
    Object {
        #[serde(default)]
        properties: HashMap<String, SchemaNode>,
        #[serde(default)]
        required: Vec<String>,
        /// Excess keys rejected unless explicitly set `true`.
        #[serde(default)]
        additional_properties: bool,
    },
    #[serde(rename = "array")]
    Array {
        items: Box<SchemaNode>,
        #[serde(default)]
        min_items: Option<usize>,
        #[serde(default)]
        max_items: Option<usize>,
    },
    #[serde(rename = "string")]
    String {
        #[serde(default)]
        min_length: Option<usize>,
        #[serde(default)]
        max_length: Option<usize>,
        #[serde(default)]
        r#enum: Option<Vec<String>>,
    },
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "enum")]
    Enum { values: Vec<Value> },
    #[serde(rename = "any")]
    Any,
    #[serde(rename = "unknown")]
    Unknown,
}

/// Fatal, load-time-only compilation failures: unknown `type`, missing
/// `items` on an array node, or a malformed enum (non-scalar literal, or
/// mixing literal kinds in a way the spec forbids).
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("malformed enum at {path}: {reason}")]
    MalformedEnum { path: String, reason: String },
    #[error("array node at {path} is missing `items`")]
    MissingItems { path: String },
}

/// A compiled validator. Cheap to clone (wraps an `Arc`d tree).
#[derive(Debug, Clone)]
pub struct Validator {
    root: Arc<SchemaNode>,
}

impl Validator {
    /// Validate `value` against this validator, returning every offending
    /// path on failure rather than stopping at the first one.
    pub fn validate(&self, value: &Value) -> Result<(), Vec<Issue>> {
        let mut issues = Vec::new();
        validate_node(&self.root, value, "$", &mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

fn validate_node(node: &SchemaNode, value: &Value, path: &str, issues: &mut Vec<Issue>) {
    match node {
        SchemaNode::Any | SchemaNode::Unknown => {}
        SchemaNode::Object {
            properties,
            required,
            additional_properties,
        } => {
            let Value::Object(map) = value else {
                issues.push(Issue::new(path, "expected object"));
                return;
            };
            for key in required {
                if !map.contains_key(key) {
                    issues.push(Issue::new(format!("{path}.{key}"), "required property missing"));
                }
            }
            for (key, v) in map {
                match properties.get(key) {
                    Some(child) => validate_node(child, v, &format!("{path}.{key}"), issues),
                    None if *additional_properties => {}
                    None => issues.push(Issue::new(
                        format!("{path}.{key}"),
                        "unexpected property (additionalProperties = false)",
                    )),
                }
            }
        }
        SchemaNode::Array {
            items,
            min_items,
            max_items,
        } => {
            let Value::Array(arr) = value else {
                issues.push(Issue::new(path, "expected array"));
                return;
            };
            if let Some(min) = min_items {
                if arr.len() < *min {
                    issues.push(Issue::new(path, format!("fewer than minItems={min}")));
                }
            }
            if let Some(max) = max_items {
                if arr.len() > *max {
                    issues.push(Issue::new(path, format!("more than maxItems={max}")));
                }
            }
            for (i, v) in arr.iter().enumerate() {
                validate_node(items, v, &format!("{path}[{i}]"), issues);
            }
        }
        SchemaNode::String {
            min_length,
            max_length,
            r#enum,
        } => {
            let Value::String(s) = value else {
                issues.push(Issue::new(path, "expected string"));
                return;
            };
            if let Some(min) = min_length {
                if s.chars().count() < *min {
                    issues.push(Issue::new(path, format!("shorter than minLength={min}")));
                }
            }
            if let Some(max) = max_length {
                if s.chars().count() > *max {
                    issues.push(Issue::new(path, format!("longer than maxLength={max}")));
                }
            }
            if let Some(allowed) = r#enum {
                if !allowed.iter().any(|a| a == s) {
                    issues.push(Issue::new(path, "value not in enum"));
                }
            }
        }
        SchemaNode::Number => {
            if !value.is_number() {
                issues.push(Issue::new(path, "expected number"));
            }
        }
        SchemaNode::Integer => {
            if !value.is_i64() && !value.is_u64() {
                issues.push(Issue::new(path, "expected integer"));
            }
        }
        SchemaNode::Boolean => {
            if !value.is_boolean() {
                issues.push(Issue::new(path, "expected boolean"));
            }
        }
        SchemaNode::Enum { values } => {
            if !values.iter().any(|v| v == value) {
                issues.push(Issue::new(path, "value not in enum"));
            }
        }
    }
}

fn validate_enum_shape(node: &SchemaNode, path: &str) -> Result<(), CompileError> {
    match node {
        SchemaNode::Enum { values } => {
            if values.is_empty() {
                return Err(CompileError::MalformedEnum {
                    path: path.to_string(),
                    reason: "enum must have at least one literal".to_string(),
                });
            }
            for v in values {
                if !(v.is_string() || v.is_number() || v.is_boolean()) {
                    return Err(CompileError::MalformedEnum {
                        path: path.to_string(),
                        reason: "enum literals must be scalar (string|number|bool)".to_string(),
                    });
                }
            }
            Ok(())
        }
        SchemaNode::Object { properties, .. } => {
            for (key, child) in properties {
                validate_enum_shape(child, &format!("{path}.{key}"))?;
            }
            Ok(())
        }
        SchemaNode::Array { items, .. } => validate_enum_shape(items, &format!("{path}[]")),
        _ => Ok(()),
    }
}

/// Compiles declarative schema descriptions into cached `Validator`s.
///
/// Cache key is the SHA-256 of the JSON-canonicalized schema description;
/// the cache is unbounded per process lifetime (inputs are immutable, so
/// invalidation is never needed) but in practice bounded by the number of
/// distinct schemas the Registry has loaded.
#[derive(Debug, Default)]
pub struct SchemaCompiler {
    cache: DashMap<String, Validator>,
}

impl SchemaCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `node`, or return the cached validator if this exact
    /// canonical schema was compiled before.
    pub fn compile(&self, node: &SchemaNode) -> Result<Validator, CompileError> {
        validate_enum_shape(node, "$")?;
        let canonical = canonicalize(node);
        let key = hex::encode(Sha256::digest(canonical.as_bytes()));
        if let Some(existing) = self.cache.get(&key) {
            return Ok(existing.clone());
        }
        let validator = Validator {
            root: Arc::new(node.clone()),
        };
        self.cache.insert(key, validator.clone());
        Ok(validator)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

/// Deterministic canonical-JSON form of a schema node, used only as the
/// cache key's preimage (lexicographic key order, no whitespace).
fn canonicalize(node: &SchemaNode) -> String {
    let value = serde_json::to_value(node).unwrap_or(Value::Null);
    canonical_json(&value)
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap(), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(arr) => {
            let parts: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object_schema() -> SchemaNode {
        let mut properties = HashMap::new();
        properties.insert(
            "a".to_string(),
            SchemaNode::String {
                min_length: Some(1),
                max_length: None,
                r#enum: None,
            },
        );
        SchemaNode::Object {
            properties,
            required: vec!["a".to_string()],
            additional_properties: false,
        }
    }

    #[test]
    fn accepts_valid_value() {
        let compiler = SchemaCompiler::new();
        let v = compiler.compile(&object_schema()).unwrap();
        assert!(v.validate(&json!({"a": "hi"})).is_ok());
    }

    #[test]
    fn rejects_missing_required() {
        let compiler = SchemaCompiler::new();
        let v = compiler.compile(&object_schema()).unwrap();
        let issues = v.validate(&json!({})).unwrap_err();
        assert_eq!(issues[0].path, "$.a");
    }

    #[test]
    fn rejects_excess_keys_by_default() {
        let compiler = SchemaCompiler::new();
        let v = compiler.compile(&object_schema()).unwrap();
        let issues = v.validate(&json!({"a": "hi", "b": 1})).unwrap_err();
        assert!(issues.iter().any(|i| i.path == "$.b"));
    }

    #[test]
    fn caches_by_content_hash() {
        let compiler = SchemaCompiler::new();
        let _ = compiler.compile(&object_schema()).unwrap();
        let _ = compiler.compile(&object_schema()).unwrap();
        assert_eq!(compiler.cached_len(), 1);
    }

    #[test]
    fn malformed_enum_is_fatal_at_compile_time() {
        let compiler = SchemaCompiler::new();
        let node = SchemaNode::Enum { values: vec![] };
        assert!(compiler.compile(&node).is_err());
    }

    #[test]
    fn round_trip_through_canonical_json_is_stable() {
        let compiler = SchemaCompiler::new();
        let v = compiler.compile(&object_schema()).unwrap();
        let value = json!({"a": "hi"});
        let reparsed: Value =
            serde_json::from_str(&serde_json::to_string(&value).unwrap()).unwrap();
        assert_eq!(v.validate(&value).is_ok(), v.validate(&reparsed).is_ok());
    }
}
