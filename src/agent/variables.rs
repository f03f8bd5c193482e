//! Variable declarations and the `VariableStore` (C3's per-execution map).
//!
//! `init_expr` is deliberately **not** a string-interpolation template: it is
//! either a JSON literal or a `$ref` path, evaluated once at the start of a
//! run. This is the re-architected replacement for the source's
//! reflection-like coercion (§9 of the specification this implements).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

use super::resolve_reference;

/// Per-agent variable declaration: `(name, declared_type, init_expr)`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VariableDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
    pub init: String,
}

/// Either a JSON literal or a `$name[.path...]` reference, parsed once from
/// the declared `init` string.
#[derive(Debug, Clone)]
pub enum InitExpr {
    Literal(Value),
    Reference(String),
}

impl InitExpr {
    pub fn parse(init: &str) -> InitExpr {
        let trimmed = init.trim();
        if trimmed.starts_with('$') {
            InitExpr::Reference(trimmed.to_string())
        } else {
            // Literal JSON scalar: string (quoted), number, bool, or null.
            let value = serde_json::from_str(trimmed).unwrap_or(Value::Null);
            InitExpr::Literal(value)
        }
    }
}

/// Maximum serialized size of a single value on initial binding (1 KiB).
pub const MAX_VALUE_BYTES: usize = 1024;

/// Per-execution scoped name-to-value map. Tracks its own footprint against
/// the execution's memory ceiling; every binding is size-checked.
#[derive(Debug, Default, Clone)]
pub struct VariableStore {
    values: HashMap<String, Value>,
    footprint_bytes: u64,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize all declared variables in order, evaluating each
    /// `init_expr` against the variables bound so far and the run's input.
    pub fn initialize(declarations: &[VariableDecl], input: &Value) -> Result<Self, EngineError> {
        let mut store = VariableStore::new();
        for decl in declarations {
            let expr = InitExpr::parse(&decl.init);
            let value = match expr {
                InitExpr::Literal(v) => v,
                InitExpr::Reference(reference) => {
                    resolve_reference(&reference, &store.values, input)?.clone()
                }
            };
            store.bind(&decl.name, value)?;
        }
        Ok(store)
    }

    /// Bind `name` to `value` after checking its serialized size against the
    /// 1 KiB per-value cap.
    pub fn bind(&mut self, name: &str, value: Value) -> Result<(), EngineError> {
        let serialized = serde_json::to_vec(&value).unwrap_or_default();
        if serialized.len() > MAX_VALUE_BYTES {
            return Err(EngineError::MemoryExceeded {
                accounted: serialized.len() as u64,
                ceiling: MAX_VALUE_BYTES as u64,
            });
        }
        if let Some(previous) = self.values.get(name) {
            let previous_len = serde_json::to_vec(previous).unwrap_or_default().len() as u64;
            self.footprint_bytes = self.footprint_bytes.saturating_sub(previous_len);
        }
        self.footprint_bytes += serialized.len() as u64;
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn as_map(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn footprint_bytes(&self) -> u64 {
        self.footprint_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn literal_init_expr_binds_value() {
        let decls = vec![VariableDecl {
            name: "g".to_string(),
            declared_type: "string".to_string(),
            init: "\"hi\"".to_string(),
        }];
        let store = VariableStore::initialize(&decls, &json!({})).unwrap();
        assert_eq!(store.get("g"), Some(&json!("hi")));
    }

    #[test]
    fn reference_init_expr_reads_input() {
        let decls = vec![VariableDecl {
            name: "who".to_string(),
            declared_type: "string".to_string(),
            init: "$input.name".to_string(),
        }];
        let store = VariableStore::initialize(&decls, &json!({"name": "ada"})).unwrap();
        assert_eq!(store.get("who"), Some(&json!("ada")));
    }

    #[test]
    fn oversized_value_fails_to_bind() {
        let mut store = VariableStore::new();
        let big = "x".repeat(MAX_VALUE_BYTES + 1);
        let err = store.bind("v", json!(big)).unwrap_err();
        assert!(matches!(err, EngineError::MemoryExceeded { .. }));
    }
}
