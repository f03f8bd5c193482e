//! AgentDefinition (C3) — typed, validated, immutable in-memory
//! representation of an agent loaded from YAML.
//!
//! Grounded in the teacher's `modules/module_def.rs` / `capabilities/capability.rs`
//! pattern of a `from_yaml`/`from_yaml_file` constructor over a `#[derive(Deserialize)]`
//! tree, generalized from their single-wrapper-key documents (`module:`,
//! `capability:`) to the four-section document this engine's external
//! interface names: `agent`, `metadata`, `schema`, `logic`.

pub mod step;
pub mod variables;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::schema::{SchemaCompiler, SchemaNode, Validator};
use crate::yaml_loader::YamlLoader;

pub use step::{Step, StepAction};
pub use variables::{InitExpr, VariableDecl};

/// The only protocol tag the loader accepts. Anything else is rejected at
/// load time, never at run time.
pub const PROTOCOL_TAG: &str = "agent-engine/v1";

/// Raw deserialized shape of an agent YAML document, before schema
/// compilation and protocol-tag enforcement.
#[derive(Debug, Deserialize)]
struct AgentDoc {
    agent: AgentHeader,
    metadata: AgentMetadata,
    schema: AgentSchemaDoc,
    logic: AgentLogicDoc,
}

#[derive(Debug, Deserialize)]
struct AgentHeader {
    id: String,
    version: String,
    protocol: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentMetadata {
    pub name: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub route: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AgentSchemaDoc {
    input: SchemaNode,
    output: SchemaNode,
    #[serde(default)]
    required_props: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AgentLogicDoc {
    #[serde(default)]
    variables: Vec<VariableDecl>,
    workflow: Vec<Step>,
}

/// Immutable, fully validated in-memory agent.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub id: String,
    pub version: String,
    pub protocol_tag: String,
    pub metadata: AgentMetadata,
    pub input_schema: Validator,
    pub output_schema: Validator,
    pub required_props: Vec<String>,
    pub variables: Vec<VariableDecl>,
    pub workflow: Vec<Step>,
    pub yaml_fingerprint: [u8; 32],
}

pub const MAX_WORKFLOW_STEPS: usize = 100;

impl AgentDefinition {
    /// Parse, security-gate, and schema-compile an agent from raw YAML
    /// source. Fatal at load time: protocol mismatch, unknown step kinds,
    /// malformed schemas, oversized/insecure YAML, or an empty workflow.
    pub fn from_yaml(source: &str, compiler: &SchemaCompiler) -> Result<Self, EngineError> {
        let loaded = YamlLoader::load(source)?;

        if let Some(kind) = find_unknown_step_kind(&loaded.value) {
            return Err(EngineError::UnknownStep { kind });
        }

        let doc: AgentDoc = serde_yaml::from_value(loaded.value)
            .map_err(|e| EngineError::YamlSecurityError {
                reason: format!("agent document shape: {e}"),
            })?;

        if doc.agent.protocol != PROTOCOL_TAG {
            return Err(EngineError::YamlSecurityError {
                reason: format!(
                    "protocol tag {:?} does not match pinned value {:?}",
                    doc.agent.protocol, PROTOCOL_TAG
                ),
            });
        }

        if doc.logic.workflow.is_empty() {
            return Err(EngineError::Internal(
                "workflow must be non-empty".to_string(),
            ));
        }
        if doc.logic.workflow.len() > MAX_WORKFLOW_STEPS {
            return Err(EngineError::Internal(format!(
                "workflow length {} exceeds {MAX_WORKFLOW_STEPS}",
                doc.logic.workflow.len()
            )));
        }

        let input_schema = compiler
            .compile(&doc.schema.input)
            .map_err(|e| EngineError::Internal(format!("input schema: {e}")))?;
        let output_schema = compiler
            .compile(&doc.schema.output)
            .map_err(|e| EngineError::Internal(format!("output schema: {e}")))?;

        Ok(AgentDefinition {
            id: doc.agent.id,
            version: doc.agent.version,
            protocol_tag: doc.agent.protocol,
            metadata: doc.metadata,
            input_schema,
            output_schema,
            required_props: doc.schema.required_props,
            variables: doc.logic.variables,
            workflow: doc.logic.workflow,
            yaml_fingerprint: loaded.fingerprint,
        })
    }

    pub fn yaml_fingerprint_hex(&self) -> String {
        hex::encode(self.yaml_fingerprint)
    }
}

/// Look up `value[key]` in a YAML mapping, or `None` if `value` is not a
/// mapping or the key is absent.
fn yaml_field<'a>(value: &'a serde_yaml::Value, key: &str) -> Option<&'a serde_yaml::Value> {
    match value {
        serde_yaml::Value::Mapping(map) => {
            map.iter().find_map(|(k, v)| (k.as_str() == Some(key)).then_some(v))
        }
        _ => None,
    }
}

/// Walk `logic.workflow[].action.type` and return the first tag outside
/// `step::KNOWN_STEP_KINDS`, so it can be reported as `UnknownStep` before
/// the full typed parse (which would otherwise collapse it into a generic
/// `YamlSecurityError` shape failure). Returns `None` if the document's
/// shape doesn't match closely enough to check (the typed parse below
/// reports that failure instead).
fn find_unknown_step_kind(doc: &serde_yaml::Value) -> Option<String> {
    let workflow = yaml_field(yaml_field(doc, "logic")?, "workflow")?;
    let serde_yaml::Value::Sequence(steps) = workflow else {
        return None;
    };
    for step in steps {
        let kind = yaml_field(yaml_field(step, "action")?, "type")?.as_str()?;
        if !step::KNOWN_STEP_KINDS.contains(&kind) {
            return Some(kind.to_string());
        }
    }
    None
}

/// Resolve a `$name[.path...]` reference (or `input.path...`) against a
/// variable/input lookup table. Tokenizes on `.`; the first segment selects
/// the root, subsequent segments index object keys or list indices.
pub fn resolve_reference<'a>(
    reference: &str,
    variables: &'a HashMap<String, Value>,
    input: &'a Value,
) -> Result<&'a Value, EngineError> {
    let path = reference.strip_prefix('$').unwrap_or(reference);
    let mut segments = path.split('.');
    let root = segments.next().ok_or_else(|| EngineError::VariableRefError {
        path: reference.to_string(),
    })?;

    let mut current: &Value = if root == "input" {
        input
    } else {
        variables.get(root).ok_or_else(|| EngineError::VariableRefError {
            path: reference.to_string(),
        })?
    };

    for segment in segments {
        current = navigate(current, segment).ok_or_else(|| EngineError::VariableRefError {
            path: reference.to_string(),
        })?;
    }
    Ok(current)
}

fn navigate<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(arr) => segment.parse::<usize>().ok().and_then(|i| arr.get(i)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_yaml() -> String {
        r#"
agent:
  id: "greeter"
  version: "1.0.0"
  protocol: "agent-engine/v1"
metadata:
  name: "Greeter"
  description: "Says hi"
  category: "demo"
schema:
  input:
    type: object
    properties: {}
    required: []
  output:
    type: object
    properties:
      greeting: { type: string }
    required: ["greeting"]
logic:
  variables:
    - name: "g"
      type: "string"
      init: "\"hi\""
  workflow:
    - name: "project"
      action:
        type: "output-project"
        output:
          greeting: "$g"
"#
        .to_string()
    }

    #[test]
    fn loads_minimal_agent() {
        let compiler = SchemaCompiler::new();
        let agent = AgentDefinition::from_yaml(&minimal_yaml(), &compiler).unwrap();
        assert_eq!(agent.id, "greeter");
        assert_eq!(agent.workflow.len(), 1);
    }

    #[test]
    fn rejects_wrong_protocol_tag() {
        let bad = minimal_yaml().replace("agent-engine/v1", "something-else");
        let compiler = SchemaCompiler::new();
        assert!(AgentDefinition::from_yaml(&bad, &compiler).is_err());
    }

    #[test]
    fn unrecognized_step_type_fails_load_with_unknown_step() {
        let bad = minimal_yaml().replace(r#"type: "output-project""#, r#"type: "string-gen""#);
        let compiler = SchemaCompiler::new();
        let err = AgentDefinition::from_yaml(&bad, &compiler).unwrap_err();
        match err {
            EngineError::UnknownStep { kind } => assert_eq!(kind, "string-gen"),
            other => panic!("expected UnknownStep, got {other:?}"),
        }
    }

    #[test]
    fn resolves_nested_reference() {
        let mut vars = HashMap::new();
        vars.insert("u".to_string(), json!({"name": "ada", "role": "eng"}));
        let input = json!({});
        let who = resolve_reference("$u.name", &vars, &input).unwrap();
        assert_eq!(who, &json!("ada"));
    }

    #[test]
    fn missing_reference_is_an_error() {
        let vars = HashMap::new();
        let input = json!({});
        assert!(resolve_reference("$missing", &vars, &input).is_err());
    }
}
