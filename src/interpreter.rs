//! Interpreter (C7) — orchestrates a single agent run: validate input, init
//! variables, execute steps in declaration order, project and validate
//! output. No implicit retries; no partial commits; the first failure
//! aborts the run.

use std::collections::HashMap;

use serde_json::Value;

use crate::agent::variables::VariableStore;
use crate::agent::AgentDefinition;
use crate::error::EngineError;
use crate::execution::ExecutionContext;
use crate::registry::Registry;
use crate::runtime::IsolatedRuntime;
use crate::steps::collaborators::Collaborators;

/// Serialized output above this size fails the run even if every individual
/// variable was under its own cap.
pub const MAX_OUTPUT_BYTES: usize = 5 * 1024 * 1024;

pub const MAX_SUB_AGENT_DEPTH: u8 = 8;

pub struct Interpreter<'a> {
    pub registry: &'a Registry,
    pub runtime: &'a IsolatedRuntime,
    pub collaborators: &'a Collaborators,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        registry: &'a Registry,
        runtime: &'a IsolatedRuntime,
        collaborators: &'a Collaborators,
    ) -> Self {
        Self {
            registry,
            runtime,
            collaborators,
        }
    }

    pub async fn run(
        &self,
        agent: &AgentDefinition,
        input: Value,
        props: &HashMap<String, String>,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, EngineError> {
        agent.input_schema.validate(&input).map_err(|issues| {
            EngineError::SchemaViolation {
                side: crate::error::SchemaSide::Input,
                issues,
            }
        })?;

        for name in &agent.required_props {
            match props.get(name) {
                Some(v) if !v.is_empty() => {}
                _ => {
                    return Err(EngineError::MissingProps {
                        name: name.clone(),
                    })
                }
            }
        }

        let mut variables = VariableStore::initialize(&agent.variables, &input)?;

        if ctx.sub_agent_depth > MAX_SUB_AGENT_DEPTH {
            return Err(EngineError::NestingExceeded {
                limit: MAX_SUB_AGENT_DEPTH,
            });
        }

        let mut last_was_output_project = false;
        let mut output = Value::Object(serde_json::Map::new());

        for step in &agent.workflow {
            ctx.log(format!("step {:?}: planned", step.name));
            last_was_output_project = step.action.is_output_project();

            let result = crate::steps::execute_step(
                &step.action,
                &mut variables,
                &input,
                ctx,
                self.collaborators,
                self.registry,
                self.runtime,
            )
            .await?;

            if step.action.is_output_project() {
                output = result;
            } else if let Some(name) = step.action.result_name() {
                variables.bind(name, result)?;
            }
            ctx.sync_memory_footprint(variables.footprint_bytes())?;
            ctx.log(format!("step {:?}: done", step.name));
        }

        // Compatibility behavior (§9 open question): if the final step was
        // not output-project, the result is an empty object rather than an
        // error. Hosts are recommended to reject such agents at load time.
        if !last_was_output_project {
            output = Value::Object(serde_json::Map::new());
        }

        agent.output_schema.validate(&output).map_err(|issues| {
            EngineError::SchemaViolation {
                side: crate::error::SchemaSide::Output,
                issues,
            }
        })?;

        let serialized_len = serde_json::to_vec(&output).unwrap_or_default().len();
        if serialized_len > MAX_OUTPUT_BYTES {
            return Err(EngineError::MemoryExceeded {
                accounted: serialized_len as u64,
                ceiling: MAX_OUTPUT_BYTES as u64,
            });
        }

        ctx.mark_success(output.clone());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaCompiler;
    use crate::security_profile::ULTRA_SECURE;
    use crate::steps::test_support::stub_collaborators;
    use serde_json::json;

    fn interp<'a>(
        registry: &'a Registry,
        runtime: &'a IsolatedRuntime,
        collaborators: &'a Collaborators,
    ) -> Interpreter<'a> {
        Interpreter::new(registry, runtime, collaborators)
    }

    #[tokio::test]
    async fn trivial_projection_scenario() {
        let compiler = SchemaCompiler::new();
        let yaml = r#"
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
"#;
        let agent = AgentDefinition::from_yaml(yaml, &compiler).unwrap();
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let collaborators = stub_collaborators();
        let interpreter = interp(&registry, &runtime, &collaborators);
        let mut ctx = ExecutionContext::new("tenant-a", ULTRA_SECURE);
        let out = interpreter
            .run(&agent, json!({}), &HashMap::new(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out, json!({"greeting": "hi"}));
    }

    #[tokio::test]
    async fn invalid_reference_surfaces_variable_ref_error() {
        let compiler = SchemaCompiler::new();
        let yaml = r#"
agent:
  id: "broken"
  version: "1.0.0"
  protocol: "agent-engine/v1"
metadata:
  name: "Broken"
  description: "Missing ref"
  category: "demo"
schema:
  input:
    type: object
    properties: {}
    required: []
  output:
    type: object
    properties: {}
    required: []
logic:
  workflow:
    - name: "project"
      action:
        type: "output-project"
        output:
          x: "$missing"
"#;
        let agent = AgentDefinition::from_yaml(yaml, &compiler).unwrap();
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let collaborators = stub_collaborators();
        let interpreter = interp(&registry, &runtime, &collaborators);
        let mut ctx = ExecutionContext::new("tenant-a", ULTRA_SECURE);
        let err = interpreter
            .run(&agent, json!({}), &HashMap::new(), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::VariableRefError { .. }));
    }

    #[tokio::test]
    async fn output_schema_rejection_scenario() {
        let compiler = SchemaCompiler::new();
        let yaml = r#"
agent:
  id: "incomplete"
  version: "1.0.0"
  protocol: "agent-engine/v1"
metadata:
  name: "Incomplete"
  description: "Emits nothing"
  category: "demo"
schema:
  input:
    type: object
    properties: {}
    required: []
  output:
    type: object
    properties:
      a: { type: string }
    required: ["a"]
logic:
  workflow:
    - name: "project"
      action:
        type: "output-project"
        output: {}
"#;
        let agent = AgentDefinition::from_yaml(yaml, &compiler).unwrap();
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let collaborators = stub_collaborators();
        let interpreter = interp(&registry, &runtime, &collaborators);
        let mut ctx = ExecutionContext::new("tenant-a", ULTRA_SECURE);
        let err = interpreter
            .run(&agent, json!({}), &HashMap::new(), &mut ctx)
            .await
            .unwrap_err();
        match err {
            EngineError::SchemaViolation { side, issues } => {
                assert_eq!(side, crate::error::SchemaSide::Output);
                assert!(issues.iter().any(|i| i.path.ends_with(".a")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn per_step_memory_ceiling_is_actually_enforced() {
        let compiler = SchemaCompiler::new();
        let yaml = r#"
agent:
  id: "hungry"
  version: "1.0.0"
  protocol: "agent-engine/v1"
metadata:
  name: "Hungry"
  description: "Binds a variable that blows the ceiling"
  category: "demo"
schema:
  input:
    type: object
    properties: {}
    required: []
  output:
    type: object
    properties:
      text: { type: string }
    required: ["text"]
logic:
  workflow:
    - name: "generate"
      action:
        type: "text-gen"
        prompt: "hi"
        result: "g"
    - name: "project"
      action:
        type: "output-project"
        output:
          text: "$g.text"
"#;
        let agent = AgentDefinition::from_yaml(yaml, &compiler).unwrap();
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let collaborators = stub_collaborators();
        let interpreter = interp(&registry, &runtime, &collaborators);
        let mut profile = crate::security_profile::HIGH_SECURITY;
        profile.memory_ceiling_bytes = 8; // smaller than the stub's generated text
        let mut ctx = ExecutionContext::new("tenant-a", profile);
        let err = interpreter
            .run(&agent, json!({}), &HashMap::new(), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MemoryExceeded { .. }));
    }
}
