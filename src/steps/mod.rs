//! StepExecutor (C6) — one executor per closed step kind, each bound to the
//! capabilities it needs. There is no dynamic dispatch outside the
//! `StepAction` enumeration: the `match` below is exhaustive over every
//! variant, so adding a twelfth kind is a compile-time event, not a runtime
//! string lookup.

pub mod collaborators;
mod template;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::agent::step::{EmbedAction, HistoryTurn, VectorStoreAction};
use crate::agent::variables::VariableStore;
use crate::agent::{resolve_reference, StepAction};
use crate::error::EngineError;
use crate::execution::ExecutionContext;
use crate::registry::Registry;
use crate::runtime::IsolatedRuntime;
use crate::security_profile::{has_capability, capability_name, CapabilityMask, CAP_NET_AI, CAP_NET_REMOTE_TOOL, CAP_NET_VECTOR};

use collaborators::Collaborators;
use template::render;

const MCP_INNER_DEADLINE_SECS: u64 = 30;
const DOC_FETCH_CHUNK_CHARS: usize = 800;

static RESOLUTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+x\d+$").unwrap());

/// Deny a required capability the execution context's profile does not
/// grant, without touching the worker pool at all.
fn require_cap(ctx: &ExecutionContext, required: CapabilityMask) -> Result<(), EngineError> {
    if has_capability(ctx.capabilities, required) {
        Ok(())
    } else {
        Err(EngineError::CapabilityDenied {
            capability: capability_name(required).to_string(),
        })
    }
}

/// Resolve a field value that may itself be a `$ref` string, falling back to
/// the literal if it does not start with `$`.
fn resolve_field(raw: &str, variables: &VariableStore, input: &Value) -> Result<Value, EngineError> {
    if raw.starts_with('$') {
        resolve_reference(raw, variables.as_map(), input).cloned()
    } else {
        Ok(Value::String(raw.to_string()))
    }
}

fn resolve_optional_field(
    raw: &Option<String>,
    variables: &VariableStore,
    input: &Value,
) -> Result<Option<Value>, EngineError> {
    match raw {
        Some(s) => resolve_field(s, variables, input).map(Some),
        None => Ok(None),
    }
}

pub async fn execute_step(
    action: &StepAction,
    variables: &mut VariableStore,
    input: &Value,
    ctx: &mut ExecutionContext,
    collaborators: &Collaborators,
    registry: &Registry,
    runtime: &IsolatedRuntime,
) -> Result<Value, EngineError> {
    if ctx.is_past_deadline() {
        return Err(EngineError::Timeout);
    }

    match action {
        StepAction::OutputProject { output } => {
            let mut emitted = serde_json::Map::new();
            for (key, raw) in output {
                let value = match raw {
                    Value::String(s) if s.starts_with('$') => {
                        resolve_reference(s, variables.as_map(), input)?.clone()
                    }
                    other => other.clone(),
                };
                emitted.insert(key.clone(), value);
            }
            Ok(Value::Object(emitted))
        }

        StepAction::TextGen {
            prompt,
            temperature,
            max_tokens,
            ..
        } => {
            require_cap(ctx, CAP_NET_AI)?;
            let result = collaborators
                .model
                .generate_text(prompt, *temperature, *max_tokens)
                .await?;
            Ok(json!({
                "text": result.text,
                "metadata": {
                    "model": "host-provided",
                    "elapsed_ms": result.elapsed_ms,
                    "temperature": temperature,
                    "max_tokens": max_tokens,
                    "prompt": prompt,
                }
            }))
        }

        StepAction::Translation { text, src, dst, .. } => {
            let text = resolve_optional_field(text, variables, input)?
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| EngineError::VariableRefError {
                    path: "text".to_string(),
                })?;
            let src = resolve_optional_field(src, variables, input)?
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| EngineError::VariableRefError {
                    path: "src".to_string(),
                })?;
            let dst = resolve_optional_field(dst, variables, input)?
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| EngineError::VariableRefError {
                    path: "dst".to_string(),
                })?;

            if src == dst {
                return Ok(json!({
                    "text": text,
                    "metadata": { "bypass": true, "src": src, "dst": dst }
                }));
            }

            require_cap(ctx, CAP_NET_AI)?;
            let mut vars = HashMap::new();
            vars.insert("text", text.as_str());
            vars.insert("src", src.as_str());
            vars.insert("dst", dst.as_str());
            let prompt = render(
                "Translate the following text from {{src}} to {{dst}}:\n{{text}}",
                &vars,
            );
            let result = collaborators.model.generate_text(&prompt, 0.2, None).await?;
            Ok(json!({
                "text": result.text,
                "supported_languages": ["en", "pt", "es", "fr", "de"],
                "metadata": { "bypass": false, "src": src, "dst": dst, "elapsed_ms": result.elapsed_ms }
            }))
        }

        StepAction::ImageGen {
            description,
            style,
            resolution,
            ..
        } => {
            require_cap(ctx, CAP_NET_AI)?;
            let description = resolve_field(description, variables, input)?
                .as_str()
                .unwrap_or(description)
                .to_string();
            let resolution = resolve_field(resolution, variables, input)?
                .as_str()
                .unwrap_or(resolution)
                .to_string();
            if !RESOLUTION_RE.is_match(&resolution) {
                return Err(EngineError::VariableRefError {
                    path: format!("resolution {resolution:?} does not match \\d+x\\d+"),
                });
            }
            let style_str = match style {
                Some(s) => resolve_field(s, variables, input)?
                    .as_str()
                    .unwrap_or(s)
                    .to_string(),
                None => String::new(),
            };
            let mut vars = HashMap::new();
            vars.insert("description", description.as_str());
            vars.insert("style", style_str.as_str());
            let prompt_used = render("{{description}}, style: {{style}}", &vars);
            let result = collaborators
                .model
                .generate_image(&prompt_used, &resolution)
                .await?;
            Ok(json!({
                "image_url": format!("data:{};base64,{}", result.media_type, result.base64),
                "image_base64": result.base64,
                "media_type": result.media_type,
                "prompt_used": prompt_used,
                "metadata": { "resolution": resolution, "elapsed_ms": result.elapsed_ms }
            }))
        }

        StepAction::McpTool {
            server_url,
            tool_name,
            tool_arguments,
            ..
        } => {
            require_cap(ctx, CAP_NET_REMOTE_TOOL)?;
            run_mcp_tool(server_url, tool_name, tool_arguments, collaborators).await
        }

        StepAction::Embed {
            action: embed_action,
            text,
            texts,
            ..
        } => {
            require_cap(ctx, CAP_NET_AI)?;
            match embed_action {
                EmbedAction::EmbedSingle => {
                    let text = text.clone().ok_or_else(|| EngineError::VariableRefError {
                        path: "text".to_string(),
                    })?;
                    let vector = collaborators.model.embed(&text).await?;
                    Ok(json!({ "success": true, "vector": vector }))
                }
                EmbedAction::EmbedBatch => {
                    let texts = texts.clone().ok_or_else(|| EngineError::VariableRefError {
                        path: "texts".to_string(),
                    })?;
                    let vectors = collaborators.model.embed_many(&texts).await?;
                    Ok(json!({ "success": true, "vectors": vectors }))
                }
            }
        }

        StepAction::VectorStore {
            action: vs_action,
            collection_name,
            min_count,
            ids,
            embeddings,
            documents,
            metadatas,
            query_embedding,
            top_k,
            ..
        } => {
            require_cap(ctx, CAP_NET_VECTOR)?;
            collaborators
                .vector_store
                .get_or_create_collection(collection_name)
                .await?;
            match vs_action {
                VectorStoreAction::HasData => {
                    let count = collaborators.vector_store.count(collection_name).await?;
                    let threshold = min_count.unwrap_or(1);
                    Ok(json!({ "has_data": count >= threshold, "count": count }))
                }
                VectorStoreAction::Store => {
                    let stored = collaborators
                        .vector_store
                        .add(
                            collection_name,
                            ids.clone().unwrap_or_default(),
                            embeddings.clone().unwrap_or_default(),
                            documents.clone().unwrap_or_default(),
                            metadatas.clone().unwrap_or_default(),
                        )
                        .await?;
                    Ok(json!({ "stored_count": stored }))
                }
                VectorStoreAction::Search => {
                    let embedding = query_embedding.clone().ok_or_else(|| EngineError::VariableRefError {
                        path: "query_embedding".to_string(),
                    })?;
                    let k = top_k.unwrap_or(5);
                    let result = collaborators
                        .vector_store
                        .query(collection_name, embedding, k)
                        .await?;
                    let results: Vec<Value> = result
                        .documents
                        .iter()
                        .zip(result.metadatas.iter())
                        .zip(result.distances.iter())
                        .map(|((text, metadata), distance)| {
                            json!({ "text": text, "metadata": metadata, "distance": distance })
                        })
                        .collect();
                    Ok(json!({ "results": results, "documents": result.documents.join("\n") }))
                }
            }
        }

        StepAction::DocFetch { server_url, .. } => {
            require_cap(ctx, CAP_NET_REMOTE_TOOL)?;
            collaborators.tool_client.connect(server_url).await?;
            let tools = collaborators.tool_client.list_tools().await?;
            let chosen = tools
                .iter()
                .find(|t| {
                    let n = t.name.to_lowercase();
                    n.contains("doc") || n.contains("search") || n.contains("read")
                })
                .or_else(|| tools.first())
                .ok_or_else(|| EngineError::ProviderError {
                    upstream: "no documentation-capable tool advertised".to_string(),
                })?
                .name
                .clone();
            let segments = collaborators
                .tool_client
                .call(
                    &chosen,
                    &json!({}),
                    std::time::Duration::from_secs(MCP_INNER_DEADLINE_SECS),
                )
                .await;
            collaborators.tool_client.close().await?;
            let segments = segments?;
            let joined = segments.join("\n\n");
            let chunks = split_paragraphs(&joined, DOC_FETCH_CHUNK_CHARS);
            Ok(json!({ "chunks": chunks, "source": chosen }))
        }

        StepAction::Rag {
            query,
            context,
            history,
            ..
        } => {
            require_cap(ctx, CAP_NET_AI)?;
            let query = resolve_field(query, variables, input)?
                .as_str()
                .unwrap_or(query)
                .to_string();
            let context = resolve_field(context, variables, input)?
                .as_str()
                .unwrap_or(context)
                .to_string();
            let history_text = render_history(history);
            let mut vars = HashMap::new();
            vars.insert("history", history_text.as_str());
            vars.insert("context", context.as_str());
            vars.insert("query", query.as_str());
            let prompt = render(
                "History:\n{{history}}\n\nContext:\n{{context}}\n\nQuestion: {{query}}",
                &vars,
            );
            let result = collaborators.model.generate_text(&prompt, 0.3, None).await?;
            Ok(json!({
                "response": result.text,
                "answer": result.text,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }))
        }

        StepAction::SubAgent {
            agent: agent_name,
            input: override_input,
            props: override_props,
            ..
        } => {
            if ctx.sub_agent_depth + 1 > crate::interpreter::MAX_SUB_AGENT_DEPTH {
                return Err(EngineError::NestingExceeded {
                    limit: crate::interpreter::MAX_SUB_AGENT_DEPTH,
                });
            }
            let sub_def = registry.get(agent_name).ok_or_else(|| EngineError::Internal(
                format!("sub-agent {agent_name:?} is not registered"),
            ))?;
            let sub_input = override_input.clone().unwrap_or_else(|| input.clone());
            let sub_props: HashMap<String, String> = override_props
                .as_ref()
                .and_then(|v| v.as_object())
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            let mut child_ctx = ctx.child_for_sub_agent();
            let collaborators = collaborators.clone();
            let interpreter = crate::interpreter::Interpreter::new(registry, runtime, &collaborators);
            let out = interpreter
                .run(&sub_def, sub_input, &sub_props, &mut child_ctx)
                .await?;
            ctx.memory_accounted = child_ctx.memory_accounted;
            Ok(out)
        }

        StepAction::CustomAction { function, args, .. } => {
            let capability = collaborators.custom_functions.capability_for(function)?;
            require_cap(ctx, capability)?;
            if !ctx.module_allowed(function) {
                return Err(EngineError::CapabilityDenied {
                    capability: format!("custom-action:{function}"),
                });
            }
            collaborators
                .custom_functions
                .call(function, input, variables.as_map(), args, ctx)
        }
    }
}

async fn run_mcp_tool(
    server_url: &str,
    tool_name: &str,
    tool_arguments: &HashMap<String, Value>,
    collaborators: &Collaborators,
) -> Result<Value, EngineError> {
    collaborators.tool_client.connect(server_url).await?;
    let tools = collaborators.tool_client.list_tools().await;
    let tools = match tools {
        Ok(t) => t,
        Err(e) => {
            let _ = collaborators.tool_client.close().await;
            return Err(e);
        }
    };

    if tool_name == "list_tools" {
        let names: Vec<String> = tools.iter().map(|t| t.name.clone()).collect();
        collaborators.tool_client.close().await?;
        return Ok(json!({ "success": true, "data": tools.iter().map(|t| json!({"name": t.name, "description": t.description})).collect::<Vec<_>>(), "tool_names": names }));
    }

    if !tools.iter().any(|t| t.name == tool_name) {
        let _ = collaborators.tool_client.close().await;
        return Ok(json!({ "success": false, "error": format!("tool {tool_name:?} not found") }));
    }

    let args = Value::Object(tool_arguments.clone().into_iter().collect());
    let call_result = collaborators
        .tool_client
        .call(
            tool_name,
            &args,
            std::time::Duration::from_secs(MCP_INNER_DEADLINE_SECS),
        )
        .await;
    let _ = collaborators.tool_client.close().await;

    let segments = call_result?;
    Ok(json!({ "success": true, "data": segments.join("") }))
}

fn render_history(history: &[HistoryTurn]) -> String {
    history
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Paragraph-preserving split into chunks of at most `max_chars`.
fn split_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for paragraph in text.split("\n\n") {
        if current.len() + paragraph.len() + 2 > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
        while current.len() > max_chars {
            let split_at = current
                .char_indices()
                .take_while(|(i, _)| *i < max_chars)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(current.len());
            chunks.push(current[..split_at].to_string());
            current = current[split_at..].to_string();
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// In-process stand-ins for the host-implemented collaborator traits.
/// Exercised by the crate's own tests and by the `agent-engine` binary,
/// which has no real model/vector-store/tool-server to wire up.
pub mod test_support {
    use super::collaborators::*;
    use crate::error::EngineError;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    pub struct StubModelProvider;

    #[async_trait]
    impl ModelProvider for StubModelProvider {
        async fn generate_text(
            &self,
            prompt: &str,
            _temperature: f64,
            _max_tokens: Option<u32>,
        ) -> Result<TextGenResult, EngineError> {
            Ok(TextGenResult {
                text: format!("stub-response-to: {prompt}"),
                elapsed_ms: 1,
            })
        }
        async fn generate_image(&self, _prompt: &str, _size: &str) -> Result<ImageGenResult, EngineError> {
            Ok(ImageGenResult {
                base64: "stub".to_string(),
                media_type: "image/png".to_string(),
                elapsed_ms: 1,
            })
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EngineError> {
            Ok(vec![0.0, 1.0])
        }
        async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
            Ok(texts.iter().map(|_| vec![0.0, 1.0]).collect())
        }
    }

    pub struct StubVectorStore;

    #[async_trait]
    impl VectorStoreProvider for StubVectorStore {
        async fn get_or_create_collection(&self, _name: &str) -> Result<(), EngineError> {
            Ok(())
        }
        async fn count(&self, _collection: &str) -> Result<u64, EngineError> {
            Ok(0)
        }
        async fn add(
            &self,
            _collection: &str,
            ids: Vec<String>,
            _embeddings: Vec<Vec<f32>>,
            _documents: Vec<String>,
            _metadatas: Vec<Value>,
        ) -> Result<usize, EngineError> {
            Ok(ids.len())
        }
        async fn query(
            &self,
            _collection: &str,
            _embedding: Vec<f32>,
            _k: usize,
        ) -> Result<VectorQueryResult, EngineError> {
            Ok(VectorQueryResult {
                documents: vec![],
                metadatas: vec![],
                distances: vec![],
            })
        }
    }

    pub struct StubToolClient;

    #[async_trait]
    impl ToolClient for StubToolClient {
        async fn connect(&self, _url: &str) -> Result<(), EngineError> {
            Ok(())
        }
        async fn list_tools(&self) -> Result<Vec<ToolDesc>, EngineError> {
            Ok(vec![])
        }
        async fn call(
            &self,
            _name: &str,
            _args: &Value,
            _deadline: std::time::Duration,
        ) -> Result<Vec<String>, EngineError> {
            Ok(vec![])
        }
        async fn close(&self) -> Result<(), EngineError> {
            Ok(())
        }
    }

    pub fn stub_collaborators() -> Collaborators {
        Collaborators {
            model: Arc::new(StubModelProvider),
            vector_store: Arc::new(StubVectorStore),
            tool_client: Arc::new(StubToolClient),
            custom_functions: Arc::new(CustomFunctions::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::stub_collaborators;
    use super::*;
    use crate::security_profile::ULTRA_SECURE;
    use serde_json::json;

    #[tokio::test]
    async fn output_project_resolves_literal_and_reference() {
        let mut variables = VariableStore::new();
        variables.bind("g", json!("hi")).unwrap();
        let mut output = HashMap::new();
        output.insert("greeting".to_string(), json!("$g"));
        output.insert("fixed".to_string(), json!(1));
        let action = StepAction::OutputProject { output };
        let mut ctx = ExecutionContext::new("tenant-a", ULTRA_SECURE);
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let collaborators = stub_collaborators();
        let result = execute_step(
            &action,
            &mut variables,
            &json!({}),
            &mut ctx,
            &collaborators,
            &registry,
            &runtime,
        )
        .await
        .unwrap();
        assert_eq!(result, json!({"greeting": "hi", "fixed": 1}));
    }

    #[tokio::test]
    async fn text_gen_denied_without_capability() {
        let mut variables = VariableStore::new();
        let action = StepAction::TextGen {
            prompt: "hi".to_string(),
            temperature: 0.7,
            max_tokens: None,
            result: None,
        };
        let mut ctx = ExecutionContext::new("tenant-a", ULTRA_SECURE);
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let collaborators = stub_collaborators();
        let err = execute_step(
            &action,
            &mut variables,
            &json!({}),
            &mut ctx,
            &collaborators,
            &registry,
            &runtime,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::CapabilityDenied { .. }));
    }

    #[tokio::test]
    async fn translation_bypasses_model_when_src_equals_dst() {
        let mut variables = VariableStore::new();
        let action = StepAction::Translation {
            text: Some("hello".to_string()),
            src: Some("en".to_string()),
            dst: Some("en".to_string()),
            result: None,
        };
        let mut ctx = ExecutionContext::new("tenant-a", ULTRA_SECURE);
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let collaborators = stub_collaborators();
        let result = execute_step(
            &action,
            &mut variables,
            &json!({}),
            &mut ctx,
            &collaborators,
            &registry,
            &runtime,
        )
        .await
        .unwrap();
        assert_eq!(result["text"], json!("hello"));
        assert_eq!(result["metadata"]["bypass"], json!(true));
    }

    #[test]
    fn split_paragraphs_preserves_boundaries_and_caps_length() {
        let text = "a".repeat(900);
        let chunks = split_paragraphs(&text, 800);
        assert!(chunks.iter().all(|c| c.len() <= 800));
        assert_eq!(chunks.concat().len(), 900);
    }

    #[tokio::test]
    async fn custom_action_with_no_declared_capability_runs_when_module_allowed() {
        use crate::security_profile::CAP_NONE;

        let mut functions = collaborators::CustomFunctions::new();
        functions.register(
            "echo",
            CAP_NONE,
            std::sync::Arc::new(|input, _vars, _args, _ctx| Ok(input.clone())),
        );
        let mut collaborators = stub_collaborators();
        collaborators.custom_functions = std::sync::Arc::new(functions);

        let mut variables = VariableStore::new();
        let action = StepAction::CustomAction {
            function: "echo".to_string(),
            args: json!({}),
            result: None,
        };
        let mut ctx = ExecutionContext::new("tenant-a", crate::security_profile::HIGH_SECURITY);
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let result = execute_step(
            &action,
            &mut variables,
            &json!("hi"),
            &mut ctx,
            &collaborators,
            &registry,
            &runtime,
        )
        .await
        .unwrap();
        assert_eq!(result, json!("hi"));
    }

    #[tokio::test]
    async fn custom_action_denied_when_not_in_allowed_modules() {
        use crate::security_profile::CAP_NONE;

        let mut functions = collaborators::CustomFunctions::new();
        functions.register(
            "echo",
            CAP_NONE,
            std::sync::Arc::new(|input, _vars, _args, _ctx| Ok(input.clone())),
        );
        let mut collaborators = stub_collaborators();
        collaborators.custom_functions = std::sync::Arc::new(functions);

        let mut variables = VariableStore::new();
        let action = StepAction::CustomAction {
            function: "echo".to_string(),
            args: json!({}),
            result: None,
        };
        // ULTRA_SECURE has an empty allowed_modules set, so even a
        // zero-capability function is refused.
        let mut ctx = ExecutionContext::new("tenant-a", ULTRA_SECURE);
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let err = execute_step(
            &action,
            &mut variables,
            &json!("hi"),
            &mut ctx,
            &collaborators,
            &registry,
            &runtime,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::CapabilityDenied { .. }));
    }

    #[tokio::test]
    async fn custom_action_unknown_function_surfaces_unknown_custom() {
        let mut variables = VariableStore::new();
        let action = StepAction::CustomAction {
            function: "missing".to_string(),
            args: json!({}),
            result: None,
        };
        let mut ctx = ExecutionContext::new("tenant-a", crate::security_profile::HIGH_SECURITY);
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let collaborators = stub_collaborators();
        let err = execute_step(
            &action,
            &mut variables,
            &json!({}),
            &mut ctx,
            &collaborators,
            &registry,
            &runtime,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::UnknownCustom { .. }));
    }

    #[tokio::test]
    async fn image_gen_rejects_malformed_resolution() {
        let mut variables = VariableStore::new();
        let action = StepAction::ImageGen {
            description: "a cat".to_string(),
            style: None,
            resolution: "not-a-resolution".to_string(),
            result: None,
        };
        let mut ctx = ExecutionContext::new("tenant-a", crate::security_profile::HIGH_SECURITY);
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let collaborators = stub_collaborators();
        let err = execute_step(
            &action,
            &mut variables,
            &json!({}),
            &mut ctx,
            &collaborators,
            &registry,
            &runtime,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::VariableRefError { .. }));
    }

    #[tokio::test]
    async fn image_gen_accepts_well_formed_resolution() {
        let mut variables = VariableStore::new();
        let action = StepAction::ImageGen {
            description: "a cat".to_string(),
            style: None,
            resolution: "512x512".to_string(),
            result: None,
        };
        let mut ctx = ExecutionContext::new("tenant-a", crate::security_profile::HIGH_SECURITY);
        let registry = Registry::new();
        let runtime = IsolatedRuntime::default();
        let collaborators = stub_collaborators();
        execute_step(
            &action,
            &mut variables,
            &json!({}),
            &mut ctx,
            &collaborators,
            &registry,
            &runtime,
        )
        .await
        .unwrap();
    }
}
