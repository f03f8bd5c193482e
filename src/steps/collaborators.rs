//! Host-supplied collaborator shapes (§6 external interfaces). The engine
//! imports only these traits; it never implements a concrete AI provider,
//! vector database, or remote-tool-protocol client — those are explicitly
//! out of scope (§1).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineError;
use crate::execution::ExecutionContext;
use crate::security_profile::CapabilityMask;

#[derive(Debug, Clone)]
pub struct TextGenResult {
    pub text: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ImageGenResult {
    pub base64: String,
    pub media_type: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct VectorQueryResult {
    pub documents: Vec<String>,
    pub metadatas: Vec<Value>,
    pub distances: Vec<f32>,
}

/// Abstracted AI provider: text generation, image generation, and embedding.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate_text(
        &self,
        prompt: &str,
        temperature: f64,
        max_tokens: Option<u32>,
    ) -> Result<TextGenResult, EngineError>;

    async fn generate_image(&self, prompt: &str, size: &str) -> Result<ImageGenResult, EngineError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;
}

/// Abstracted vector database, keyed by collection name.
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    async fn get_or_create_collection(&self, name: &str) -> Result<(), EngineError>;
    async fn count(&self, collection: &str) -> Result<u64, EngineError>;
    async fn add(
        &self,
        collection: &str,
        ids: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        documents: Vec<String>,
        metadatas: Vec<Value>,
    ) -> Result<usize, EngineError>;
    async fn query(
        &self,
        collection: &str,
        embedding: Vec<f32>,
        k: usize,
    ) -> Result<VectorQueryResult, EngineError>;
}

#[derive(Debug, Clone)]
pub struct ToolDesc {
    pub name: String,
    pub description: String,
}

/// Abstracted remote-tool-protocol client (MCP or equivalent).
#[async_trait]
pub trait ToolClient: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(), EngineError>;
    async fn list_tools(&self) -> Result<Vec<ToolDesc>, EngineError>;
    async fn call(
        &self,
        name: &str,
        args: &Value,
        deadline: std::time::Duration,
    ) -> Result<Vec<String>, EngineError>;
    async fn close(&self) -> Result<(), EngineError>;
}

/// A pure, deterministic function `(input, variables, action_args, ctx) ->
/// value`, registered by the host at startup and immutable thereafter. `ctx`
/// lets the function observe `tenant_id`/`execution_id`/`capabilities`/
/// `deadline` without granting it any capability beyond what it declared at
/// registration time.
pub type CustomFunction = Arc<
    dyn Fn(&Value, &HashMap<String, Value>, &Value, &ExecutionContext) -> Result<Value, EngineError>
        + Send
        + Sync,
>;

#[derive(Clone)]
struct RegisteredFunction {
    capability: CapabilityMask,
    handler: CustomFunction,
}

#[derive(Default, Clone)]
pub struct CustomFunctions {
    table: HashMap<String, RegisteredFunction>,
}

impl CustomFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `f` under `name`, declaring the capability it requires.
    /// Per §4.5 a custom function has "no capability beyond what the
    /// function itself declares at registration time" — `capability` is
    /// that declaration, checked against the caller's profile before every
    /// dispatch.
    pub fn register(&mut self, name: impl Into<String>, capability: CapabilityMask, f: CustomFunction) {
        self.table.insert(
            name.into(),
            RegisteredFunction {
                capability,
                handler: f,
            },
        );
    }

    /// The capability `name` declared at registration time, or
    /// `UnknownCustom` if nothing is registered under that name.
    pub fn capability_for(&self, name: &str) -> Result<CapabilityMask, EngineError> {
        self.table
            .get(name)
            .map(|r| r.capability)
            .ok_or_else(|| EngineError::UnknownCustom {
                name: name.to_string(),
            })
    }

    pub fn call(
        &self,
        name: &str,
        input: &Value,
        variables: &HashMap<String, Value>,
        args: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, EngineError> {
        match self.table.get(name) {
            Some(r) => (r.handler)(input, variables, args, ctx),
            None => Err(EngineError::UnknownCustom {
                name: name.to_string(),
            }),
        }
    }
}

/// Collaborator bundle threaded through step execution. Cheap to clone
/// (everything is `Arc`-backed).
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn ModelProvider>,
    pub vector_store: Arc<dyn VectorStoreProvider>,
    pub tool_client: Arc<dyn ToolClient>,
    pub custom_functions: Arc<CustomFunctions>,
}
