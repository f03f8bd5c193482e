//! The closed step-kind enumeration (C6's wire shape). No engine code path
//! dispatches a step kind by string outside this tag — an unrecognized
//! `type` fails `serde`'s deserialization, which `AgentDefinition::from_yaml`
//! detects ahead of the full typed parse and reports as `UnknownStep`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One workflow entry: a diagnostic name plus a kind-tagged action.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Step {
    pub name: String,
    pub action: StepAction,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EmbedAction {
    EmbedSingle,
    EmbedBatch,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VectorStoreAction {
    HasData,
    Store,
    Search,
}

/// The closed set of step actions. Every variant corresponds 1:1 to one of
/// the eleven named step kinds; there is no twelfth, catch-all variant.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepAction {
    TextGen {
        prompt: String,
        #[serde(default = "default_text_gen_temperature")]
        temperature: f64,
        #[serde(default)]
        max_tokens: Option<u32>,
        #[serde(default)]
        result: Option<String>,
    },
    Translation {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        src: Option<String>,
        #[serde(default)]
        dst: Option<String>,
        #[serde(default)]
        result: Option<String>,
    },
    ImageGen {
        description: String,
        #[serde(default)]
        style: Option<String>,
        resolution: String,
        #[serde(default)]
        result: Option<String>,
    },
    McpTool {
        server_url: String,
        tool_name: String,
        #[serde(default)]
        tool_arguments: HashMap<String, Value>,
        #[serde(default)]
        result: Option<String>,
    },
    Embed {
        action: EmbedAction,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        texts: Option<Vec<String>>,
        #[serde(default)]
        result: Option<String>,
    },
    VectorStore {
        action: VectorStoreAction,
        collection_name: String,
        #[serde(default)]
        min_count: Option<u64>,
        #[serde(default)]
        ids: Option<Vec<String>>,
        #[serde(default)]
        embeddings: Option<Vec<Vec<f32>>>,
        #[serde(default)]
        documents: Option<Vec<String>>,
        #[serde(default)]
        metadatas: Option<Vec<Value>>,
        #[serde(default)]
        query_embedding: Option<Vec<f32>>,
        #[serde(default)]
        top_k: Option<usize>,
        #[serde(default)]
        result: Option<String>,
    },
    DocFetch {
        server_url: String,
        #[serde(default)]
        result: Option<String>,
    },
    Rag {
        query: String,
        context: String,
        #[serde(default)]
        history: Vec<HistoryTurn>,
        #[serde(default)]
        result: Option<String>,
    },
    SubAgent {
        agent: String,
        #[serde(default)]
        input: Option<Value>,
        #[serde(default)]
        props: Option<Value>,
        #[serde(default)]
        result: Option<String>,
    },
    CustomAction {
        function: String,
        #[serde(default)]
        args: Value,
        #[serde(default)]
        result: Option<String>,
    },
    OutputProject {
        output: HashMap<String, Value>,
    },
}

fn default_text_gen_temperature() -> f64 {
    0.7
}

/// Every wire tag `StepAction` accepts, in the order the variants are
/// declared above. Used to detect an unrecognized step `type` before the
/// full typed parse runs, so it can be reported as `UnknownStep` rather
/// than a generic shape error.
pub const KNOWN_STEP_KINDS: &[&str] = &[
    "text-gen",
    "translation",
    "image-gen",
    "mcp-tool",
    "embed",
    "vector-store",
    "doc-fetch",
    "rag",
    "sub-agent",
    "custom-action",
    "output-project",
];

impl StepAction {
    /// The step kind name exactly as it appears in the closed enumeration
    /// (`text-gen`, `translation`, ... `output-project`).
    pub fn kind_name(&self) -> &'static str {
        match self {
            StepAction::TextGen { .. } => "text-gen",
            StepAction::Translation { .. } => "translation",
            StepAction::ImageGen { .. } => "image-gen",
            StepAction::McpTool { .. } => "mcp-tool",
            StepAction::Embed { .. } => "embed",
            StepAction::VectorStore { .. } => "vector-store",
            StepAction::DocFetch { .. } => "doc-fetch",
            StepAction::Rag { .. } => "rag",
            StepAction::SubAgent { .. } => "sub-agent",
            StepAction::CustomAction { .. } => "custom-action",
            StepAction::OutputProject { .. } => "output-project",
        }
    }

    pub fn result_name(&self) -> Option<&str> {
        match self {
            StepAction::TextGen { result, .. }
            | StepAction::Translation { result, .. }
            | StepAction::ImageGen { result, .. }
            | StepAction::McpTool { result, .. }
            | StepAction::Embed { result, .. }
            | StepAction::VectorStore { result, .. }
            | StepAction::DocFetch { result, .. }
            | StepAction::Rag { result, .. }
            | StepAction::SubAgent { result, .. }
            | StepAction::CustomAction { result, .. } => result.as_deref(),
            StepAction::OutputProject { .. } => None,
        }
    }

    pub fn is_output_project(&self) -> bool {
        matches!(self, StepAction::OutputProject { .. })
    }
}
