//! Closed error taxonomy for the engine surface.
//!
//! Every failure a caller can observe is one of these variants; there is no
//! catch-all string error and no panic path reachable from caller-supplied
//! YAML, input, or props.

use thiserror::Error;

/// A single schema validation failure, identified by its path into the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Top-level engine error, matching the exit-code table of the external
/// interface: every variant here is one row of that table.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("schema violation ({side}): {issues:?}")]
    SchemaViolation { side: SchemaSide, issues: Vec<Issue> },

    #[error("missing required prop: {name}")]
    MissingProps { name: String },

    #[error("variable reference error: {path}")]
    VariableRefError { path: String },

    #[error("unknown step kind: {kind}")]
    UnknownStep { kind: String },

    #[error("unknown custom function: {name}")]
    UnknownCustom { name: String },

    #[error("sub-agent nesting exceeded limit of {limit}")]
    NestingExceeded { limit: u8 },

    #[error("execution deadline exceeded")]
    Timeout,

    #[error("memory ceiling exceeded: accounted {accounted} > ceiling {ceiling}")]
    MemoryExceeded { accounted: u64, ceiling: u64 },

    #[error("capability denied: {capability}")]
    CapabilityDenied { capability: String },

    #[error("worker pool exhausted")]
    PoolExhausted,

    #[error("yaml security violation: {reason}")]
    YamlSecurityError { reason: String },

    #[error("provider error: {upstream}")]
    ProviderError { upstream: String },

    #[error("internal engine error: {0}")]
    Internal(String),
}

/// Which side of the interpreter pipeline a schema violation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSide {
    Input,
    Output,
}

impl std::fmt::Display for SchemaSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaSide::Input => write!(f, "input"),
            SchemaSide::Output => write!(f, "output"),
        }
    }
}

impl EngineError {
    /// The stable exit-code name used in audit records and the external
    /// interface table (§6 of the specification this engine implements).
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::SchemaViolation { .. } => "SchemaViolation",
            EngineError::MissingProps { .. } => "MissingProps",
            EngineError::VariableRefError { .. } => "VariableRefError",
            EngineError::UnknownStep { .. } => "UnknownStep",
            EngineError::UnknownCustom { .. } => "UnknownCustom",
            EngineError::NestingExceeded { .. } => "NestingExceeded",
            EngineError::Timeout => "Timeout",
            EngineError::MemoryExceeded { .. } => "MemoryExceeded",
            EngineError::CapabilityDenied { .. } => "CapabilityDenied",
            EngineError::PoolExhausted => "PoolExhausted",
            EngineError::YamlSecurityError { .. } => "YamlSecurityError",
            EngineError::ProviderError { .. } => "ProviderError",
            EngineError::Internal(_) => "Internal",
        }
    }

    /// Whether this error kind is itself a security-relevant signal, used by
    /// the threat scorer to weight audit-derived contributions higher.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            EngineError::CapabilityDenied { .. }
                | EngineError::YamlSecurityError { .. }
                | EngineError::MemoryExceeded { .. }
                | EngineError::NestingExceeded { .. }
        )
    }
}
