//! ExecutionContext — per-call scratchpad threaded through the interpreter
//! and the isolated runtime.

use std::time::{Duration, Instant};

use serde_json::Value;
use uuid::Uuid;

use crate::security_profile::{CapabilityMask, SecurityProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Success,
    Error,
}

impl Status {
    /// The only legal transitions form a DAG: running -> success,
    /// running -> error. Anything else is a programming error in the
    /// interpreter itself.
    pub fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Running, Status::Success) | (Status::Running, Status::Error)
        )
    }
}

const MAX_LOG_LINES: usize = 1000;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub tenant_id: String,
    pub execution_id: String,
    pub status: Status,
    pub output: Option<Value>,
    pub error_message: Option<String>,
    pub deadline: Instant,
    pub capabilities: CapabilityMask,
    pub memory_ceiling: u64,
    pub memory_accounted: u64,
    pub sub_agent_depth: u8,
    allowed_modules: &'static [&'static str],
    restricted_names: &'static [&'static str],
    logs: Vec<String>,
    logs_dropped: u64,
}

impl ExecutionContext {
    pub fn new(tenant_id: impl Into<String>, profile: SecurityProfile) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            execution_id: Uuid::new_v4().to_string(),
            status: Status::Running,
            output: None,
            error_message: None,
            deadline: Instant::now() + Duration::from_millis(profile.wall_clock_ms),
            capabilities: profile.capability_mask,
            memory_ceiling: profile.memory_ceiling_bytes,
            memory_accounted: 0,
            sub_agent_depth: 0,
            allowed_modules: profile.allowed_modules,
            restricted_names: profile.restricted_names,
            logs: Vec::new(),
            logs_dropped: 0,
        }
    }

    /// Derive a child context for a sub-agent call: the deadline and memory
    /// ceiling are inherited, not reset, and the nesting depth increments.
    pub fn child_for_sub_agent(&self) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            execution_id: Uuid::new_v4().to_string(),
            status: Status::Running,
            output: None,
            error_message: None,
            deadline: self.deadline,
            capabilities: self.capabilities,
            memory_ceiling: self.memory_ceiling,
            memory_accounted: self.memory_accounted,
            sub_agent_depth: self.sub_agent_depth + 1,
            allowed_modules: self.allowed_modules,
            restricted_names: self.restricted_names,
            logs: Vec::new(),
            logs_dropped: 0,
        }
    }

    /// Whether a custom-action function named `name` may run under this
    /// context's profile (see `SecurityProfile::module_allowed`).
    pub fn module_allowed(&self, name: &str) -> bool {
        if self.restricted_names.contains(&name) {
            return false;
        }
        self.allowed_modules.contains(&"*") || self.allowed_modules.contains(&name)
    }

    pub fn log(&mut self, line: impl Into<String>) {
        if self.logs.len() >= MAX_LOG_LINES {
            self.logs_dropped += 1;
        } else {
            self.logs.push(line.into());
        }
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn logs_dropped(&self) -> u64 {
        self.logs_dropped
    }

    pub fn is_past_deadline(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Replaces the tracked memory footprint with `total_bytes` (the
    /// interpreter's current `VariableStore::footprint_bytes()` after a
    /// step), failing the moment it exceeds the ceiling. Unlike
    /// `account_memory`, this is an absolute measurement, not an
    /// accumulation — the variable store already tracks its own running
    /// total as values are bound and rebound.
    pub fn sync_memory_footprint(&mut self, total_bytes: u64) -> Result<(), crate::error::EngineError> {
        self.memory_accounted = total_bytes;
        if self.memory_accounted > self.memory_ceiling {
            return Err(crate::error::EngineError::MemoryExceeded {
                accounted: self.memory_accounted,
                ceiling: self.memory_ceiling,
            });
        }
        Ok(())
    }

    /// Accounts `additional_bytes` against the memory ceiling; fails the
    /// moment the running total would exceed it.
    pub fn account_memory(&mut self, additional_bytes: u64) -> Result<(), crate::error::EngineError> {
        let next = self.memory_accounted.saturating_add(additional_bytes);
        if next > self.memory_ceiling {
            return Err(crate::error::EngineError::MemoryExceeded {
                accounted: next,
                ceiling: self.memory_ceiling,
            });
        }
        self.memory_accounted = next;
        Ok(())
    }

    pub fn mark_success(&mut self, output: Value) {
        debug_assert!(self.status.can_transition_to(Status::Success));
        self.status = Status::Success;
        self.output = Some(output);
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        debug_assert!(self.status.can_transition_to(Status::Error));
        self.status = Status::Error;
        self.error_message = Some(message.into());
    }
}
