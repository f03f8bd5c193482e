//! Supervisor (C11) — the public façade. Coordinates Registry →
//! ComplianceGate → AuditTrail → IsolatedRuntime(Interpreter) → ThreatScorer
//! → AuditTrail, exactly the pipeline in the external-interface data-flow
//! description, never as ambient/global state (§9: no singleton — every
//! field here is an explicit, constructible value).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use sha2::Digest;

use crate::audit::{AuditResult, AuditTrail};
use crate::compliance::ComplianceGate;
use crate::error::EngineError;
use crate::execution::ExecutionContext;
use crate::interpreter::Interpreter;
use crate::registry::Registry;
use crate::runtime::IsolatedRuntime;
use crate::security_profile::profile_by_name;
use crate::steps::collaborators::Collaborators;
use crate::threat::SharedThreatScorer;

pub struct Supervisor {
    pub registry: Arc<Registry>,
    pub runtime: Arc<IsolatedRuntime>,
    pub collaborators: Collaborators,
    pub compliance_gate: Arc<dyn ComplianceGate>,
    pub audit: Arc<AuditTrail>,
    pub threat_scorer: SharedThreatScorer,
}

impl Supervisor {
    pub fn new(
        registry: Arc<Registry>,
        runtime: Arc<IsolatedRuntime>,
        collaborators: Collaborators,
        compliance_gate: Arc<dyn ComplianceGate>,
        audit: Arc<AuditTrail>,
        threat_scorer: SharedThreatScorer,
    ) -> Self {
        Self {
            registry,
            runtime,
            collaborators,
            compliance_gate,
            audit,
            threat_scorer,
        }
    }

    /// The engine's one public entry point. Looks up the agent, gates on
    /// compliance, brackets the run with `ExecutionStart`/`ExecutionEnd`
    /// audit events, scores threat after completion, and returns either the
    /// output value or the typed failure.
    pub async fn execute(
        &self,
        agent_name: &str,
        input: Value,
        props: HashMap<String, String>,
        tenant_id: &str,
    ) -> Result<Value, EngineError> {
        let agent = self.registry.get(agent_name).ok_or_else(|| EngineError::Internal(
            format!("agent {agent_name:?} is not registered"),
        ))?;

        if let Err(deny) = self.compliance_gate.precheck(tenant_id, &props) {
            self.audit
                .append(
                    tenant_id,
                    "n/a",
                    "ComplianceDenied",
                    AuditResult::Fail,
                    json!({ "agent": agent_name, "reason": deny.code, "message": deny.message }),
                )
                .ok();
            return Err(EngineError::CapabilityDenied {
                capability: deny.code.to_string(),
            });
        }

        let profile = profile_by_name(&agent.metadata.route.clone().unwrap_or_default())
            .unwrap_or(crate::security_profile::HIGH_SECURITY);
        let mut ctx = ExecutionContext::new(tenant_id, profile);
        let execution_id = ctx.execution_id.clone();

        self.audit
            .append(
                tenant_id,
                &execution_id,
                "ExecutionStart",
                AuditResult::Ok,
                json!({ "agent": agent_name }),
            )
            .ok();

        let started = Instant::now();
        let interpreter = Interpreter::new(&self.registry, &self.runtime, &self.collaborators);
        let run_result = self
            .runtime
            .execute(profile, interpreter.run(&agent, input.clone(), &props, &mut ctx))
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let input_digest = hex::encode(sha2::Sha256::digest(
            serde_json::to_vec(&input).unwrap_or_default(),
        ));
        let outcome_kind = run_result
            .as_ref()
            .err()
            .map(EngineError::code)
            .unwrap_or("Ok");
        let score = self.threat_scorer.score(
            tenant_id,
            agent_name,
            &json!({ "input_digest": input_digest, "outcome": outcome_kind }),
        );

        self.audit
            .append(
                tenant_id,
                &execution_id,
                "ExecutionEnd",
                if run_result.is_ok() { AuditResult::Ok } else { AuditResult::Fail },
                json!({
                    "agent": agent_name,
                    "outcome": outcome_kind,
                    "duration_ms": duration_ms,
                    "memory_high_water": ctx.memory_accounted,
                    "risk_score": score.risk_score,
                }),
            )
            .ok();

        run_result
    }
}
