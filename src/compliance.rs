//! ComplianceGate (C10) — a host-implemented collaborator interface for
//! pre-execution consent/retention checks. The engine never owns compliance
//! storage or policy state (§9 open question): it calls only `precheck` and
//! reads back `ComplianceReport`s the host (or `AuditTrail::compliance_report`)
//! produces.

use std::collections::HashMap;

/// Why a `ComplianceGate` refused to let an execution proceed.
#[derive(Debug, Clone)]
pub struct DenyReason {
    pub code: &'static str,
    pub message: String,
}

impl DenyReason {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Host-implemented pre-execution gate. A no-op implementation (always
/// `Ok`) is provided for hosts that do not need one; see
/// [`AlwaysAllow`].
pub trait ComplianceGate: Send + Sync {
    fn precheck(&self, tenant_id: &str, props: &HashMap<String, String>) -> Result<(), DenyReason>;
}

/// Default gate for hosts with no compliance policy to enforce.
pub struct AlwaysAllow;

impl ComplianceGate for AlwaysAllow {
    fn precheck(&self, _tenant_id: &str, _props: &HashMap<String, String>) -> Result<(), DenyReason> {
        Ok(())
    }
}

/// A gate that denies execution when `props["consent_status"] == "missing"`,
/// mirroring the LGPD policy hint the ThreatScorer also reads — a minimal,
/// in-process stand-in hosts can use directly or replace wholesale.
pub struct ConsentRequiredGate;

impl ComplianceGate for ConsentRequiredGate {
    fn precheck(&self, _tenant_id: &str, props: &HashMap<String, String>) -> Result<(), DenyReason> {
        if props.get("consent_status").map(String::as_str) == Some("missing") {
            return Err(DenyReason::new(
                "consent_missing",
                "tenant has not granted data-processing consent",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_allow_never_denies() {
        let gate = AlwaysAllow;
        assert!(gate.precheck("tenant-a", &HashMap::new()).is_ok());
    }

    #[test]
    fn consent_required_gate_denies_missing_consent() {
        let gate = ConsentRequiredGate;
        let mut props = HashMap::new();
        props.insert("consent_status".to_string(), "missing".to_string());
        let err = gate.precheck("tenant-a", &props).unwrap_err();
        assert_eq!(err.code, "consent_missing");
    }

    #[test]
    fn consent_required_gate_allows_granted_consent() {
        let gate = ConsentRequiredGate;
        let mut props = HashMap::new();
        props.insert("consent_status".to_string(), "granted".to_string());
        assert!(gate.precheck("tenant-a", &props).is_ok());
    }
}
