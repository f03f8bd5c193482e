//! AuditTrail (C8) — per-tenant, append-only, hash-chained event log.
//!
//! Grounded in the teacher's sharded-state pattern (`modules/runtime.rs`'s
//! per-module state behind independent locks), generalized here to one
//! `parking_lot::Mutex`-guarded ring buffer per tenant inside a `DashMap` so
//! that an append for one tenant never blocks an append for another.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::EngineError;

/// Hash chain root for a tenant's first event. Not a secret; just a fixed
/// anchor so `prev_hash` is always defined.
const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

pub const MAX_EVENTS_PER_TENANT: usize = 100_000;
pub const DEFAULT_RETENTION_DAYS: u32 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Ok,
    Fail,
}

/// Severity is a property of the event kind, never caller-supplied. Kinds
/// matching `EngineError::is_security_relevant` are critical; the lifecycle
/// markers are informational; every other engine-error code is a warning.
pub fn severity_for_kind(kind: &str) -> AuditSeverity {
    match kind {
        "ExecutionStart" | "ExecutionEnd" => AuditSeverity::Info,
        "CapabilityDenied" | "MemoryExceeded" | "NestingExceeded" | "YamlSecurityError" => {
            AuditSeverity::Critical
        }
        _ => AuditSeverity::Warning,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub id: String,
    pub tenant_id: String,
    pub execution_id: String,
    pub kind: String,
    pub timestamp_ms: i64,
    pub severity: AuditSeverity,
    pub result: AuditResult,
    pub details: Value,
    pub details_hash: String,
    pub prev_hash: String,
    pub entry_hash: String,
}

/// Receives events whose severity is `Critical`. The engine never implements
/// a concrete paging/notification backend; this is a host collaborator.
pub trait AlertSink: Send + Sync {
    fn notify(&self, event: &AuditEvent);
}

/// An `AlertSink` that drops everything; the default when a host does not
/// wire one up.
pub struct NullAlertSink;

impl AlertSink for NullAlertSink {
    fn notify(&self, _event: &AuditEvent) {}
}

fn canonical_digest(parts: &[&str]) -> String {
    let joined = parts.join("|");
    hex::encode(Sha256::digest(joined.as_bytes()))
}

/// `serde_json`'s default `Map` is a `BTreeMap` (no `preserve_order`
/// feature enabled), so `to_string` already emits keys in sorted order —
/// this is already the canonical form used for hashing.
fn canonical_details(details: &Value) -> String {
    serde_json::to_string(details).unwrap_or_default()
}

pub struct AuditTrail {
    shards: DashMap<String, parking_lot::Mutex<VecDeque<AuditEvent>>>,
    alert_sink: Arc<dyn AlertSink>,
}

impl AuditTrail {
    pub fn new(alert_sink: Arc<dyn AlertSink>) -> Self {
        Self {
            shards: DashMap::new(),
            alert_sink,
        }
    }

    /// Append one event for `tenant_id`, chaining `prev_hash` to this
    /// tenant's previous `entry_hash` (or the genesis constant). Returns the
    /// new `entry_hash`.
    pub fn append(
        &self,
        tenant_id: &str,
        execution_id: &str,
        kind: &str,
        result: AuditResult,
        details: Value,
    ) -> Result<String, EngineError> {
        let shard = self
            .shards
            .entry(tenant_id.to_string())
            .or_insert_with(|| parking_lot::Mutex::new(VecDeque::new()));
        let mut guard = shard.lock();

        let prev_hash = guard
            .back()
            .map(|e| e.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let id = uuid::Uuid::new_v4().to_string();
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let details_hash = canonical_digest(&[&canonical_details(&details)]);
        let entry_hash = canonical_digest(&[
            &id,
            tenant_id,
            execution_id,
            kind,
            &timestamp_ms.to_string(),
            &details_hash,
            &prev_hash,
        ]);
        let severity = severity_for_kind(kind);

        let event = AuditEvent {
            id,
            tenant_id: tenant_id.to_string(),
            execution_id: execution_id.to_string(),
            kind: kind.to_string(),
            timestamp_ms,
            severity,
            result,
            details,
            details_hash,
            prev_hash,
            entry_hash: entry_hash.clone(),
        };

        if severity == AuditSeverity::Critical {
            self.alert_sink.notify(&event);
        }

        guard.push_back(event);
        if guard.len() > MAX_EVENTS_PER_TENANT {
            guard.pop_front();
        }

        Ok(entry_hash)
    }

    /// Recompute every `entry_hash` from its own stored fields (including
    /// its own stored `prev_hash`, not the neighbor's actual hash) and
    /// compare against what is stored. A mismatch is counted independently
    /// per event, so tampering one entry never cascades into its
    /// neighbors' verdicts.
    pub fn verify(&self, tenant_id: &str) -> (bool, usize) {
        let Some(shard) = self.shards.get(tenant_id) else {
            return (true, 0);
        };
        let guard = shard.lock();
        let mut corrupted = 0usize;
        for event in guard.iter() {
            let recomputed = canonical_digest(&[
                &event.id,
                &event.tenant_id,
                &event.execution_id,
                &event.kind,
                &event.timestamp_ms.to_string(),
                &event.details_hash,
                &event.prev_hash,
            ]);
            if recomputed != event.entry_hash {
                corrupted += 1;
            }
        }
        (corrupted == 0, corrupted)
    }

    /// Mutable access used only by tests to simulate bit-flip tampering of
    /// a stored field.
    #[cfg(test)]
    pub fn tamper_details_hash(&self, tenant_id: &str, index: usize, new_hash: &str) {
        if let Some(shard) = self.shards.get(tenant_id) {
            let mut guard = shard.lock();
            if let Some(event) = guard.get_mut(index) {
                event.details_hash = new_hash.to_string();
            }
        }
    }

    pub fn tenant_log(
        &self,
        tenant_id: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> (Vec<AuditEvent>, String) {
        let Some(shard) = self.shards.get(tenant_id) else {
            return (Vec::new(), canonical_digest(&[""]));
        };
        let guard = shard.lock();
        let events: Vec<AuditEvent> = guard
            .iter()
            .filter(|e| start_ms.map_or(true, |s| e.timestamp_ms >= s))
            .filter(|e| end_ms.map_or(true, |e_| e.timestamp_ms <= e_))
            .cloned()
            .collect();
        let mut hashes: Vec<&str> = events.iter().map(|e| e.entry_hash.as_str()).collect();
        hashes.sort_unstable();
        let global_hash = canonical_digest(&[&hashes.join("|")]);
        (events, global_hash)
    }

    /// Drop events older than `retention_days` for every tenant.
    pub fn sweep_retention(&self, retention_days: u32) {
        let cutoff = chrono::Utc::now().timestamp_millis() - (retention_days as i64) * 86_400_000;
        for shard in self.shards.iter_mut() {
            shard.lock().retain(|e| e.timestamp_ms >= cutoff);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComplianceVerdict {
    Passed,
    Warning,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ComplianceReport {
    pub tenant_id: String,
    pub total_events: usize,
    pub security_violations: usize,
    pub success_ratio: f64,
    pub verdict: ComplianceVerdict,
    pub global_hash: String,
}

const FAILED_SECURITY_VIOLATION_THRESHOLD: usize = 5;
const WARNING_SUCCESS_RATIO_FLOOR: f64 = 0.95;

impl AuditTrail {
    pub fn compliance_report(
        &self,
        tenant_id: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> ComplianceReport {
        let (events, global_hash) = self.tenant_log(tenant_id, start_ms, end_ms);
        let total_events = events.len();
        let security_violations = events
            .iter()
            .filter(|e| e.severity == AuditSeverity::Critical)
            .count();
        let ok_count = events.iter().filter(|e| e.result == AuditResult::Ok).count();
        let success_ratio = if total_events == 0 {
            1.0
        } else {
            ok_count as f64 / total_events as f64
        };

        let verdict = if security_violations > FAILED_SECURITY_VIOLATION_THRESHOLD {
            ComplianceVerdict::Failed
        } else if success_ratio < WARNING_SUCCESS_RATIO_FLOOR {
            ComplianceVerdict::Warning
        } else {
            ComplianceVerdict::Passed
        };

        ComplianceReport {
            tenant_id: tenant_id.to_string(),
            total_events,
            security_violations,
            success_ratio,
            verdict,
            global_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trail() -> AuditTrail {
        AuditTrail::new(Arc::new(NullAlertSink))
    }

    #[test]
    fn chain_verifies_clean_after_many_appends() {
        let trail = trail();
        for i in 0..1000 {
            trail
                .append("tenant-a", "exec-1", "ExecutionEnd", AuditResult::Ok, json!({"i": i}))
                .unwrap();
        }
        let (valid, corrupted) = trail.verify("tenant-a");
        assert!(valid);
        assert_eq!(corrupted, 0);
    }

    #[test]
    fn single_bit_flip_reports_exactly_one_corruption() {
        let trail = trail();
        for i in 0..1000 {
            trail
                .append("tenant-a", "exec-1", "ExecutionEnd", AuditResult::Ok, json!({"i": i}))
                .unwrap();
        }
        trail.tamper_details_hash("tenant-a", 500, "deadbeef".repeat(8).as_str());
        let (valid, corrupted) = trail.verify("tenant-a");
        assert!(!valid);
        assert_eq!(corrupted, 1);
    }

    #[test]
    fn critical_kind_notifies_alert_sink() {
        struct Counter(std::sync::atomic::AtomicUsize);
        impl AlertSink for Counter {
            fn notify(&self, _event: &AuditEvent) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }
        let counter = Arc::new(Counter(std::sync::atomic::AtomicUsize::new(0)));
        let trail = AuditTrail::new(counter.clone());
        trail
            .append("tenant-a", "exec-1", "CapabilityDenied", AuditResult::Fail, json!({}))
            .unwrap();
        assert_eq!(counter.0.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn compliance_report_passes_with_no_violations() {
        let trail = trail();
        trail
            .append("tenant-a", "exec-1", "ExecutionEnd", AuditResult::Ok, json!({}))
            .unwrap();
        let report = trail.compliance_report("tenant-a", None, None);
        assert_eq!(report.verdict, ComplianceVerdict::Passed);
    }

    #[test]
    fn empty_tenant_verifies_clean() {
        let trail = trail();
        let (valid, corrupted) = trail.verify("ghost-tenant");
        assert!(valid);
        assert_eq!(corrupted, 0);
    }
}
