//! ThreatScorer (C9) — stateless per-call scoring combining a fixed pattern
//! table, rolling per-`(tenant, operation)` anomaly statistics, and a few
//! policy hints read out of the call's metadata.
//!
//! Grounded in the shape of the teacher's `policy/mod.rs::pattern_matches`/
//! `compare_values` (glob-style `*`-wildcard matching against a
//! canonicalized value) — the pattern table here uses real `regex` instead,
//! since the patterns need alternation the teacher's glob matcher can't
//! express — and the anomaly-window idea from `other_examples/`'s
//! threat-simulator scenario engine, adapted to a single clamped risk score
//! instead of a simulation harness.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Timelike;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl AlertLevel {
    fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            AlertLevel::Emergency
        } else if score >= 0.7 {
            AlertLevel::Critical
        } else if score >= 0.4 {
            AlertLevel::Warning
        } else {
            AlertLevel::Info
        }
    }

    fn recommendations(self) -> Vec<&'static str> {
        match self {
            AlertLevel::Emergency => vec![
                "suspend the tenant's credentials pending manual review",
                "escalate to the on-call security responder immediately",
            ],
            AlertLevel::Critical => vec![
                "require step-up authentication before the next execution",
                "flag the tenant for manual compliance review",
            ],
            AlertLevel::Warning => vec!["monitor the tenant's subsequent operations more closely"],
            AlertLevel::Info => vec!["no action required"],
        }
    }
}

struct NamedPattern {
    threat_type: &'static str,
    weight: f64,
    regex: Regex,
}

static PATTERN_TABLE: Lazy<Vec<NamedPattern>> = Lazy::new(|| {
    let specs: &[(&str, f64, &str)] = &[
        ("brute_force", 0.5, r"(?i)(failed[_ ]login|invalid[_ ]credentials){3,}"),
        ("sql_injection", 0.8, r"(?i)(union\s+select|or\s+1\s*=\s*1|drop\s+table|;--)"),
        ("data_exfiltration", 0.6, r"(?i)(export[_ ]all|dump[_ ]database|bulk[_ ]download)"),
        ("cross_tenant", 0.7, r"(?i)(tenant[_ ]id\s*!=|cross[_ ]tenant|other[_ ]tenant)"),
        ("lgpd_violation", 0.5, r"(?i)(cpf|personal[_ ]data).*(missing[_ ]consent|no[_ ]consent)"),
        ("ddos", 0.6, r"(?i)(flood|amplification|syn[_ ]flood)"),
        ("privilege_escalation", 0.8, r"(?i)(sudo|grant[_ ]admin|escalate[_ ]privilege)"),
        ("malware", 0.9, r"(?i)(\.exe\b|reverse[_ ]shell|payload[_ ]inject)"),
    ];
    specs
        .iter()
        .map(|(threat_type, weight, pattern)| NamedPattern {
            threat_type,
            weight: *weight,
            regex: Regex::new(pattern).expect("pattern table entries are valid regexes"),
        })
        .collect()
});

#[derive(Debug, Clone, Copy)]
struct AnomalyEntry {
    timestamp_ms: i64,
}

struct AnomalyWindow {
    entries: VecDeque<AnomalyEntry>,
}

const ANOMALY_TTL_MS: i64 = 24 * 60 * 60 * 1000;
const ANOMALY_WINDOW_CAP: usize = 256;

pub struct ThreatScorer {
    windows: Mutex<HashMap<(String, String), AnomalyWindow>>,
}

#[derive(Debug, Clone)]
pub struct ThreatScore {
    pub risk_score: f64,
    pub threat_type: Option<&'static str>,
    pub confidence: f64,
    pub level: AlertLevel,
    pub recommendations: Vec<&'static str>,
}

impl ThreatScorer {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Score one `(tenant_id, operation, metadata)` triple. Stateless with
    /// respect to its inputs; the only state mutated is this scorer's own
    /// rolling anomaly windows.
    pub fn score(&self, tenant_id: &str, operation: &str, metadata: &Value) -> ThreatScore {
        let canonical_metadata = serde_json::to_string(metadata).unwrap_or_default();
        let haystack = format!("{operation} {canonical_metadata}");

        let (pattern_score, threat_type) = self.pattern_score(&haystack);
        let anomaly_score = self.anomaly_score(tenant_id, operation, metadata);
        let policy_score = policy_hint_score(metadata);

        let risk_score = (pattern_score + anomaly_score + policy_score).min(1.0);
        let level = AlertLevel::from_score(risk_score);

        ThreatScore {
            risk_score,
            threat_type,
            confidence: if threat_type.is_some() { 0.8 } else { 0.4 },
            level,
            recommendations: level.recommendations(),
        }
    }

    fn pattern_score(&self, haystack: &str) -> (f64, Option<&'static str>) {
        for entry in PATTERN_TABLE.iter() {
            if entry.regex.is_match(haystack) {
                return (entry.weight, Some(entry.threat_type));
            }
        }
        (0.0, None)
    }

    fn anomaly_score(&self, tenant_id: &str, operation: &str, metadata: &Value) -> f64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let mut windows = self.windows.lock();
        let key = (tenant_id.to_string(), operation.to_string());
        let window = windows.entry(key).or_insert_with(|| AnomalyWindow {
            entries: VecDeque::new(),
        });

        while let Some(front) = window.entries.front() {
            if now_ms - front.timestamp_ms > ANOMALY_TTL_MS {
                window.entries.pop_front();
            } else {
                break;
            }
        }

        let mut score = 0.0;

        if window.entries.len() >= 2 {
            let intervals: Vec<i64> = window
                .entries
                .iter()
                .zip(window.entries.iter().skip(1))
                .map(|(a, b)| b.timestamp_ms - a.timestamp_ms)
                .collect();
            let mean = intervals.iter().sum::<i64>() as f64 / intervals.len() as f64;
            let last_interval = (now_ms - window.entries.back().unwrap().timestamp_ms) as f64;
            if mean > 0.0 {
                if last_interval > mean * 3.0 {
                    score += 0.4;
                } else if last_interval > mean * 1.5 {
                    score += 0.2;
                }
            }
        }

        let hour = chrono::Utc::now().hour();
        if !(6..22).contains(&hour) {
            score += 0.15;
        }

        if metadata.get("cross_tenant_target").and_then(Value::as_bool) == Some(true) {
            score += 0.25;
        }

        window.entries.push_back(AnomalyEntry { timestamp_ms: now_ms });
        if window.entries.len() > ANOMALY_WINDOW_CAP {
            window.entries.pop_front();
        }

        score
    }
}

impl Default for ThreatScorer {
    fn default() -> Self {
        Self::new()
    }
}

const LGPD_COMPLIANCE_WEIGHT: f64 = 0.5;
const FREQUENCY_ANOMALY_WEIGHT: f64 = 0.3;
const OPERATION_COUNT_THRESHOLD: u64 = 1000;

fn policy_hint_score(metadata: &Value) -> f64 {
    let mut score = 0.0;
    if metadata.get("consent_status").and_then(Value::as_str) == Some("missing") {
        score += 0.6 * LGPD_COMPLIANCE_WEIGHT;
    }
    if let Some(count) = metadata.get("operation_count").and_then(Value::as_u64) {
        if count > OPERATION_COUNT_THRESHOLD {
            score += FREQUENCY_ANOMALY_WEIGHT;
        }
    }
    score
}

/// A scorer bundled behind an `Arc` so the Supervisor can share one instance
/// (and its anomaly windows) across concurrently executing requests.
pub type SharedThreatScorer = Arc<ThreatScorer>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sql_injection_pattern_is_detected() {
        let scorer = ThreatScorer::new();
        let score = scorer.score("tenant-a", "query: ' OR 1=1 --", &json!({}));
        assert_eq!(score.threat_type, Some("sql_injection"));
        assert!(score.risk_score >= 0.7);
    }

    #[test]
    fn missing_consent_contributes_policy_score() {
        let scorer = ThreatScorer::new();
        let score = scorer.score("tenant-a", "read-record", &json!({"consent_status": "missing"}));
        assert!(score.risk_score > 0.0);
    }

    #[test]
    fn benign_operation_scores_as_info() {
        let scorer = ThreatScorer::new();
        let score = scorer.score("tenant-a", "list-agents", &json!({}));
        assert_eq!(score.level, AlertLevel::Info);
    }

    #[test]
    fn alert_level_thresholds_are_ordered() {
        assert_eq!(AlertLevel::from_score(0.95), AlertLevel::Emergency);
        assert_eq!(AlertLevel::from_score(0.75), AlertLevel::Critical);
        assert_eq!(AlertLevel::from_score(0.5), AlertLevel::Warning);
        assert_eq!(AlertLevel::from_score(0.1), AlertLevel::Info);
    }
}
