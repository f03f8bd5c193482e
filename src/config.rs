//! EngineConfig — the configuration envelope from the external interface
//! table, deserializable the way the teacher configures its own runtime
//! (serde-derived struct with sensible defaults, not a bespoke parser).

use serde::Deserialize;

use crate::security_profile::SecurityProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    None,
    Basic,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditHashAlgorithm {
    Sha256,
    Sha512,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub memory_limit_bytes: u64,
    pub timeout_ms: u64,
    pub default_security_profile: String,
    pub audit_enabled: bool,
    pub audit_level: AuditLevel,
    pub audit_hash_algorithm: AuditHashAlgorithm,
    pub max_pool_size: usize,
    pub min_pool_size: usize,
    pub pool_idle_timeout_ms: u64,
    pub tenant_isolation: bool,
    pub max_concurrent_executions: usize,
    pub data_retention_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: crate::security_profile::HIGH_SECURITY.memory_ceiling_bytes,
            timeout_ms: 10_000,
            default_security_profile: "high-security".to_string(),
            audit_enabled: true,
            audit_level: AuditLevel::Basic,
            audit_hash_algorithm: AuditHashAlgorithm::Sha256,
            max_pool_size: 100,
            min_pool_size: 5,
            pool_idle_timeout_ms: 30_000,
            tenant_isolation: true,
            max_concurrent_executions: 256,
            data_retention_days: crate::audit::DEFAULT_RETENTION_DAYS,
        }
    }
}

impl EngineConfig {
    /// Resolve `default_security_profile` to its pinned tuple, falling back
    /// to `high-security` if the configured name is unrecognized.
    pub fn resolved_default_profile(&self) -> SecurityProfile {
        crate::security_profile::profile_by_name(&self.default_security_profile)
            .unwrap_or(crate::security_profile::HIGH_SECURITY)
    }

    pub fn pool_config(&self) -> crate::runtime::PoolConfig {
        crate::runtime::PoolConfig {
            min_pool: self.min_pool_size,
            max_pool: self.max_pool_size,
            idle_timeout_ms: self.pool_idle_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_resolves_to_high_security() {
        let config = EngineConfig::default();
        assert_eq!(config.resolved_default_profile().name, "high-security");
    }

    #[test]
    fn unknown_profile_name_falls_back_to_high_security() {
        let mut config = EngineConfig::default();
        config.default_security_profile = "nonexistent".to_string();
        assert_eq!(config.resolved_default_profile().name, "high-security");
    }

    #[test]
    fn deserializes_from_partial_json_document_filling_in_defaults() {
        let partial = r#"{ "timeout_ms": 2500, "audit_enabled": false }"#;
        let config: EngineConfig = serde_json::from_str(partial).unwrap();
        assert_eq!(config.timeout_ms, 2500);
        assert!(!config.audit_enabled);
        // Everything else falls back to `#[serde(default)]`.
        assert_eq!(config.max_pool_size, EngineConfig::default().max_pool_size);
        assert_eq!(
            config.default_security_profile,
            EngineConfig::default().default_security_profile
        );
    }

    #[test]
    fn deserializes_from_empty_json_document() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_pool_size, EngineConfig::default().max_pool_size);
        assert_eq!(config.timeout_ms, EngineConfig::default().timeout_ms);
    }
}
