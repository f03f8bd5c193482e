//! SecurityProfile — pinned, read-only resource/capability bundles.
//!
//! Three named profiles are hard-coded constants, not user-authorable: the
//! engine re-architects the teacher's free-form `CollapseGateConfig`
//! (min_confidence/block_patterns/escalate_to, attacker-tunable per module)
//! into fixed tuples the caller can only select by name, never construct.

/// Capability bitset. Small fixed set, so a `u8` mask suffices instead of
/// pulling in the `bitflags` crate for four bits.
pub type CapabilityMask = u8;

pub const CAP_NONE: CapabilityMask = 0;
pub const CAP_NET_AI: CapabilityMask = 1 << 0;
pub const CAP_NET_REMOTE_TOOL: CapabilityMask = 1 << 1;
pub const CAP_NET_VECTOR: CapabilityMask = 1 << 2;
pub const CAP_NET_EGRESS: CapabilityMask = 1 << 3;

pub fn has_capability(mask: CapabilityMask, required: CapabilityMask) -> bool {
    required == CAP_NONE || (mask & required) == required
}

pub fn capability_name(required: CapabilityMask) -> &'static str {
    match required {
        CAP_NET_AI => "net_ai",
        CAP_NET_REMOTE_TOOL => "net_remote_tool",
        CAP_NET_VECTOR => "net_vector",
        CAP_NET_EGRESS => "net_egress",
        _ => "none",
    }
}

/// A named, read-only 5-tuple of resource limits, the capability mask, and
/// the custom-action module allowlist/denylist a step is allowed to
/// exercise under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityProfile {
    pub name: &'static str,
    pub memory_ceiling_bytes: u64,
    pub wall_clock_ms: u64,
    pub capability_mask: CapabilityMask,
    /// Custom-action function names this profile may invoke. The wildcard
    /// `"*"` means "whatever the host registered", subject to
    /// `restricted_names` below. Empty means no custom actions at all.
    pub allowed_modules: &'static [&'static str],
    /// Function names this profile may never invoke, regardless of
    /// `allowed_modules` — an explicit denylist that always wins.
    pub restricted_names: &'static [&'static str],
}

impl SecurityProfile {
    /// Whether a custom-action function named `name` may run under this
    /// profile.
    pub fn module_allowed(&self, name: &str) -> bool {
        if self.restricted_names.contains(&name) {
            return false;
        }
        self.allowed_modules.contains(&"*") || self.allowed_modules.contains(&name)
    }
}

pub const ULTRA_SECURE: SecurityProfile = SecurityProfile {
    name: "ultra-secure",
    memory_ceiling_bytes: 2 * 1024 * 1024,
    wall_clock_ms: 5_000,
    capability_mask: CAP_NONE,
    allowed_modules: &[],
    restricted_names: &[],
};

pub const HIGH_SECURITY: SecurityProfile = SecurityProfile {
    name: "high-security",
    memory_ceiling_bytes: 4 * 1024 * 1024,
    wall_clock_ms: 10_000,
    capability_mask: CAP_NET_AI,
    allowed_modules: &["*"],
    restricted_names: &[],
};

pub const TENANT_ISOLATED: SecurityProfile = SecurityProfile {
    name: "tenant-isolated",
    memory_ceiling_bytes: 8 * 1024 * 1024,
    wall_clock_ms: 15_000,
    capability_mask: CAP_NET_AI | CAP_NET_REMOTE_TOOL | CAP_NET_VECTOR | CAP_NET_EGRESS,
    allowed_modules: &["*"],
    restricted_names: &[],
};

/// Resolve a pinned profile by its exact name. Callers may never construct
/// an ad-hoc profile; this is the only entry point.
pub fn profile_by_name(name: &str) -> Option<SecurityProfile> {
    match name {
        "ultra-secure" => Some(ULTRA_SECURE),
        "high-security" => Some(HIGH_SECURITY),
        "tenant-isolated" => Some(TENANT_ISOLATED),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ultra_secure_grants_no_capabilities() {
        assert_eq!(ULTRA_SECURE.capability_mask, CAP_NONE);
        assert!(!has_capability(ULTRA_SECURE.capability_mask, CAP_NET_AI));
    }

    #[test]
    fn ultra_secure_allows_no_modules() {
        assert!(!ULTRA_SECURE.module_allowed("anything"));
    }

    #[test]
    fn high_security_wildcard_allows_any_module_not_restricted() {
        assert!(HIGH_SECURITY.module_allowed("summarize"));
    }

    #[test]
    fn restricted_names_always_wins_over_wildcard() {
        let mut profile = HIGH_SECURITY;
        profile.restricted_names = &["dangerous_fn"];
        assert!(!profile.module_allowed("dangerous_fn"));
        assert!(profile.module_allowed("safe_fn"));
    }

    #[test]
    fn tenant_isolated_grants_network_egress() {
        assert!(has_capability(TENANT_ISOLATED.capability_mask, CAP_NET_EGRESS));
    }

    #[test]
    fn unknown_profile_name_resolves_to_none() {
        assert!(profile_by_name("anything-else").is_none());
    }
}
