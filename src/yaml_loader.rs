//! YamlLoader (C2) — parses the fail-safe scalar YAML schema only, rejecting
//! anything a hostile or malformed agent card could use to misbehave at
//! load time rather than at run time.
//!
//! Follows the teacher's `ModuleDef::from_yaml`/`Capability::from_yaml`
//! pattern of parsing into an owned tree before any typed lowering happens,
//! but adds the security gate those files leave to `serde_yaml` itself.

use sha2::{Digest, Sha256};

use crate::error::EngineError;

pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;
pub const MAX_DEPTH: usize = 1000;
pub const MAX_KEYS: usize = 10_000;

/// Result of a successful load: the parsed scalar-only tree plus the
/// SHA-256 fingerprint of the raw source bytes.
pub struct LoadedYaml {
    pub value: serde_yaml::Value,
    pub fingerprint: [u8; 32],
}

/// Parses YAML under the fail-safe scalar schema (null/bool/int/float/string
/// only — no explicit tags, no binary nodes, no cyclic aliases).
pub struct YamlLoader;

impl YamlLoader {
    pub fn load(source: &str) -> Result<LoadedYaml, EngineError> {
        if source.len() > MAX_SOURCE_BYTES {
            return Err(yaml_err(format!(
                "source exceeds {MAX_SOURCE_BYTES} bytes"
            )));
        }
        reject_control_characters(source)?;

        let value: serde_yaml::Value = serde_yaml::from_str(source)
            .map_err(|e| yaml_err(format!("parse error: {e}")))?;

        let mut key_count = 0usize;
        check_depth_and_tags(&value, 0, &mut key_count)?;
        if key_count > MAX_KEYS {
            return Err(yaml_err(format!("total keys exceed {MAX_KEYS}")));
        }

        let fingerprint: [u8; 32] = Sha256::digest(source.as_bytes()).into();
        Ok(LoadedYaml { value, fingerprint })
    }
}

fn yaml_err(reason: String) -> EngineError {
    EngineError::YamlSecurityError { reason }
}

/// `serde_yaml::Value` has no concept of anchors/aliases or explicit tags by
/// the time it reaches us — the underlying `unsafe-libyaml` parser resolves
/// aliases during parsing. We defend in depth by walking the resolved tree
/// and rejecting any scalar/sequence/mapping shape that would only have been
/// reachable via a tag or a cyclic structure: binary (byte sequences,
/// represented as tagged scalars) and non-scalar map keys, which the
/// fail-safe schema forbids.
fn check_depth_and_tags(
    value: &serde_yaml::Value,
    depth: usize,
    key_count: &mut usize,
) -> Result<(), EngineError> {
    if depth > MAX_DEPTH {
        return Err(yaml_err(format!("depth exceeds {MAX_DEPTH}")));
    }
    match value {
        serde_yaml::Value::Null
        | serde_yaml::Value::Bool(_)
        | serde_yaml::Value::Number(_) => Ok(()),
        serde_yaml::Value::String(s) => reject_control_characters(s),
        serde_yaml::Value::Sequence(seq) => {
            for v in seq {
                check_depth_and_tags(v, depth + 1, key_count)?;
            }
            Ok(())
        }
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                if !matches!(k, serde_yaml::Value::String(_)) {
                    return Err(yaml_err("non-string mapping key".to_string()));
                }
                *key_count += 1;
                if *key_count > MAX_KEYS {
                    return Err(yaml_err(format!("total keys exceed {MAX_KEYS}")));
                }
                check_depth_and_tags(k, depth + 1, key_count)?;
                check_depth_and_tags(v, depth + 1, key_count)?;
            }
            Ok(())
        }
        serde_yaml::Value::Tagged(tagged) => Err(yaml_err(format!(
            "explicit type tag rejected: {}",
            tagged.tag
        ))),
    }
}

/// Rejects the control-character set the spec names:
/// `U+0000..U+0008, U+000B..U+000C, U+000E..U+001F, U+007F`.
fn reject_control_characters(s: &str) -> Result<(), EngineError> {
    for c in s.chars() {
        let cp = c as u32;
        let forbidden = (0x00..=0x08).contains(&cp)
            || (0x0B..=0x0C).contains(&cp)
            || (0x0E..=0x1F).contains(&cp)
            || cp == 0x7F;
        if forbidden {
            return Err(yaml_err(format!("control character U+{cp:04X} rejected")));
        }
    }
    Ok(())
}
