//! Registry (C4) — `name -> AgentDefinition`, created once per process.
//!
//! Grounded in the teacher's `modules/runtime.rs::ModuleRuntime::active_modules`
//! (a `HashMap` behind a single owning struct, mutated only through method
//! calls) and `modules/loader.rs`'s directory-discovery convention, but with
//! a single writer lock instead of ambient global state (§9: no singleton).

use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::agent::AgentDefinition;
use crate::error::EngineError;
use crate::schema::SchemaCompiler;

pub struct Registry {
    compiler: Arc<SchemaCompiler>,
    agents: RwLock<std::collections::HashMap<String, Arc<AgentDefinition>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            compiler: Arc::new(SchemaCompiler::new()),
            agents: RwLock::new(std::collections::HashMap::new()),
        }
    }

    pub fn with_compiler(compiler: Arc<SchemaCompiler>) -> Self {
        Self {
            compiler,
            agents: RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Register a parsed-and-compiled `AgentDefinition`. Validates that the
    /// protocol tag matches the pinned constant and that the raw YAML this
    /// definition was derived from was non-empty (a zero-length fingerprint
    /// preimage cannot occur from `YamlLoader`, so this guards against a
    /// hand-constructed definition bypassing the loader).
    pub fn register(&self, def: AgentDefinition, allow_overwrite: bool) -> Result<(), EngineError> {
        if def.protocol_tag != crate::agent::PROTOCOL_TAG {
            return Err(EngineError::Internal(format!(
                "refusing to register agent {:?} with foreign protocol tag",
                def.id
            )));
        }
        let mut guard = self.agents.write();
        if !allow_overwrite && guard.contains_key(&def.id) {
            return Err(EngineError::Internal(format!(
                "agent {:?} already registered",
                def.id
            )));
        }
        guard.insert(def.id.clone(), Arc::new(def));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<AgentDefinition>> {
        self.agents.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.read().keys().cloned().collect()
    }

    /// Seeds the three named built-ins: joker, translator, image-gen.
    pub fn load_builtins(&self) -> Result<(), EngineError> {
        for source in [builtin_joker(), builtin_translator(), builtin_image_gen()] {
            let def = AgentDefinition::from_yaml(source, &self.compiler)?;
            self.register(def, true)?;
        }
        Ok(())
    }

    /// Recursively discovers `.yaml`/`.yml` files under `path` and registers
    /// each. A single file failing to parse is logged and skipped; it does
    /// not abort discovery of the rest of the directory.
    pub fn load_from_directory(&self, path: &Path) -> Result<usize, EngineError> {
        let mut loaded = 0usize;
        self.load_from_directory_inner(path, &mut loaded);
        Ok(loaded)
    }

    fn load_from_directory_inner(&self, path: &Path, loaded: &mut usize) {
        let entries = match fs::read_dir(path) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let p = entry.path();
            if p.is_dir() {
                self.load_from_directory_inner(&p, loaded);
                continue;
            }
            let is_yaml = p
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "yaml" || e == "yml")
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }
            match fs::read_to_string(&p) {
                Ok(source) => match AgentDefinition::from_yaml(&source, &self.compiler) {
                    Ok(def) => {
                        if let Err(e) = self.register(def, false) {
                            tracing::warn!(file = %p.display(), error = %e, "failed to register agent");
                        } else {
                            *loaded += 1;
                        }
                    }
                    Err(e) => tracing::warn!(file = %p.display(), error = %e, "failed to parse agent"),
                },
                Err(e) => tracing::warn!(file = %p.display(), error = %e, "failed to read agent file"),
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_joker() -> &'static str {
    r#"
agent:
  id: "joker"
  version: "1.0.0"
  protocol: "agent-engine/v1"
metadata:
  name: "Joker"
  description: "Tells a joke on a given topic"
  category: "entertainment"
schema:
  input:
    type: object
    properties:
      topic: { type: string, minLength: 1 }
    required: ["topic"]
  output:
    type: object
    properties:
      text: { type: string }
    required: ["text"]
logic:
  workflow:
    - name: "generate"
      action:
        type: "text-gen"
        prompt: "Tell a short, clean joke about the given topic."
        temperature: 0.9
        result: "joke"
    - name: "project"
      action:
        type: "output-project"
        output:
          text: "$joke.text"
"#
}

fn builtin_translator() -> &'static str {
    r#"
agent:
  id: "translator"
  version: "1.0.0"
  protocol: "agent-engine/v1"
metadata:
  name: "Translator"
  description: "Translates text between two languages"
  category: "language"
schema:
  input:
    type: object
    properties:
      text: { type: string, minLength: 1 }
      src: { type: string }
      dst: { type: string }
    required: ["text", "src", "dst"]
  output:
    type: object
    properties:
      text: { type: string }
    required: ["text"]
logic:
  workflow:
    - name: "translate"
      action:
        type: "translation"
        text: "$input.text"
        src: "$input.src"
        dst: "$input.dst"
        result: "translated"
    - name: "project"
      action:
        type: "output-project"
        output:
          text: "$translated.text"
"#
}

fn builtin_image_gen() -> &'static str {
    r#"
agent:
  id: "image-gen"
  version: "1.0.0"
  protocol: "agent-engine/v1"
metadata:
  name: "Image Generator"
  description: "Generates an image from a text description"
  category: "creative"
schema:
  input:
    type: object
    properties:
      description: { type: string, minLength: 1 }
      style: { type: string }
      resolution: { type: string }
    required: ["description", "resolution"]
  output:
    type: object
    properties:
      image_url: { type: string }
    required: ["image_url"]
logic:
  workflow:
    - name: "render"
      action:
        type: "image-gen"
        description: "$input.description"
        style: "$input.style"
        resolution: "$input.resolution"
        result: "image"
    - name: "project"
      action:
        type: "output-project"
        output:
          image_url: "$image.image_url"
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_load_and_register() {
        let registry = Registry::new();
        registry.load_builtins().unwrap();
        assert!(registry.get("joker").is_some());
        assert!(registry.get("translator").is_some());
        assert!(registry.get("image-gen").is_some());
    }

    #[test]
    fn duplicate_registration_without_overwrite_fails() {
        let registry = Registry::new();
        registry.load_builtins().unwrap();
        let compiler = SchemaCompiler::new();
        let def = AgentDefinition::from_yaml(builtin_joker(), &compiler).unwrap();
        assert!(registry.register(def, false).is_err());
    }

    #[test]
    fn unknown_agent_returns_none() {
        let registry = Registry::new();
        assert!(registry.get("does-not-exist").is_none());
    }
}
