//! Hook registry
//!
//! Keyed by id, served sorted by priority (descending, ties in
//! registration order). The hook records persist to JSON — the primary
//! wire format — and export to Turtle for graph-side audit.

use crate::definition::{HandlerEntry, Hook};
use crate::error::{HookError, HookOpResult};
use crate::phase::Phase;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// JSON persistence envelope
#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    hooks: Vec<Hook>,
}

/// Registry of hooks and their named handlers
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<Hook>>,
    handlers: RwLock<HashMap<String, HandlerEntry>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook; id collisions and missing version metadata are errors
    pub fn register(&self, hook: Hook) -> HookOpResult<()> {
        hook.validate()?;
        let mut hooks = self.hooks.write();
        if hooks.iter().any(|h| h.id == hook.id) {
            return Err(HookError::Registry(format!(
                "hook {} is already registered",
                hook.id
            )));
        }
        tracing::debug!(hook_id = %hook.id, priority = hook.priority, "hook registered");
        hooks.push(hook);
        Ok(())
    }

    /// Remove a hook; unknown ids are a no-op
    pub fn unregister(&self, hook_id: &str) {
        self.hooks.write().retain(|h| h.id != hook_id);
    }

    pub fn get(&self, hook_id: &str) -> Option<Hook> {
        self.hooks.read().iter().find(|h| h.id == hook_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// All hooks sorted by priority descending, ties by registration order
    pub fn all_sorted(&self) -> Vec<Hook> {
        let mut hooks = self.hooks.read().clone();
        hooks.sort_by_key(|h| std::cmp::Reverse(h.priority));
        hooks
    }

    /// Hooks subscribed to `phase`, in execution order
    pub fn hooks_for_phase(&self, phase: Phase) -> Vec<Hook> {
        self.all_sorted()
            .into_iter()
            .filter(|h| h.phases.contains(&phase))
            .collect()
    }

    /// Bind a handler name hooks can reference
    pub fn register_handler(&self, name: impl Into<String>, entry: HandlerEntry) {
        self.handlers.write().insert(name.into(), entry);
    }

    pub fn handler(&self, name: &str) -> Option<HandlerEntry> {
        self.handlers.read().get(name).cloned()
    }

    /// Serialize all hook records to the JSON wire format
    pub fn to_json(&self) -> HookOpResult<String> {
        let file = RegistryFile {
            hooks: self.hooks.read().clone(),
        };
        serde_json::to_string_pretty(&file).map_err(|e| HookError::Serialization(e.to_string()))
    }

    /// Load hook records from the JSON wire format (handlers bind separately)
    pub fn load_json(&self, json: &str) -> HookOpResult<usize> {
        let file: RegistryFile =
            serde_json::from_str(json).map_err(|e| HookError::Serialization(e.to_string()))?;
        let count = file.hooks.len();
        for hook in file.hooks {
            self.register(hook)?;
        }
        Ok(count)
    }

    /// Export hook records as RDF (Turtle) for audit
    pub fn to_turtle(&self) -> String {
        let mut out = String::new();
        out.push_str("@prefix kgc: <https://kgc.dev/ontology#> .\n\n");
        for hook in self.hooks.read().iter() {
            out.push_str(&format!("<urn:kgc:hook:{}> a kgc:Hook ;\n", hook.id));
            out.push_str(&format!("    kgc:hookName \"{}\" ;\n", escape(&hook.name)));
            out.push_str(&format!("    kgc:priority {} ;\n", hook.priority));
            for phase in &hook.phases {
                out.push_str(&format!("    kgc:phase \"{}\" ;\n", phase));
            }
            out.push_str(&format!(
                "    kgc:handlerRef \"{}\" ;\n",
                escape(&hook.handler_ref)
            ));
            out.push_str(&format!("    kgc:timeoutMs {} ;\n", hook.timeout_ms));
            out.push_str(&format!("    kgc:version \"{}\" .\n\n", escape(&hook.version)));
        }
        out
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
