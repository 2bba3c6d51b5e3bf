//! Policy packs
//!
//! A pack bundles hooks, SHACL shapes and SLOs under a semver version.
//! Activation swaps the active pack of the same id atomically and binds
//! its hooks into the registry; deactivation unbinds them but keeps the
//! pack loaded and queryable.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use kgc_hooks::{Hook, HookRegistry};
use parking_lot::RwLock;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Dependency on another loaded pack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackDependency {
    pub id: String,
    /// semver requirement, e.g. `^1.2`
    pub version_req: String,
}

/// Versioned bundle of hooks, shapes and SLOs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyPack {
    pub id: String,
    pub version: String,
    /// SHACL shapes as Turtle documents
    #[serde(default)]
    pub shacl_shapes: Vec<String>,
    #[serde(default)]
    pub hooks: Vec<Hook>,
    /// Service-level objectives, including the chosen lockchain block size
    #[serde(default)]
    pub slo: HashMap<String, f64>,
    #[serde(default)]
    pub dependencies: Vec<PackDependency>,
    /// Hook ids allowed to recover locally instead of bubbling failures
    #[serde(default)]
    pub resilient_hooks: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl PolicyPack {
    fn parsed_version(&self) -> EngineResult<Version> {
        Version::parse(&self.version).map_err(|e| {
            EngineError::Policy(format!("pack {} has invalid version: {}", self.id, e))
        })
    }
}

/// Owns packs; the hook registry borrows active hooks from here
pub struct PolicyPackManager {
    registry: Arc<HookRegistry>,
    packs: RwLock<HashMap<String, PolicyPack>>,
    /// Replaced pack versions, kept queryable
    history: RwLock<Vec<PolicyPack>>,
}

impl PolicyPackManager {
    pub fn new(registry: Arc<HookRegistry>) -> Self {
        Self {
            registry,
            packs: RwLock::new(HashMap::new()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Load a pack: semver validation plus dependency check
    pub fn load(&self, mut pack: PolicyPack) -> EngineResult<()> {
        let version = pack.parsed_version()?;
        {
            let packs = self.packs.read();
            for dependency in &pack.dependencies {
                let requirement = VersionReq::parse(&dependency.version_req).map_err(|e| {
                    EngineError::Policy(format!(
                        "pack {} dependency {} has invalid requirement: {}",
                        pack.id, dependency.id, e
                    ))
                })?;
                let Some(required) = packs.get(&dependency.id) else {
                    return Err(EngineError::Policy(format!(
                        "pack {} requires {} which is not loaded",
                        pack.id, dependency.id
                    )));
                };
                let required_version = required.parsed_version()?;
                if !requirement.matches(&required_version) {
                    return Err(EngineError::Policy(format!(
                        "pack {} requires {} {}, loaded version is {}",
                        pack.id, dependency.id, dependency.version_req, required.version
                    )));
                }
            }
        }
        for hook in &pack.hooks {
            hook.validate()?;
        }
        pack.enabled = false;
        pack.loaded_at = Some(Utc::now());
        tracing::info!(pack_id = %pack.id, version = %version, "policy pack loaded");
        if let Some(replaced) = self.packs.write().insert(pack.id.clone(), pack) {
            self.history.write().push(replaced);
        }
        Ok(())
    }

    /// Activate a loaded pack, atomically replacing the active pack of the
    /// same id: old hooks unbind and new hooks bind under one write lock
    pub fn activate(&self, pack_id: &str) -> EngineResult<()> {
        let mut packs = self.packs.write();
        let pack = packs
            .get_mut(pack_id)
            .ok_or_else(|| EngineError::Policy(format!("pack {} is not loaded", pack_id)))?;
        if pack.enabled {
            return Ok(());
        }
        for hook in &pack.hooks {
            self.registry.unregister(&hook.id);
        }
        for hook in &pack.hooks {
            self.registry.register(hook.clone())?;
        }
        pack.enabled = true;
        tracing::info!(pack_id, "policy pack activated");
        Ok(())
    }

    /// Deactivate: hooks unbind, the pack stays loaded and queryable
    pub fn deactivate(&self, pack_id: &str) -> EngineResult<()> {
        let mut packs = self.packs.write();
        let pack = packs
            .get_mut(pack_id)
            .ok_or_else(|| EngineError::Policy(format!("pack {} is not loaded", pack_id)))?;
        for hook in &pack.hooks {
            self.registry.unregister(&hook.id);
        }
        pack.enabled = false;
        Ok(())
    }

    /// Hot reload: load a replacement version and re-activate in one step
    pub fn reload(&self, pack: PolicyPack) -> EngineResult<()> {
        let pack_id = pack.id.clone();
        let was_enabled = self
            .packs
            .read()
            .get(&pack_id)
            .map(|p| p.enabled)
            .unwrap_or(false);
        if was_enabled {
            self.deactivate(&pack_id)?;
        }
        self.load(pack)?;
        if was_enabled {
            self.activate(&pack_id)?;
        }
        Ok(())
    }

    pub fn get(&self, pack_id: &str) -> Option<PolicyPack> {
        self.packs.read().get(pack_id).cloned()
    }

    /// Superseded versions of a pack, oldest first
    pub fn history(&self, pack_id: &str) -> Vec<PolicyPack> {
        self.history
            .read()
            .iter()
            .filter(|p| p.id == pack_id)
            .cloned()
            .collect()
    }

    pub fn list(&self) -> Vec<PolicyPack> {
        let mut packs: Vec<PolicyPack> = self.packs.read().values().cloned().collect();
        packs.sort_by(|a, b| a.id.cmp(&b.id));
        packs
    }

    /// Active shapes across every enabled pack
    pub fn active_shapes(&self) -> Vec<String> {
        self.packs
            .read()
            .values()
            .filter(|p| p.enabled)
            .flat_map(|p| p.shacl_shapes.iter().cloned())
            .collect()
    }

    /// Whether the pack owning `hook_id` marks it resilient
    pub fn is_resilient(&self, hook_id: &str) -> bool {
        self.packs.read().values().any(|p| {
            p.enabled && p.resilient_hooks.iter().any(|id| id == hook_id)
        })
    }
}
