//! Sandbox profiles
//!
//! A hook declares what its handler may touch; the handler declares what it
//! intends to touch. The preflight check runs before the handler does, so
//! a handler never sees a resource its profile forbids.

use crate::error::HookError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-hook resource policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxProfile {
    /// Directories the handler may read under
    #[serde(default)]
    pub allowed_read_roots: Vec<PathBuf>,
    #[serde(default)]
    pub allow_network: bool,
    #[serde(default)]
    pub allow_subprocess: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_handle_cap: Option<u32>,
}

impl Default for SandboxProfile {
    /// Deny-everything profile; pure graph handlers need nothing more
    fn default() -> Self {
        Self {
            allowed_read_roots: Vec::new(),
            allow_network: false,
            allow_subprocess: false,
            memory_limit_bytes: None,
            time_limit_ms: None,
            file_handle_cap: None,
        }
    }
}

/// Resources a handler intends to use, declared at registration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerRequirements {
    #[serde(default)]
    pub reads: Vec<PathBuf>,
    #[serde(default)]
    pub needs_network: bool,
    #[serde(default)]
    pub needs_subprocess: bool,
}

impl SandboxProfile {
    /// Whether the profile permits reading `path`
    pub fn permits_read(&self, path: &Path) -> bool {
        self.allowed_read_roots
            .iter()
            .any(|root| path.starts_with(root))
    }

    /// Check declared requirements against this profile; violations are
    /// raised before the handler runs
    pub fn preflight(&self, requirements: &HandlerRequirements) -> Result<(), HookError> {
        for path in &requirements.reads {
            if !self.permits_read(path) {
                return Err(HookError::Sandbox(format!(
                    "read outside allowed roots: {}",
                    path.display()
                )));
            }
        }
        if requirements.needs_network && !self.allow_network {
            return Err(HookError::Sandbox("network access denied".to_string()));
        }
        if requirements.needs_subprocess && !self.allow_subprocess {
            return Err(HookError::Sandbox("subprocess spawning denied".to_string()));
        }
        Ok(())
    }
}
