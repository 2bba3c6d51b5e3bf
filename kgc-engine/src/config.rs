//! Engine configuration
//!
//! TOML file with environment-variable overrides, prefix `KGC_`.
//! Loading hierarchy: env > file > defaults.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reasoner subprocess settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonerConfig {
    /// Path to the N3 reasoner binary
    pub binary: String,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            binary: "eye".to_string(),
        }
    }
}

/// Lockchain settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockchainSettings {
    /// Receipts per Merkle block
    pub block_size: usize,
    /// In-memory receipt retention cap
    pub retention: usize,
    /// Bounded persistence channel capacity
    pub channel_capacity: usize,
    /// Directory for receipt rotation; in-memory only when unset
    pub storage_path: Option<PathBuf>,
}

impl Default for LockchainSettings {
    fn default() -> Self {
        Self {
            block_size: 64,
            retention: 1000,
            channel_capacity: 256,
            storage_path: None,
        }
    }
}

/// Hook subsystem settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookSettings {
    /// Default handler budget in milliseconds
    pub default_timeout_ms: u64,
    pub condition_cache_capacity: usize,
    pub condition_cache_ttl_ms: u64,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 100,
            condition_cache_capacity: 512,
            condition_cache_ttl_ms: 1000,
        }
    }
}

/// Top-level engine configuration
///
/// `max_ticks` leads the struct so TOML serialization emits the scalar
/// before the tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default tick budget for `run_to_completion`
    pub max_ticks: MaxTicks,
    pub reasoner: ReasonerConfig,
    pub lockchain: LockchainSettings,
    pub hooks: HookSettings,
}

/// Newtype so the default is visible in serialized configs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaxTicks(pub u64);

impl Default for MaxTicks {
    fn default() -> Self {
        MaxTicks(64)
    }
}

impl EngineConfig {
    /// Load from file (when present) and apply environment overrides
    pub fn load() -> EngineResult<Self> {
        let path = std::env::var("KGC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read config file: {}", e)))?;
        toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("invalid config file: {}", e)))
    }

    /// `KGC_*` environment variables win over file values
    pub fn apply_env_overrides(&mut self) {
        if let Ok(binary) = std::env::var("KGC_REASONER_BINARY") {
            self.reasoner.binary = binary;
        }
        if let Some(block_size) = env_number("KGC_LOCKCHAIN_BLOCK_SIZE") {
            self.lockchain.block_size = block_size as usize;
        }
        if let Some(retention) = env_number("KGC_LOCKCHAIN_RETENTION") {
            self.lockchain.retention = retention as usize;
        }
        if let Ok(path) = std::env::var("KGC_LOCKCHAIN_PATH") {
            self.lockchain.storage_path = Some(PathBuf::from(path));
        }
        if let Some(timeout) = env_number("KGC_HOOK_TIMEOUT_MS") {
            self.hooks.default_timeout_ms = timeout;
        }
        if let Some(max_ticks) = env_number("KGC_MAX_TICKS") {
            self.max_ticks = MaxTicks(max_ticks);
        }
    }
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let mut path = PathBuf::from(home);
    path.push(".kgc");
    path.push("config.toml");
    path
}
