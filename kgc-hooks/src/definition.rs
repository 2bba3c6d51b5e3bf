//! Hook definition and handler binding
//!
//! A hook is data: id, priority, phases, condition, a reference to a named
//! handler, a timeout and a sandbox profile. Handlers are code, registered
//! separately under the name the hook references, together with the
//! resources they intend to touch.

use crate::condition::Condition;
use crate::context::HookContext;
use crate::error::{HookError, HookOpResult};
use crate::phase::Phase;
use crate::sandbox::{HandlerRequirements, SandboxProfile};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Default handler budget in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Immutable hook record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub id: String,
    pub name: String,
    /// 0..=100; higher runs first
    pub priority: i32,
    pub phases: Vec<Phase>,
    pub condition: Condition,
    pub handler_ref: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub sandbox_profile: SandboxProfile,
    pub version: String,
}

impl Hook {
    /// Check the fields the registry insists on
    pub fn validate(&self) -> HookOpResult<()> {
        if self.id.is_empty() {
            return Err(HookError::Registry("hook id cannot be empty".to_string()));
        }
        if self.version.is_empty() {
            return Err(HookError::Registry(format!(
                "hook {} has no version metadata",
                self.id
            )));
        }
        if !(0..=100).contains(&self.priority) {
            return Err(HookError::Registry(format!(
                "hook {} priority {} outside 0..=100",
                self.id, self.priority
            )));
        }
        if self.phases.is_empty() {
            return Err(HookError::Registry(format!(
                "hook {} subscribes to no phase",
                self.id
            )));
        }
        Ok(())
    }
}

/// Async handler body: context in, opaque JSON out
pub type HandlerFn =
    Arc<dyn Fn(HookContext) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// A registered handler with its declared resource needs
#[derive(Clone)]
pub struct HandlerEntry {
    pub func: HandlerFn,
    pub requirements: HandlerRequirements,
}

impl HandlerEntry {
    pub fn new(func: HandlerFn) -> Self {
        Self {
            func,
            requirements: HandlerRequirements::default(),
        }
    }

    pub fn with_requirements(func: HandlerFn, requirements: HandlerRequirements) -> Self {
        Self { func, requirements }
    }
}

/// Convenience for building handlers from async closures
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, String>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}
