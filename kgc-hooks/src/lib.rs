//! Knowledge hooks for the KGC workflow physics engine
//!
//! Hooks are user-defined conditions (SPARQL ASK/SELECT, SHACL, delta,
//! threshold, window, composite) fired across ten lifecycle phases. Every
//! execution is sandboxed, budgeted, sanitized and receipted into the
//! lockchain; the receipt stream is the canonical execution trace.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod cache;
pub mod condition;
pub mod context;
pub mod definition;
pub mod error;
pub mod phase;
pub mod pipeline;
pub mod registry;
pub mod sandbox;
pub mod sanitizer;

pub use cache::{canonical_query_hash, canonicalize_query, CacheStats, QueryCache};
pub use condition::{
    CompareOp, CompositeOp, Condition, ConditionEvaluator, DeltaDirection, WindowAggregate,
};
pub use context::{HookContext, SHOULD_ROLLBACK};
pub use definition::{handler_fn, HandlerEntry, HandlerFn, Hook, DEFAULT_TIMEOUT_MS};
pub use error::{HookError, HookOpResult};
pub use phase::Phase;
pub use pipeline::{HookChain, HookOutcome, HookPipeline, PREVIOUS_RESULT};
pub use registry::HookRegistry;
pub use sandbox::{HandlerRequirements, SandboxProfile};
pub use sanitizer::{sanitize, sanitize_message, ErrorEnvelope};
