//! Error types for the hook subsystem

use thiserror::Error;

/// Result type for hook operations
pub type HookOpResult<T> = Result<T, HookError>;

/// Errors raised by the registry, evaluator, sandbox and pipeline
#[derive(Error, Debug)]
pub enum HookError {
    /// Handler exceeded its time budget; distinct from user-raised errors
    #[error("Hook {hook_id} timed out after {timeout_ms} ms")]
    Timeout { hook_id: String, timeout_ms: u64 },

    /// Handler attempted a forbidden resource; raised before it runs
    #[error("Sandbox violation: {0}")]
    Sandbox(String),

    /// Handler raised
    #[error("Handler failed: {0}")]
    Handler(String),

    /// Condition evaluation failed
    #[error("Condition evaluation failed: {0}")]
    Condition(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Store(#[from] kgc_store::StoreError),

    #[error(transparent)]
    Validation(#[from] kgc_validation::ValidationError),

    #[error(transparent)]
    Lockchain(#[from] kgc_lockchain::LockchainError),
}

impl HookError {
    /// Stable error code for the wire envelope
    pub fn code(&self) -> &'static str {
        match self {
            HookError::Timeout { .. } => "HookTimeout",
            HookError::Sandbox(_) => "SandboxViolation",
            HookError::Handler(_) => "HookHandlerError",
            HookError::Condition(_) => "ConditionError",
            HookError::Registry(_) => "RegistryError",
            HookError::Serialization(_) => "ParseError",
            HookError::Store(_) => "StoreOperationError",
            HookError::Validation(_) => "ValidationError",
            HookError::Lockchain(_) => "LockchainError",
        }
    }
}
