//! Engine-level error aggregation, stable codes and exit codes

use kgc_hooks::{sanitize, ErrorEnvelope, HookError};
use kgc_lockchain::LockchainError;
use kgc_physics::PhysicsError;
use kgc_store::StoreError;
use kgc_validation::{Law, ValidationError, Violation};
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Everything the engine can fail with
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Physics(#[from] PhysicsError),

    #[error(transparent)]
    Hooks(#[from] HookError),

    #[error(transparent)]
    Lockchain(#[from] LockchainError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An invariant law was breached; the transaction aborted
    #[error("{} invariant violated: {}", .0.law.code(), .0.message)]
    Invariant(Violation),

    /// The active policy pack rejected the operation
    #[error("Policy violation: {0}")]
    Policy(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Store(StoreError::Parse(_)) => "ParseError",
            EngineError::Store(StoreError::Reasoner(_))
            | EngineError::Store(StoreError::ReasonerUnavailable(_)) => "ReasonerError",
            EngineError::Store(_) => "StoreOperationError",
            EngineError::Physics(PhysicsError::Convergence { .. }) => "ConvergenceError",
            EngineError::Physics(PhysicsError::Completeness { .. }) => "CompletenessViolation",
            EngineError::Physics(PhysicsError::Reasoner(_))
            | EngineError::Physics(PhysicsError::Template(_)) => "ReasonerError",
            EngineError::Physics(PhysicsError::Store(StoreError::Parse(_))) => "ParseError",
            EngineError::Physics(_) => "PhysicsError",
            EngineError::Hooks(inner) => inner.code(),
            EngineError::Lockchain(_) => "LockchainError",
            EngineError::Validation(_) => "ValidationError",
            EngineError::Invariant(violation) => violation.law.code(),
            EngineError::Policy(_) => "PolicyViolation",
            EngineError::Transaction(_) => "TransactionError",
            EngineError::Config(_) => "ConfigError",
        }
    }

    /// Process exit code for the embedding CLI boundary
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Physics(PhysicsError::Convergence { .. }) => 1,
            EngineError::Invariant(violation) => match violation.law {
                Law::Completeness => 4,
                _ => 2,
            },
            EngineError::Store(StoreError::ReasonerUnavailable(_)) => 3,
            EngineError::Physics(PhysicsError::Reasoner(_)) => 3,
            EngineError::Store(StoreError::Parse(_)) => 64,
            EngineError::Config(_) => 64,
            _ => 2,
        }
    }

    /// Sanitized wire envelope; the raw error stays on the internal log
    pub fn to_envelope(&self) -> ErrorEnvelope {
        sanitize(self.code(), self)
    }
}
