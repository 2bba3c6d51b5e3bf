//! Validation layer: the four laws plus SHACL shape checking
//!
//! Every commit is gated by four invariants over the state and physics
//! graphs: TYPING (every subject is typed), HERMETICITY (bounded batches
//! over a declared predicate whitelist), CHRONOLOGY (time never moves
//! backward) and COMPLETENESS (every referenced parameter value has a
//! template). The SHACL-subset validator backs both policy-pack shapes and
//! the SHACL hook condition.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod invariants;
pub mod shacl;

pub use invariants::{
    InvariantValidator, Law, PredicateWhitelist, ValidationReport, Violation,
};
pub use shacl::{ShaclReport, ShaclValidator, ShaclViolation, Shape, PropertyConstraint};

use kgc_store::StoreError;
use thiserror::Error;

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Operational failures while validating (distinct from violations found)
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Shapes graph error: {0}")]
    Shapes(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
