//! Error types for the physics layer

use kgc_store::StoreError;
use thiserror::Error;

/// Result type for physics operations
pub type KernelResult<T> = Result<T, PhysicsError>;

/// Errors raised by the ontology provider, driver, kernel and tick loop
#[derive(Error, Debug)]
pub enum PhysicsError {
    /// A pattern mapping references a parameter value with no template
    #[error("Completeness violation: mapping {mapping} parameter {parameter} has no template")]
    Completeness { mapping: String, parameter: String },

    /// The ontology names a verb the kernel does not carry
    #[error("Unknown verb {verb} in mapping {mapping}")]
    UnknownVerb { mapping: String, verb: String },

    /// A verb was invoked without a template it requires
    #[error("Verb {verb} is missing its {template} template")]
    MissingTemplate {
        verb: &'static str,
        template: &'static str,
    },

    /// Template SPARQL failed to parse or execute
    #[error("Reasoner error: template execution failed: {0}")]
    Template(String),

    /// The reasoner failed or is unreachable; fatal for the current tick
    #[error("Reasoner error: {0}")]
    Reasoner(String),

    /// Fixed point not reached within the tick budget
    #[error("No convergence after {max_ticks} ticks (final delta {final_delta})")]
    Convergence { max_ticks: u64, final_delta: i64 },

    /// Kernel delta application was rejected downstream
    #[error("Delta application failed: {0}")]
    Apply(String),

    /// A cancellation signal stopped the run between ticks
    #[error("Run cancelled after {completed_ticks} ticks")]
    Cancelled { completed_ticks: u64 },

    /// Malformed physics ontology or rules input
    #[error("Ontology error: {0}")]
    Ontology(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
