//! Error types for store and reasoner operations

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the store and reasoner ports
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed RDF or SPARQL input; never retried
    #[error("Parse error: {0}")]
    Parse(String),

    /// The store rejected an operation
    #[error("Store operation failed: {0}")]
    Operation(String),

    /// SPARQL query evaluation failed
    #[error("Query failed: {0}")]
    Query(String),

    /// SPARQL update execution failed
    #[error("Update failed: {0}")]
    Update(String),

    /// A quad delta violated its construction invariants
    #[error("Invalid quad delta: {0}")]
    InvalidDelta(String),

    /// Delta batch exceeds the hermeticity limit
    #[error("Delta batch of {size} quads exceeds the limit of {max}")]
    DeltaTooLarge { size: usize, max: usize },

    /// The reasoner returned a failure or produced unusable output
    #[error("Reasoner error: {0}")]
    Reasoner(String),

    /// The external reasoner binary cannot be reached
    #[error("Reasoner unavailable: {0}")]
    ReasonerUnavailable(String),

    /// Term could not be converted to a valid RDF node
    #[error("Invalid term: {0}")]
    InvalidTerm(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
