//! RDF quad store and reasoner ports for the KGC workflow physics engine
//!
//! This crate provides the two external ports the engine consumes:
//! - [`RdfStore`]: a quad container with SPARQL query/update and atomic
//!   [`QuadDelta`] application
//! - [`Reasoner`]: a monotonic N3 forward-chaining closure producer
//!
//! plus the owned RDF model ([`Term`], [`Quad`], [`QuadDelta`]), deterministic
//! graph canonicalization, and the `kgc:`/`yawl:` vocabulary.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod canonicalize;
pub mod error;
pub mod model;
pub mod reasoner;
pub mod store;
pub mod vocab;

pub use canonicalize::{canonical_hash, canonical_hash_sha256, canonical_nquads, is_isomorphic};
pub use error::{StoreError, StoreResult};
pub use model::{Quad, QuadDelta, Term, MAX_DELTA_QUADS};
pub use reasoner::{EyeReasoner, FixtureReasoner, Reasoner, ReasonerOutput};
pub use store::{OxigraphStore, RdfStore, RdfSyntax, ResultSet, Solution};
