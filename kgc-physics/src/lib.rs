//! Physics layer of the KGC workflow engine
//!
//! Workflow control flow is data: the physics ontology maps trigger shapes
//! to one of five kernel verbs plus SPARQL templates, the semantic driver
//! resolves that mapping per node, and the tick executor alternates
//! reasoner closure with kernel deltas until the graph reaches a fixed
//! point. No routing decision is made in Rust; changing the ontology
//! changes the physics.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod driver;
pub mod error;
pub mod kernel;
pub mod ontology;
pub mod status;
pub mod tick;

pub use driver::{SemanticDriver, Verb, VerbConfig};
pub use error::{KernelResult, PhysicsError};
pub use kernel::{execute_template, execute_verb, substitute, KernelContext};
pub use ontology::{PatternInfo, PhysicsOntology, DEFAULT_PHYSICS, DEFAULT_RULES};
pub use status::{effective_status, TaskStatus};
pub use tick::{ConvergenceReport, DeltaApplier, PhysicsResult, TickExecutor};
