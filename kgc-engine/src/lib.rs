//! KGC engine: graph-driven workflow physics
//!
//! The engine interprets workflow specifications expressed entirely as RDF
//! graphs. Control flow lives in the physics ontology, execution is five
//! SPARQL-template verbs, every mutation is a transaction gated by four
//! invariant laws, and every hook execution leaves a chained receipt.
//!
//! ```no_run
//! use kgc_engine::{EngineConfig, KgcEngine};
//! use kgc_store::EyeReasoner;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), kgc_engine::EngineError> {
//! let engine = KgcEngine::new(
//!     EngineConfig::load()?,
//!     Arc::new(EyeReasoner::default_binary()),
//! )?;
//! engine.load_workflow("<urn:A> a <urn:Task> .").await?;
//! let report = engine.run_to_completion().await?;
//! assert!(report.converged);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod transaction;

pub use cancel::CancelToken;
pub use config::{EngineConfig, HookSettings, LockchainSettings, MaxTicks, ReasonerConfig};
pub use engine::KgcEngine;
pub use error::{EngineError, EngineResult};
pub use policy::{PackDependency, PolicyPack, PolicyPackManager};
pub use transaction::{Transaction, TransactionManager, TxnId, TxnState};
