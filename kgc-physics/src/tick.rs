//! Tick executor and convergence runner
//!
//! One tick is one application of physics: reasoner closure over the state
//! graph, then kernel deltas for every node whose trigger resolves. The
//! triple-count delta across a tick is the convergence signal; monotonic N3
//! guarantees the closure is finite, so a fixed point always exists.

use crate::driver::SemanticDriver;
use crate::error::{KernelResult, PhysicsError};
use crate::kernel::{execute_verb, KernelContext};
use crate::ontology::PhysicsOntology;
use kgc_store::{vocab, QuadDelta, RdfStore, RdfSyntax, Reasoner};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsResult {
    pub tick_number: u64,
    pub duration_ms: f64,
    pub triples_before: u64,
    pub triples_after: u64,
    pub delta: i64,
    pub converged: bool,
}

/// Full report of a `run_to_completion` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub ticks: Vec<PhysicsResult>,
    pub converged: bool,
}

/// How kernel deltas reach the store. The default applies them directly;
/// the engine substitutes a transaction-wrapped applier.
pub type DeltaApplier =
    Arc<dyn Fn(QuadDelta) -> BoxFuture<'static, KernelResult<()>> + Send + Sync>;

/// Orchestrates ticks over a state store, a reasoner and the physics
pub struct TickExecutor {
    store: Arc<dyn RdfStore>,
    reasoner: Arc<dyn Reasoner>,
    ontology: Arc<PhysicsOntology>,
    driver: SemanticDriver,
    applier: Option<DeltaApplier>,
    tick_counter: AtomicU64,
}

impl TickExecutor {
    pub fn new(
        store: Arc<dyn RdfStore>,
        reasoner: Arc<dyn Reasoner>,
        ontology: Arc<PhysicsOntology>,
    ) -> Self {
        let driver = SemanticDriver::new(ontology.clone());
        Self {
            store,
            reasoner,
            ontology,
            driver,
            applier: None,
            tick_counter: AtomicU64::new(0),
        }
    }

    /// Route kernel deltas through `applier` instead of applying them to
    /// the store directly (the engine wires its transaction manager here)
    pub fn with_applier(mut self, applier: DeltaApplier) -> Self {
        self.applier = Some(applier);
        self
    }

    pub fn driver(&self) -> &SemanticDriver {
        &self.driver
    }

    /// Execute one tick: snapshot, reason, load closure, run kernel deltas
    pub async fn execute_tick(&self) -> KernelResult<PhysicsResult> {
        let tick_number = self.tick_counter.fetch_add(1, Ordering::SeqCst);
        let span = tracing::info_span!("tick", tick_number);
        let _guard = span.enter();
        let started = Instant::now();

        if !self.reasoner.is_available() {
            return Err(PhysicsError::Reasoner(
                "reasoner unavailable; tick cannot run".to_string(),
            ));
        }

        let triples_before = self.store.triple_count()?;
        let state = self.store.snapshot_turtle()?;
        let rules = self.ontology.get_rules();

        let output = self.reasoner.reason(&state, &rules).await?;
        if !output.success {
            return Err(PhysicsError::Reasoner(
                output
                    .error
                    .unwrap_or_else(|| "reasoner returned failure".to_string()),
            ));
        }
        // Closure adds are idempotent: everything already present is a no-op.
        self.store
            .load(RdfSyntax::Turtle, output.graph.as_bytes())?;

        self.apply_kernel_deltas(tick_number).await?;

        let triples_after = self.store.triple_count()?;
        let delta = triples_after as i64 - triples_before as i64;
        let result = PhysicsResult {
            tick_number,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            triples_before,
            triples_after,
            delta,
            converged: delta == 0,
        };
        tracing::info!(
            delta = result.delta,
            converged = result.converged,
            "tick complete"
        );
        Ok(result)
    }

    /// Resolve and run the verb of every stateful node, applying each delta
    async fn apply_kernel_deltas(&self, tick_number: u64) -> KernelResult<()> {
        let query = format!(
            "SELECT DISTINCT ?s WHERE {{ ?s <{}> ?status }} ORDER BY ?s",
            vocab::kgc("status")
        );
        let result = self.store.query(&query)?;
        let subjects: Vec<String> = result
            .as_solutions()
            .unwrap_or_default()
            .iter()
            .filter_map(|row| row.get("s"))
            .filter_map(|t| t.as_iri().map(str::to_string))
            .collect();

        for subject in subjects {
            let Some(config) = self.driver.resolve_verb(self.store.as_ref(), &subject)? else {
                continue;
            };
            let ctx = KernelContext::new(&subject, format!("tick-{}", tick_number));
            let delta = execute_verb(self.store.as_ref(), &ctx, &config)?;
            if delta.is_empty() {
                continue;
            }
            match &self.applier {
                Some(applier) => applier(delta).await?,
                None => self.store.apply(&delta)?,
            }
        }
        Ok(())
    }

    /// Tick until the fixed point, failing if `max_ticks` is exhausted
    pub async fn run_to_completion(&self, max_ticks: u64) -> KernelResult<ConvergenceReport> {
        self.run_to_completion_with_cancel(max_ticks, || false)
            .await
    }

    /// `run_to_completion` honoring a cancellation signal between ticks
    pub async fn run_to_completion_with_cancel(
        &self,
        max_ticks: u64,
        cancelled: impl Fn() -> bool,
    ) -> KernelResult<ConvergenceReport> {
        let mut ticks = Vec::new();

        // A zero budget still measures: one probe tick decides whether the
        // state was already converged.
        let budget = max_ticks.max(1);
        for _ in 0..budget {
            if cancelled() {
                return Err(PhysicsError::Cancelled {
                    completed_ticks: ticks.len() as u64,
                });
            }
            let result = self.execute_tick().await?;
            let converged = result.converged;
            ticks.push(result);
            if converged {
                return Ok(ConvergenceReport {
                    ticks,
                    converged: true,
                });
            }
        }
        let final_delta = ticks.last().map(|t| t.delta).unwrap_or(0);
        Err(PhysicsError::Convergence {
            max_ticks,
            final_delta,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use kgc_store::{FixtureReasoner, OxigraphStore};

    fn executor_for(turtle: &str) -> (Arc<OxigraphStore>, TickExecutor) {
        let prefixed = format!("{}{}", vocab::turtle_prefixes(), turtle);
        let store = Arc::new(OxigraphStore::from_turtle(&prefixed).unwrap());
        let ontology = Arc::new(PhysicsOntology::load_default().unwrap());
        let executor = TickExecutor::new(
            store.clone(),
            Arc::new(FixtureReasoner::passthrough()),
            ontology,
        );
        (store, executor)
    }

    fn ask(store: &OxigraphStore, pattern: &str) -> bool {
        let query = format!("{}ASK {{ {} }}", vocab::sparql_prefixes(), pattern);
        store.query(&query).unwrap().as_boolean().unwrap()
    }

    #[tokio::test]
    async fn test_sequence_converges_in_two_ticks() {
        let (store, executor) = executor_for(
            r#"<urn:A> a yawl:Task ; kgc:status "Completed" ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:B> ] .
               <urn:B> a yawl:Task ; kgc:status "Pending" ."#,
        );
        let report = executor.run_to_completion(10).await.unwrap();
        assert!(report.converged);
        assert_eq!(report.ticks.len(), 2);
        assert!(report.ticks[0].delta >= 1);
        assert_eq!(report.ticks[1].delta, 0);
        assert!(ask(&store, r#"<urn:B> kgc:status "Active""#));
        assert!(ask(&store, r#"<urn:A> kgc:status "Archived""#));
    }

    #[tokio::test]
    async fn test_parallel_split_activates_three() {
        let (store, executor) = executor_for(
            r#"<urn:S> a yawl:Task ; kgc:status "Completed" ;
                      yawl:hasSplit yawl:ControlTypeAnd ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:B1> ] ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:B2> ] ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:B3> ] .
               <urn:B1> a yawl:Task ; kgc:status "Pending" .
               <urn:B2> a yawl:Task ; kgc:status "Pending" .
               <urn:B3> a yawl:Task ; kgc:status "Pending" ."#,
        );
        let result = executor.execute_tick().await.unwrap();
        assert!(result.delta >= 3);
        for successor in ["<urn:B1>", "<urn:B2>", "<urn:B3>"] {
            assert!(ask(&store, &format!(r#"{} kgc:status "Active""#, successor)));
        }
    }

    #[tokio::test]
    async fn test_and_join_waits_for_both_branches() {
        let (store, executor) = executor_for(
            r#"<urn:B1> a yawl:Task ; kgc:status "Completed" ;
                       yawl:flowsInto [ yawl:nextElementRef <urn:J> ] .
               <urn:B2> a yawl:Task ; kgc:status "Active" ;
                       yawl:flowsInto [ yawl:nextElementRef <urn:J> ] .
               <urn:J> a yawl:Task ; kgc:status "Pending" ;
                       yawl:hasJoin yawl:ControlTypeAnd ."#,
        );
        executor.run_to_completion(10).await.unwrap();
        assert!(!ask(&store, r#"<urn:J> kgc:status "Active""#));

        // Completing the second branch lets the next tick fire the join.
        store
            .update(&format!(
                "{}INSERT DATA {{ <urn:B2> kgc:status \"Completed\" }}",
                vocab::sparql_prefixes()
            ))
            .unwrap();
        executor.run_to_completion(10).await.unwrap();
        assert!(ask(&store, r#"<urn:J> kgc:status "Active""#));
    }

    #[tokio::test]
    async fn test_xor_split_activates_exactly_one() {
        let (store, executor) = executor_for(
            r#"<urn:D> a yawl:Task ; kgc:status "Completed" ;
                      yawl:hasSplit yawl:ControlTypeXor ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:Y> ; yawl:hasPredicate "true" ] ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:N> ; yawl:isDefaultFlow "true" ] .
               <urn:Y> a yawl:Task ; kgc:status "Pending" .
               <urn:N> a yawl:Task ; kgc:status "Pending" ."#,
        );
        executor.run_to_completion(10).await.unwrap();
        let query = format!(
            "{}SELECT (COUNT(?t) AS ?n) WHERE {{ ?t kgc:status \"Active\" \
             FILTER(?t IN (<urn:Y>, <urn:N>)) }}",
            vocab::sparql_prefixes()
        );
        let result = store.query(&query).unwrap();
        let n = result.as_solutions().unwrap()[0]
            .get("n")
            .unwrap()
            .as_integer()
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn test_converged_state_is_idempotent() {
        let (_, executor) = executor_for(r#"<urn:B> a yawl:Task ; kgc:status "Pending" ."#);
        let first = executor.run_to_completion(5).await.unwrap();
        assert_eq!(first.ticks.len(), 1);
        let second = executor.run_to_completion(5).await.unwrap();
        assert!(second.converged);
        assert_eq!(second.ticks.len(), 1);
        assert_eq!(second.ticks[0].delta, 0);
    }

    #[tokio::test]
    async fn test_zero_budget_fails_on_unconverged_state() {
        let (_, executor) = executor_for(
            r#"<urn:A> a yawl:Task ; kgc:status "Completed" ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:B> ] .
               <urn:B> a yawl:Task ; kgc:status "Pending" ."#,
        );
        let result = executor.run_to_completion(0).await;
        match result {
            Err(PhysicsError::Convergence {
                max_ticks,
                final_delta,
            }) => {
                assert_eq!(max_ticks, 0);
                assert!(final_delta > 0);
            }
            other => panic!("expected convergence error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unavailable_reasoner_is_fatal() {
        let prefixed = format!(
            "{}<urn:B> a yawl:Task ; kgc:status \"Pending\" .",
            vocab::turtle_prefixes()
        );
        let store = Arc::new(OxigraphStore::from_turtle(&prefixed).unwrap());
        let ontology = Arc::new(PhysicsOntology::load_default().unwrap());
        let executor =
            TickExecutor::new(store, Arc::new(FixtureReasoner::unavailable()), ontology);
        let result = executor.execute_tick().await;
        assert!(matches!(result, Err(PhysicsError::Reasoner(_))));
    }

    #[tokio::test]
    async fn test_cancellation_between_ticks() {
        let (_, executor) = executor_for(
            r#"<urn:A> a yawl:Task ; kgc:status "Completed" ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:B> ] .
               <urn:B> a yawl:Task ; kgc:status "Pending" ."#,
        );
        let result = executor
            .run_to_completion_with_cancel(10, || true)
            .await;
        assert!(matches!(
            result,
            Err(PhysicsError::Cancelled { completed_ticks: 0 })
        ));
    }

    #[tokio::test]
    async fn test_reasoner_closure_is_loaded() {
        // A reasoner that deduces a bookkeeping triple; the tick loads it.
        let prefixed = format!(
            "{}<urn:B> a yawl:Task ; kgc:status \"Pending\" .",
            vocab::turtle_prefixes()
        );
        let store = Arc::new(OxigraphStore::from_turtle(&prefixed).unwrap());
        let ontology = Arc::new(PhysicsOntology::load_default().unwrap());
        let reasoner = FixtureReasoner::new(|state, _| {
            format!(
                "{}\n<urn:B> <https://kgc.dev/ontology#hasCompletedPredecessor> <urn:A> .",
                state
            )
        });
        let executor = TickExecutor::new(store.clone(), Arc::new(reasoner), ontology);
        let result = executor.execute_tick().await.unwrap();
        assert!(result.delta >= 1);
        assert!(ask(&store, "<urn:B> kgc:hasCompletedPredecessor <urn:A>"));
    }

    #[tokio::test]
    async fn test_cancel_task_scenario() {
        let (store, executor) = executor_for(
            r#"<urn:X> a yawl:Task ; kgc:status "Active" ;
                      kgc:cancelRequested "self" ;
                      kgc:hasToken <urn:X#token-1> .
               <urn:X#i0> a kgc:MIInstance ; kgc:baseTask <urn:X> ;
                      kgc:status "Active" ; kgc:hasToken <urn:X#token-2> ."#,
        );
        executor.run_to_completion(10).await.unwrap();
        assert!(ask(&store, r#"<urn:X> kgc:status "Cancelled""#));
        assert!(ask(&store, r#"<urn:X#i0> kgc:status "Cancelled""#));
        assert!(!ask(&store, "<urn:X> kgc:hasToken ?tok"));
        assert!(!ask(&store, "<urn:X#i0> kgc:hasToken ?tok"));
    }
}
