//! Engine facade
//!
//! Wires the three process-scope mutable owners (store, registry,
//! lockchain) together with the physics, transactions and policy packs.
//! The engine is a plain value: construct as many as isolation requires.

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::policy::PolicyPackManager;
use crate::transaction::{Transaction, TransactionManager};
use kgc_hooks::{
    ConditionEvaluator, HookContext, HookPipeline, HookRegistry, Phase,
};
use kgc_lockchain::{Lockchain, LockchainConfig, ReceiptStorage};
use kgc_physics::{
    ConvergenceReport, PhysicsOntology, PhysicsResult, TickExecutor,
};
use kgc_store::{OxigraphStore, QuadDelta, RdfStore, RdfSyntax, Reasoner, ResultSet};
use kgc_validation::{InvariantValidator, PredicateWhitelist, ValidationReport};
use std::sync::Arc;
use std::time::Duration;

/// Actor name the engine signs its own transactions with
const ENGINE_ACTOR: &str = "kgc-engine";

/// A complete engine instance over one state graph
pub struct KgcEngine {
    config: EngineConfig,
    store: Arc<OxigraphStore>,
    ontology: Arc<PhysicsOntology>,
    registry: Arc<HookRegistry>,
    evaluator: Arc<ConditionEvaluator>,
    pipeline: Arc<HookPipeline>,
    chain: Arc<Lockchain>,
    policy: Arc<PolicyPackManager>,
    transactions: Arc<TransactionManager>,
    ticks: TickExecutor,
    cancel: CancelToken,
}

impl KgcEngine {
    /// Build an engine with the default physics ontology
    pub fn new(config: EngineConfig, reasoner: Arc<dyn Reasoner>) -> EngineResult<Self> {
        let ontology = Arc::new(PhysicsOntology::load_default()?);
        Self::with_ontology(config, reasoner, ontology)
    }

    /// Build an engine over a caller-supplied physics ontology
    pub fn with_ontology(
        config: EngineConfig,
        reasoner: Arc<dyn Reasoner>,
        ontology: Arc<PhysicsOntology>,
    ) -> EngineResult<Self> {
        let store = Arc::new(OxigraphStore::new()?);
        let registry = Arc::new(HookRegistry::new());
        let evaluator = Arc::new(ConditionEvaluator::new(
            config.hooks.condition_cache_capacity,
            Duration::from_millis(config.hooks.condition_cache_ttl_ms),
        ));
        evaluator.set_generation(ontology.generation());

        let chain = Arc::new(Lockchain::new(LockchainConfig {
            block_size: config.lockchain.block_size,
            retention: config.lockchain.retention,
            channel_capacity: config.lockchain.channel_capacity,
        }));
        if let Some(path) = &config.lockchain.storage_path {
            let storage = ReceiptStorage::open(path).map_err(EngineError::Lockchain)?;
            // The writer task outlives the engine handle; receipts drain
            // through the bounded channel until the chain drops.
            let _writer = chain.attach_storage(storage);
        }

        let pipeline = Arc::new(HookPipeline::new(
            registry.clone(),
            evaluator.clone(),
            chain.clone(),
        ));
        let policy = Arc::new(PolicyPackManager::new(registry.clone()));
        let validator = InvariantValidator::new(PredicateWhitelist::engine_default());
        let transactions = Arc::new(TransactionManager::new(
            store.clone(),
            ontology.clone(),
            pipeline.clone(),
            validator,
            policy.clone(),
        ));

        // Kernel deltas route through the transaction manager so every
        // mutation carries hooks, receipts and the four-law gate.
        let applier_manager = transactions.clone();
        let applier: kgc_physics::DeltaApplier = Arc::new(move |delta: QuadDelta| {
            let manager = applier_manager.clone();
            Box::pin(async move {
                manager
                    .apply_delta(ENGINE_ACTOR, "kernel delta", delta)
                    .await
                    .map(|_| ())
                    .map_err(|e| kgc_physics::PhysicsError::Apply(e.to_string()))
            })
        });
        let ticks = TickExecutor::new(store.clone(), reasoner, ontology.clone())
            .with_applier(applier);

        Ok(Self {
            config,
            store,
            ontology,
            registry,
            evaluator,
            pipeline,
            chain,
            policy,
            transactions,
            ticks,
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<OxigraphStore> {
        self.store.clone()
    }

    pub fn ontology(&self) -> &Arc<PhysicsOntology> {
        &self.ontology
    }

    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    pub fn pipeline(&self) -> &Arc<HookPipeline> {
        &self.pipeline
    }

    pub fn lockchain(&self) -> &Arc<Lockchain> {
        &self.chain
    }

    pub fn policy(&self) -> &Arc<PolicyPackManager> {
        &self.policy
    }

    pub fn transactions(&self) -> &Arc<TransactionManager> {
        &self.transactions
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Ingest a workflow specification: PRE_INGESTION may veto, ON_CHANGE
    /// observes what was loaded
    pub async fn load_workflow(&self, turtle: &str) -> EngineResult<u64> {
        let ctx = HookContext::new(
            self.store.clone(),
            QuadDelta::empty(),
            "ingestion",
            ENGINE_ACTOR,
        );
        self.pipeline
            .execute_phase(Phase::PreIngestion, &ctx, true)
            .await?;
        if ctx.should_rollback() {
            return Err(EngineError::Policy(
                "ingestion vetoed in PRE_INGESTION".to_string(),
            ));
        }
        let added = self.store.load(RdfSyntax::Turtle, turtle.as_bytes())?;
        self.pipeline
            .execute_phase(Phase::OnChange, &ctx, false)
            .await?;
        tracing::info!(added, "workflow loaded");
        Ok(added)
    }

    /// One application of physics
    pub async fn execute_tick(&self) -> EngineResult<PhysicsResult> {
        Ok(self.ticks.execute_tick().await?)
    }

    /// Tick to the fixed point under the configured budget
    pub async fn run_to_completion(&self) -> EngineResult<ConvergenceReport> {
        self.run_with_budget(self.config.max_ticks.0).await
    }

    /// Tick to the fixed point under an explicit budget, honoring the
    /// cancel token between ticks
    pub async fn run_with_budget(&self, max_ticks: u64) -> EngineResult<ConvergenceReport> {
        let cancel = self.cancel.clone();
        Ok(self
            .ticks
            .run_to_completion_with_cancel(max_ticks, move || cancel.is_cancelled())
            .await?)
    }

    /// Query the state graph with PRE_QUERY / POST_QUERY hooks around it
    pub async fn query(&self, sparql: &str) -> EngineResult<ResultSet> {
        let ctx = HookContext::new(
            self.store.clone(),
            QuadDelta::empty(),
            "query",
            ENGINE_ACTOR,
        );
        self.pipeline
            .execute_phase(Phase::PreQuery, &ctx, true)
            .await?;
        if ctx.should_rollback() {
            return Err(EngineError::Policy("query vetoed in PRE_QUERY".to_string()));
        }
        let result = self.store.query(sparql)?;
        self.pipeline
            .execute_phase(Phase::PostQuery, &ctx, false)
            .await?;
        Ok(result)
    }

    /// Apply an external delta under a full transaction
    pub async fn apply(&self, author: &str, reason: &str, delta: QuadDelta) -> EngineResult<Transaction> {
        self.transactions.apply_delta(author, reason, delta).await
    }

    /// Re-run the four laws on demand against the current state
    pub fn validate(&self) -> EngineResult<ValidationReport> {
        let validator = InvariantValidator::new(PredicateWhitelist::engine_default());
        let physics = self.ontology.graph();
        Ok(validator.validate_all(
            self.store.as_ref(),
            physics.as_ref(),
            &QuadDelta::empty(),
            None,
        )?)
    }

    /// Load a policy pack, stamping the engine's lockchain block size into
    /// its SLO map so the chosen value travels with the pack
    pub fn install_policy_pack(&self, mut pack: crate::policy::PolicyPack) -> EngineResult<()> {
        pack.slo
            .entry("lockchain.block_size".to_string())
            .or_insert(self.config.lockchain.block_size as f64);
        self.policy.load(pack)
    }

    /// Hot-reload the physics ontology under a new generation
    pub fn reload_physics(&self, physics_turtle: &str, rules: &str) -> EngineResult<u64> {
        let generation = self.ontology.reload(physics_turtle, rules)?;
        self.ticks.driver().invalidate();
        self.evaluator.set_generation(generation);
        Ok(generation)
    }
}
