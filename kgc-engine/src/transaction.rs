//! Transaction manager
//!
//! Wraps every state-changing operation: hooks fire in their phases around
//! the write, the four laws and active pack shapes gate the commit, and a
//! failed gate rolls the store back to the pre-transaction state. Writers
//! are serialized at the store boundary; the store's own apply is the only
//! exclusive section.

use crate::error::{EngineError, EngineResult};
use crate::policy::PolicyPackManager;
use chrono::{DateTime, Utc};
use kgc_hooks::{HookContext, HookPipeline, Phase};
use kgc_lockchain::Receipt;
use kgc_physics::PhysicsOntology;
use kgc_store::{QuadDelta, RdfStore};
use kgc_validation::{InvariantValidator, ShaclValidator, Violation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Transaction identifier
pub type TxnId = Uuid;

/// Transaction lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnState {
    Open,
    Preparing,
    Committed,
    Aborted,
}

/// One write batch with its audit trail
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TxnId,
    pub author: String,
    pub reason: String,
    pub started_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
    pub writes: QuadDelta,
    pub hook_receipts: Vec<Receipt>,
    pub state: TxnState,
}

/// Coordinates transactions over the shared store
pub struct TransactionManager {
    store: Arc<dyn RdfStore>,
    ontology: Arc<PhysicsOntology>,
    pipeline: Arc<HookPipeline>,
    validator: InvariantValidator,
    policy: Arc<PolicyPackManager>,
    transactions: Mutex<HashMap<TxnId, Transaction>>,
}

impl TransactionManager {
    pub fn new(
        store: Arc<dyn RdfStore>,
        ontology: Arc<PhysicsOntology>,
        pipeline: Arc<HookPipeline>,
        validator: InvariantValidator,
        policy: Arc<PolicyPackManager>,
    ) -> Self {
        Self {
            store,
            ontology,
            pipeline,
            validator,
            policy,
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Open a transaction on write intent
    pub fn begin(&self, author: impl Into<String>, reason: impl Into<String>) -> TxnId {
        let txn = Transaction {
            id: Uuid::new_v4(),
            author: author.into(),
            reason: reason.into(),
            started_at: Utc::now(),
            committed_at: None,
            writes: QuadDelta::empty(),
            hook_receipts: Vec::new(),
            state: TxnState::Open,
        };
        let id = txn.id;
        tracing::debug!(txn_id = %id, "transaction opened");
        self.transactions.lock().insert(id, txn);
        id
    }

    /// Stage a delta: batch bound and predicate whitelist checked up front
    pub fn stage(&self, txn_id: TxnId, delta: QuadDelta) -> EngineResult<()> {
        let mut transactions = self.transactions.lock();
        let txn = Self::open_txn(&mut transactions, txn_id)?;

        let merged = txn
            .writes
            .clone()
            .merge(delta)
            .map_err(|e| hermeticity_violation(e.to_string()))?;
        let violations = self.validator.validate_hermeticity(&merged);
        if let Some(violation) = violations.into_iter().next() {
            return Err(EngineError::Invariant(violation));
        }
        txn.writes = merged;
        Ok(())
    }

    /// Run PRE_TRANSACTION hooks; a veto aborts the transaction
    pub async fn prepare(&self, txn_id: TxnId) -> EngineResult<TxnState> {
        let (writes, author) = {
            let mut transactions = self.transactions.lock();
            let txn = Self::open_txn(&mut transactions, txn_id)?;
            txn.state = TxnState::Preparing;
            (txn.writes.clone(), txn.author.clone())
        };

        let ctx = HookContext::new(self.store.clone(), writes, txn_id.to_string(), author);
        let pre_validation = self
            .pipeline
            .execute_phase(Phase::PreValidation, &ctx, true)
            .await?;
        self.pipeline
            .execute_phase(Phase::PostValidation, &ctx, false)
            .await?;
        let pre_transaction = self
            .pipeline
            .execute_phase(Phase::PreTransaction, &ctx, true)
            .await?;
        self.record_receipts(txn_id, &ctx);

        let vetoed = ctx.should_rollback()
            || pre_validation
                .iter()
                .chain(&pre_transaction)
                .any(|o| !o.succeeded());
        if vetoed {
            tracing::warn!(txn_id = %txn_id, "transaction vetoed in PRE_TRANSACTION");
            self.abort(txn_id, "vetoed in PRE_TRANSACTION").await?;
            return Ok(TxnState::Aborted);
        }
        Ok(TxnState::Preparing)
    }

    /// Apply the writes, run the post phases and validate; rollback on any
    /// violation
    pub async fn commit(&self, txn_id: TxnId) -> EngineResult<Transaction> {
        let state = self.state(txn_id)?;
        if state == TxnState::Open {
            if self.prepare(txn_id).await? == TxnState::Aborted {
                return Err(EngineError::Transaction(
                    "transaction was vetoed before commit".to_string(),
                ));
            }
        } else if state != TxnState::Preparing {
            return Err(EngineError::Transaction(format!(
                "transaction {} is not open",
                txn_id
            )));
        }

        let (writes, author, started_at) = {
            let transactions = self.transactions.lock();
            let txn = transactions
                .get(&txn_id)
                .ok_or_else(|| unknown_txn(txn_id))?;
            (txn.writes.clone(), txn.author.clone(), txn.started_at)
        };

        self.store.apply(&writes)?;

        let ctx = HookContext::new(
            self.store.clone(),
            writes.clone(),
            txn_id.to_string(),
            author,
        );
        let post_commit = self
            .pipeline
            .execute_phase(Phase::PostCommit, &ctx, false)
            .await?;
        let post_txn = self
            .pipeline
            .execute_phase(Phase::PostTransaction, &ctx, false)
            .await?;
        self.record_receipts(txn_id, &ctx);

        let hook_failure = post_commit
            .iter()
            .chain(&post_txn)
            .find(|o| !o.succeeded() && !self.policy.is_resilient(&o.hook_id));
        if let Some(outcome) = hook_failure {
            self.rollback(txn_id, &writes).await?;
            return Err(EngineError::Transaction(format!(
                "hook {} failed after commit",
                outcome.hook_id
            )));
        }

        match self.validate(&writes, started_at) {
            Ok(None) => {}
            Ok(Some(violation)) => {
                self.rollback(txn_id, &writes).await?;
                return Err(EngineError::Invariant(violation));
            }
            Err(error) => {
                self.rollback(txn_id, &writes).await?;
                return Err(error);
            }
        }

        let mut transactions = self.transactions.lock();
        let txn = transactions
            .get_mut(&txn_id)
            .ok_or_else(|| unknown_txn(txn_id))?;
        txn.state = TxnState::Committed;
        txn.committed_at = Some(Utc::now());
        tracing::info!(txn_id = %txn_id, writes = txn.writes.len(), "transaction committed");
        Ok(txn.clone())
    }

    /// Discard staged writes and run ON_ERROR hooks
    pub async fn abort(&self, txn_id: TxnId, reason: &str) -> EngineResult<()> {
        let author = {
            let mut transactions = self.transactions.lock();
            let txn = transactions
                .get_mut(&txn_id)
                .ok_or_else(|| unknown_txn(txn_id))?;
            txn.state = TxnState::Aborted;
            txn.writes = QuadDelta::empty();
            txn.author.clone()
        };
        tracing::warn!(txn_id = %txn_id, reason, "transaction aborted");

        let ctx = HookContext::new(
            self.store.clone(),
            QuadDelta::empty(),
            txn_id.to_string(),
            author,
        );
        ctx.set_metadata("abort_reason", serde_json::Value::String(reason.to_string()));
        self.pipeline
            .execute_phase(Phase::OnError, &ctx, false)
            .await?;
        self.record_receipts(txn_id, &ctx);
        Ok(())
    }

    /// Snapshot of a transaction record
    pub fn get(&self, txn_id: TxnId) -> Option<Transaction> {
        self.transactions.lock().get(&txn_id).cloned()
    }

    /// begin → stage → prepare → commit in one call
    pub async fn apply_delta(
        &self,
        author: &str,
        reason: &str,
        delta: QuadDelta,
    ) -> EngineResult<Transaction> {
        let txn_id = self.begin(author, reason);
        if let Err(error) = self.stage(txn_id, delta) {
            self.abort(txn_id, "staging failed").await?;
            return Err(error);
        }
        self.commit(txn_id).await
    }

    fn validate(
        &self,
        writes: &QuadDelta,
        started_at: DateTime<Utc>,
    ) -> EngineResult<Option<Violation>> {
        let physics = self.ontology.graph();
        let report = self.validator.validate_all(
            self.store.as_ref(),
            physics.as_ref(),
            writes,
            Some(started_at),
        )?;
        if let Some(violation) = report.violations.into_iter().next() {
            return Ok(Some(violation));
        }
        for shapes in self.policy.active_shapes() {
            let shacl = ShaclValidator::validate_turtle(self.store.as_ref(), &shapes)?;
            if let Some(first) = shacl.violations.first() {
                return Ok(Some(Violation {
                    law: kgc_validation::Law::Typing,
                    subject: Some(first.focus.clone()),
                    message: format!("shape violation: {}", first.message),
                }));
            }
        }
        Ok(None)
    }

    async fn rollback(&self, txn_id: TxnId, writes: &QuadDelta) -> EngineResult<()> {
        let inverse = QuadDelta::checked(writes.removals().to_vec(), writes.additions().to_vec())
            .map_err(|e| EngineError::Transaction(format!("rollback failed: {}", e)))?;
        self.store.apply(&inverse)?;
        self.abort(txn_id, "commit validation failed").await
    }

    fn record_receipts(&self, txn_id: TxnId, ctx: &HookContext) {
        let receipts = ctx.prior_receipts();
        if receipts.is_empty() {
            return;
        }
        let mut transactions = self.transactions.lock();
        if let Some(txn) = transactions.get_mut(&txn_id) {
            txn.hook_receipts.extend(receipts);
        }
    }

    fn state(&self, txn_id: TxnId) -> EngineResult<TxnState> {
        self.transactions
            .lock()
            .get(&txn_id)
            .map(|t| t.state)
            .ok_or_else(|| unknown_txn(txn_id))
    }

    fn open_txn(
        transactions: &mut HashMap<TxnId, Transaction>,
        txn_id: TxnId,
    ) -> EngineResult<&mut Transaction> {
        let txn = transactions
            .get_mut(&txn_id)
            .ok_or_else(|| unknown_txn(txn_id))?;
        if txn.state != TxnState::Open {
            return Err(EngineError::Transaction(format!(
                "transaction {} is not open",
                txn_id
            )));
        }
        Ok(txn)
    }
}

fn unknown_txn(txn_id: TxnId) -> EngineError {
    EngineError::Transaction(format!("unknown transaction {}", txn_id))
}

fn hermeticity_violation(message: String) -> EngineError {
    EngineError::Invariant(Violation {
        law: kgc_validation::Law::Hermeticity,
        subject: None,
        message,
    })
}
