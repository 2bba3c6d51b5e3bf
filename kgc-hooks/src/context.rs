//! Per-invocation hook context
//!
//! One context flows through a whole pipeline run. The metadata map is the
//! cross-hook communication channel (and carries the rollback veto); prior
//! receipts let later hooks see what already executed in this pipeline.

use kgc_lockchain::Receipt;
use kgc_store::{QuadDelta, RdfStore};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Metadata key a PRE_* hook sets to veto the transaction
pub const SHOULD_ROLLBACK: &str = "should_rollback";

/// Everything a condition or handler may see
#[derive(Clone)]
pub struct HookContext {
    /// The delta that triggered this pipeline
    pub delta: QuadDelta,
    /// Snapshot handle onto the state graph
    pub store: Arc<dyn RdfStore>,
    pub transaction_id: String,
    pub actor: String,
    /// Mutable cross-hook scratch space
    metadata: Arc<Mutex<serde_json::Map<String, Value>>>,
    /// Result set of the condition that fired this hook
    pub condition_result: Option<Value>,
    prior_receipts: Arc<Mutex<Vec<Receipt>>>,
}

impl HookContext {
    pub fn new(
        store: Arc<dyn RdfStore>,
        delta: QuadDelta,
        transaction_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            delta,
            store,
            transaction_id: transaction_id.into(),
            actor: actor.into(),
            metadata: Arc::new(Mutex::new(serde_json::Map::new())),
            condition_result: None,
            prior_receipts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A clone carrying this condition result; shares metadata and receipts
    pub fn with_condition_result(&self, result: Value) -> Self {
        let mut ctx = self.clone();
        ctx.condition_result = Some(result);
        ctx
    }

    pub fn set_metadata(&self, key: impl Into<String>, value: Value) {
        self.metadata.lock().insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<Value> {
        self.metadata.lock().get(key).cloned()
    }

    /// Veto the enclosing transaction (honored in PRE_* phases)
    pub fn request_rollback(&self, reason: &str) {
        self.metadata
            .lock()
            .insert(SHOULD_ROLLBACK.to_string(), Value::String(reason.to_string()));
    }

    pub fn should_rollback(&self) -> bool {
        self.metadata.lock().contains_key(SHOULD_ROLLBACK)
    }

    pub fn push_receipt(&self, receipt: Receipt) {
        self.prior_receipts.lock().push(receipt);
    }

    /// Receipts of hooks that already ran in this pipeline
    pub fn prior_receipts(&self) -> Vec<Receipt> {
        self.prior_receipts.lock().clone()
    }
}
