//! Hook execution pipeline
//!
//! Runs hooks of one phase in priority order. Each execution is wrapped,
//! in order, in: sandbox preflight, timeout, tracing span, error
//! sanitization, receipt emission. A failing lockchain append is fatal:
//! receipts are part of the durability contract.

use crate::condition::ConditionEvaluator;
use crate::context::HookContext;
use crate::definition::Hook;
use crate::error::{HookError, HookOpResult};
use crate::phase::Phase;
use crate::registry::HookRegistry;
use crate::sanitizer::{sanitize, ErrorEnvelope};
use kgc_lockchain::{Lockchain, Receipt, ReceiptDraft};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one hook in a pipeline run
#[derive(Debug, Clone)]
pub struct HookOutcome {
    pub hook_id: String,
    pub phase: Phase,
    pub fired: bool,
    pub result: Option<Value>,
    pub error: Option<ErrorEnvelope>,
    /// Emitted when the hook actually executed (fired or failed)
    pub receipt: Option<Receipt>,
    pub duration_ms: f64,
}

impl HookOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Executes hooks against the lockchain
pub struct HookPipeline {
    registry: Arc<HookRegistry>,
    evaluator: Arc<ConditionEvaluator>,
    chain: Arc<Lockchain>,
}

impl HookPipeline {
    pub fn new(
        registry: Arc<HookRegistry>,
        evaluator: Arc<ConditionEvaluator>,
        chain: Arc<Lockchain>,
    ) -> Self {
        Self {
            registry,
            evaluator,
            chain,
        }
    }

    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    pub fn evaluator(&self) -> &Arc<ConditionEvaluator> {
        &self.evaluator
    }

    /// Run every hook subscribed to `phase`, in priority order
    pub async fn execute_phase(
        &self,
        phase: Phase,
        ctx: &HookContext,
        stop_on_error: bool,
    ) -> HookOpResult<Vec<HookOutcome>> {
        let hooks = self.registry.hooks_for_phase(phase);
        self.execute_batch(&hooks, phase, ctx, stop_on_error).await
    }

    /// Run an explicit batch in the given order
    pub async fn execute_batch(
        &self,
        hooks: &[Hook],
        phase: Phase,
        ctx: &HookContext,
        stop_on_error: bool,
    ) -> HookOpResult<Vec<HookOutcome>> {
        let mut outcomes = Vec::with_capacity(hooks.len());
        for hook in hooks {
            let outcome = self.execute_hook(hook, phase, ctx).await?;
            let failed = !outcome.succeeded();
            outcomes.push(outcome);
            if failed && stop_on_error {
                tracing::warn!(phase = %phase, "stopping batch after hook failure");
                break;
            }
        }
        Ok(outcomes)
    }

    /// Run one hook: condition, sandbox, timed handler, receipt
    pub async fn execute_hook(
        &self,
        hook: &Hook,
        phase: Phase,
        ctx: &HookContext,
    ) -> HookOpResult<HookOutcome> {
        let span = tracing::info_span!("hook", hook_id = %hook.id, phase = %phase);
        let _guard = span.enter();
        let started = Instant::now();

        let (fired, condition_result) = match self.evaluator.evaluate(&hook.condition, ctx) {
            Ok(outcome) => outcome,
            Err(error) => {
                return self
                    .record_failure(hook, phase, ctx, Value::Null, error, started)
                    .await;
            }
        };
        if !fired {
            return Ok(HookOutcome {
                hook_id: hook.id.clone(),
                phase,
                fired: false,
                result: None,
                error: None,
                receipt: None,
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            });
        }

        let handler = match self.registry.handler(&hook.handler_ref) {
            Some(handler) => handler,
            None => {
                let error = HookError::Handler(format!(
                    "handler {} is not registered",
                    hook.handler_ref
                ));
                return self
                    .record_failure(hook, phase, ctx, condition_result, error, started)
                    .await;
            }
        };

        if let Err(violation) = hook.sandbox_profile.preflight(&handler.requirements) {
            return self
                .record_failure(hook, phase, ctx, condition_result, violation, started)
                .await;
        }

        let handler_ctx = ctx.with_condition_result(condition_result.clone());
        let budget = Duration::from_millis(hook.timeout_ms);
        let handler_result =
            match tokio::time::timeout(budget, (handler.func)(handler_ctx)).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(HookError::Handler(message)),
                Err(_) => Err(HookError::Timeout {
                    hook_id: hook.id.clone(),
                    timeout_ms: hook.timeout_ms,
                }),
            };

        match handler_result {
            Ok(value) => {
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                let receipt = self
                    .emit_receipt(hook, phase, ctx, condition_result.clone(), value.clone(), None, duration_ms)
                    .await?;
                Ok(HookOutcome {
                    hook_id: hook.id.clone(),
                    phase,
                    fired: true,
                    result: Some(value),
                    error: None,
                    receipt: Some(receipt),
                    duration_ms,
                })
            }
            Err(error) => {
                self.record_failure(hook, phase, ctx, condition_result, error, started)
                    .await
            }
        }
    }

    async fn record_failure(
        &self,
        hook: &Hook,
        phase: Phase,
        ctx: &HookContext,
        condition_result: Value,
        error: HookError,
        started: Instant,
    ) -> HookOpResult<HookOutcome> {
        let envelope = sanitize(error.code(), &error);
        tracing::warn!(hook_id = %hook.id, code = %envelope.code, "hook failed");
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let receipt = self
            .emit_receipt(
                hook,
                phase,
                ctx,
                condition_result,
                Value::Null,
                Some(envelope.message.clone()),
                duration_ms,
            )
            .await?;
        Ok(HookOutcome {
            hook_id: hook.id.clone(),
            phase,
            fired: true,
            result: None,
            error: Some(envelope),
            receipt: Some(receipt),
            duration_ms,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn emit_receipt(
        &self,
        hook: &Hook,
        phase: Phase,
        ctx: &HookContext,
        condition_result: Value,
        handler_result: Value,
        error: Option<String>,
        duration_ms: f64,
    ) -> HookOpResult<Receipt> {
        let receipt = self
            .chain
            .append(ReceiptDraft {
                hook_id: hook.id.clone(),
                phase: phase.to_string(),
                actor: ctx.actor.clone(),
                condition_result,
                handler_result,
                duration_ms,
                error,
            })
            .await?;
        ctx.push_receipt(receipt.clone());
        Ok(receipt)
    }
}

/// Sequential chain: each hook consumes the previous one's result
pub struct HookChain {
    hooks: Vec<Hook>,
}

/// Metadata key carrying the previous chain link's result
pub const PREVIOUS_RESULT: &str = "previous_result";

impl HookChain {
    pub fn new(hooks: Vec<Hook>) -> Self {
        Self { hooks }
    }

    /// Execute under one context; stops at the first failure
    pub async fn execute(
        &self,
        pipeline: &HookPipeline,
        phase: Phase,
        ctx: &HookContext,
    ) -> HookOpResult<Vec<HookOutcome>> {
        let mut outcomes = Vec::with_capacity(self.hooks.len());
        for hook in &self.hooks {
            let outcome = pipeline.execute_hook(hook, phase, ctx).await?;
            if let Some(result) = &outcome.result {
                ctx.set_metadata(PREVIOUS_RESULT, result.clone());
            }
            let failed = !outcome.succeeded();
            outcomes.push(outcome);
            if failed {
                break;
            }
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::condition::Condition;
    use crate::definition::{handler_fn, HandlerEntry};
    use crate::sandbox::{HandlerRequirements, SandboxProfile};
    use kgc_lockchain::LockchainConfig;
    use kgc_store::{OxigraphStore, QuadDelta};
    use serde_json::json;

    fn pipeline() -> HookPipeline {
        HookPipeline::new(
            Arc::new(HookRegistry::new()),
            Arc::new(ConditionEvaluator::new(64, Duration::from_millis(10))),
            Arc::new(Lockchain::new(LockchainConfig::default())),
        )
    }

    fn context() -> HookContext {
        HookContext::new(
            Arc::new(OxigraphStore::new().unwrap()),
            QuadDelta::empty(),
            "tx-1",
            "tester",
        )
    }

    fn hook(id: &str, priority: i32) -> Hook {
        Hook {
            id: id.to_string(),
            name: format!("Hook {}", id),
            priority,
            phases: vec![Phase::PostCommit],
            condition: Condition::AlwaysTrue,
            handler_ref: "ok".to_string(),
            timeout_ms: 100,
            sandbox_profile: SandboxProfile::default(),
            version: "1.0.0".to_string(),
        }
    }

    fn register_ok_handler(pipeline: &HookPipeline) {
        pipeline.registry().register_handler(
            "ok",
            HandlerEntry::new(handler_fn(|_ctx| async { Ok(json!({"ok": true})) })),
        );
    }

    #[tokio::test]
    async fn test_execution_emits_chained_receipts() {
        let pipeline = pipeline();
        register_ok_handler(&pipeline);
        pipeline.registry().register(hook("h1", 50)).unwrap();
        let ctx = context();

        for _ in 0..3 {
            let outcomes = pipeline
                .execute_phase(Phase::PostCommit, &ctx, true)
                .await
                .unwrap();
            assert_eq!(outcomes.len(), 1);
            assert!(outcomes[0].succeeded());
        }
        let receipts = ctx.prior_receipts();
        assert_eq!(receipts.len(), 3);
        assert_eq!(receipts[1].prev_hash, receipts[0].sha256_hash);
        assert_eq!(receipts[2].prev_hash, receipts[1].sha256_hash);
    }

    #[tokio::test]
    async fn test_priority_order_execution() {
        let pipeline = pipeline();
        register_ok_handler(&pipeline);
        pipeline.registry().register(hook("low", 10)).unwrap();
        pipeline.registry().register(hook("high", 90)).unwrap();
        let ctx = context();

        let outcomes = pipeline
            .execute_phase(Phase::PostCommit, &ctx, true)
            .await
            .unwrap();
        let order: Vec<&str> = outcomes.iter().map(|o| o.hook_id.as_str()).collect();
        assert_eq!(order, ["high", "low"]);
    }

    #[tokio::test]
    async fn test_timeout_is_its_own_error_kind() {
        let pipeline = pipeline();
        pipeline.registry().register_handler(
            "slow",
            HandlerEntry::new(handler_fn(|_ctx| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Value::Null)
            })),
        );
        let mut slow = hook("slow-hook", 50);
        slow.handler_ref = "slow".to_string();
        slow.timeout_ms = 20;
        pipeline.registry().register(slow).unwrap();
        let ctx = context();

        let outcomes = pipeline
            .execute_phase(Phase::PostCommit, &ctx, false)
            .await
            .unwrap();
        let envelope = outcomes[0].error.as_ref().unwrap();
        assert_eq!(envelope.code, "HookTimeout");
        assert!(outcomes[0].receipt.is_some());
    }

    #[tokio::test]
    async fn test_sandbox_violation_blocks_handler() {
        let pipeline = pipeline();
        pipeline.registry().register_handler(
            "greedy",
            HandlerEntry::with_requirements(
                handler_fn(|_ctx| async { Ok(Value::Null) }),
                HandlerRequirements {
                    needs_network: true,
                    ..HandlerRequirements::default()
                },
            ),
        );
        let mut greedy = hook("greedy-hook", 50);
        greedy.handler_ref = "greedy".to_string();
        pipeline.registry().register(greedy).unwrap();
        let ctx = context();

        let outcomes = pipeline
            .execute_phase(Phase::PostCommit, &ctx, false)
            .await
            .unwrap();
        assert_eq!(outcomes[0].error.as_ref().unwrap().code, "SandboxViolation");
    }

    #[tokio::test]
    async fn test_stop_on_error_skips_rest() {
        let pipeline = pipeline();
        register_ok_handler(&pipeline);
        pipeline.registry().register_handler(
            "boom",
            HandlerEntry::new(handler_fn(|_ctx| async {
                Err("handler exploded".to_string())
            })),
        );
        let mut failing = hook("failing", 90);
        failing.handler_ref = "boom".to_string();
        pipeline.registry().register(failing).unwrap();
        pipeline.registry().register(hook("after", 10)).unwrap();
        let ctx = context();

        let stopped = pipeline
            .execute_phase(Phase::PostCommit, &ctx, true)
            .await
            .unwrap();
        assert_eq!(stopped.len(), 1);

        let continued = pipeline
            .execute_phase(Phase::PostCommit, &ctx, false)
            .await
            .unwrap();
        assert_eq!(continued.len(), 2);
        assert!(continued[1].succeeded());
    }

    #[tokio::test]
    async fn test_unfired_condition_emits_no_receipt() {
        let pipeline = pipeline();
        register_ok_handler(&pipeline);
        let mut quiet = hook("quiet", 50);
        quiet.condition = Condition::SparqlAsk {
            query: "ASK { ?s <urn:never> ?o }".to_string(),
        };
        pipeline.registry().register(quiet).unwrap();
        let ctx = context();

        let outcomes = pipeline
            .execute_phase(Phase::PostCommit, &ctx, true)
            .await
            .unwrap();
        assert!(!outcomes[0].fired);
        assert!(outcomes[0].receipt.is_none());
        assert!(ctx.prior_receipts().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_flows_between_hooks() {
        let pipeline = pipeline();
        pipeline.registry().register_handler(
            "writer",
            HandlerEntry::new(handler_fn(|ctx| async move {
                ctx.set_metadata("seen", json!("by-writer"));
                Ok(Value::Null)
            })),
        );
        pipeline.registry().register_handler(
            "reader",
            HandlerEntry::new(handler_fn(|ctx| async move {
                Ok(ctx.metadata("seen").unwrap_or(Value::Null))
            })),
        );
        let mut writer = hook("writer", 90);
        writer.handler_ref = "writer".to_string();
        let mut reader = hook("reader", 10);
        reader.handler_ref = "reader".to_string();
        pipeline.registry().register(writer).unwrap();
        pipeline.registry().register(reader).unwrap();
        let ctx = context();

        let outcomes = pipeline
            .execute_phase(Phase::PostCommit, &ctx, true)
            .await
            .unwrap();
        assert_eq!(outcomes[1].result, Some(json!("by-writer")));
    }

    #[tokio::test]
    async fn test_chain_passes_previous_result() {
        let pipeline = pipeline();
        pipeline.registry().register_handler(
            "produce",
            HandlerEntry::new(handler_fn(|_ctx| async { Ok(json!(7)) })),
        );
        pipeline.registry().register_handler(
            "consume",
            HandlerEntry::new(handler_fn(|ctx| async move {
                let previous = ctx
                    .metadata(PREVIOUS_RESULT)
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                Ok(json!(previous * 2))
            })),
        );
        let mut first = hook("first", 50);
        first.handler_ref = "produce".to_string();
        let mut second = hook("second", 50);
        second.handler_ref = "consume".to_string();

        let chain = HookChain::new(vec![first, second]);
        let ctx = context();
        let outcomes = chain
            .execute(&pipeline, Phase::PostCommit, &ctx)
            .await
            .unwrap();
        assert_eq!(outcomes[1].result, Some(json!(14)));
    }
}
