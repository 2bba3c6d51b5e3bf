//! The five-verb kernel and its generic template executor
//!
//! Every verb is a pure function (snapshot, subject, context, config) →
//! [`QuadDelta`]: it reads only the snapshot it is handed and touches no
//! global state, so the same inputs always produce the same delta. Verbs
//! differ only in which templates they invoke and how they assemble
//! additions and removals; the ontology decides everything else.
//!
//! Template conventions:
//! - templates are ASK, SELECT or CONSTRUCT; verbs never run updates
//! - CONSTRUCT output is asserted, except reset templates whose output is
//!   retracted (their role is token clearing)
//! - cancellation templates SELECT the target nodes; the kernel retracts
//!   their tokens and asserts `Cancelled`

use crate::driver::{Verb, VerbConfig};
use crate::error::{KernelResult, PhysicsError};
use crate::status::{effective_status, TaskStatus};
use kgc_store::{vocab, Quad, QuadDelta, RdfStore, ResultSet, Term};

/// Placeholder values substituted into templates before execution
#[derive(Debug, Clone)]
pub struct KernelContext {
    /// Subject IRI the verb acts on
    pub subject: String,
    /// Transaction id, unique per activation
    pub tx_id: String,
    /// UTC timestamp in RFC 3339
    pub now: String,
    /// Target IRIs computed by a prior selection step
    pub targets: Vec<String>,
    /// Instance index for multi-instance materialization
    pub iterator: Option<u64>,
    /// Evaluated flow predicate expression
    pub predicate_eval: Option<String>,
}

impl KernelContext {
    pub fn new(subject: impl Into<String>, tx_id: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            tx_id: tx_id.into(),
            now: chrono::Utc::now().to_rfc3339(),
            targets: Vec::new(),
            iterator: None,
            predicate_eval: None,
        }
    }

    fn with_targets(&self, targets: Vec<String>) -> Self {
        let mut ctx = self.clone();
        ctx.targets = targets;
        ctx
    }

    fn with_iterator(&self, index: u64) -> Self {
        let mut ctx = self.clone();
        ctx.iterator = Some(index);
        ctx
    }
}

/// Substitute placeholders into a template and prepend the standard
/// prefix header
pub fn substitute(template: &str, ctx: &KernelContext) -> String {
    let targets = ctx
        .targets
        .iter()
        .map(|t| format!("<{}>", t))
        .collect::<Vec<_>>()
        .join(" ");
    let body = template
        .replace("%SUBJECT%", &format!("<{}>", ctx.subject))
        .replace("%TX_ID%", &ctx.tx_id)
        .replace("%NOW%", &ctx.now)
        .replace("%TARGETS%", &targets)
        .replace(
            "%ITERATOR%",
            &ctx.iterator.map(|i| i.to_string()).unwrap_or_default(),
        )
        .replace(
            "%PREDICATE_EVAL%",
            ctx.predicate_eval.as_deref().unwrap_or("false"),
        );
    format!("{}{}", vocab::sparql_prefixes(), body)
}

/// Run one template against the snapshot and hand back its raw result
pub fn execute_template(
    store: &dyn RdfStore,
    template: &str,
    ctx: &KernelContext,
) -> KernelResult<ResultSet> {
    let query = substitute(template, ctx);
    store
        .query(&query)
        .map_err(|e| PhysicsError::Template(e.to_string()))
}

/// Dispatch on the resolved verb
pub fn execute_verb(
    store: &dyn RdfStore,
    ctx: &KernelContext,
    config: &VerbConfig,
) -> KernelResult<QuadDelta> {
    let span = tracing::debug_span!("verb", verb = config.verb.name(), subject = %ctx.subject);
    let _guard = span.enter();
    match config.verb {
        Verb::Transmute => transmute(store, ctx, config),
        Verb::Copy => copy(store, ctx, config),
        Verb::Filter => filter(store, ctx, config),
        Verb::Await => await_threshold(store, ctx, config),
        Verb::Void => void(store, ctx, config),
    }
}

/// Transmute: move activation along a single flow; the source archives
pub fn transmute(
    store: &dyn RdfStore,
    ctx: &KernelContext,
    config: &VerbConfig,
) -> KernelResult<QuadDelta> {
    let template = required(config, config.execution_template.as_deref(), "execution")?;
    let additions = constructed(store, template, ctx)?;
    QuadDelta::additions_only(additions).map_err(Into::into)
}

/// Copy: divergence; token instantiation on N successors and, for
/// multi-instance patterns, materialization of instance nodes
pub fn copy(
    store: &dyn RdfStore,
    ctx: &KernelContext,
    config: &VerbConfig,
) -> KernelResult<QuadDelta> {
    let template = required(config, config.execution_template.as_deref(), "execution")?;
    let mut additions = constructed(store, template, ctx)?;

    let cardinality = match config.cardinality_template.as_deref() {
        Some(t) => integer_result(store, t, ctx)?,
        None => None,
    };
    // With no cardinality the binding rows decide how many instances exist.
    let count = match (cardinality, config.binding_template.as_deref()) {
        (Some(n), _) => Some(n),
        (None, Some(t)) => Some(selected_rows(store, t, ctx)?.len() as u64),
        (None, None) => None,
    };

    if let (Some(instance_template), Some(count)) =
        (config.instance_template.as_deref(), count)
    {
        tracing::debug!(count, "materializing instances");
        for index in 0..count {
            let instance_ctx = ctx.with_iterator(index);
            additions.extend(constructed(store, instance_template, &instance_ctx)?);
        }
    }

    QuadDelta::additions_only(dedup_quads(additions)).map_err(Into::into)
}

/// Filter: selection; only the flows the selection template picks activate
pub fn filter(
    store: &dyn RdfStore,
    ctx: &KernelContext,
    config: &VerbConfig,
) -> KernelResult<QuadDelta> {
    let selection = required(config, config.selection_template.as_deref(), "selection")?;
    let mut ctx = ctx.clone();
    ctx.predicate_eval = Some(loop_predicate(store, &ctx.subject)?);

    let selected = constructed(store, selection, &ctx)?;
    let selected_flow = vocab::kgc("selectedFlow");
    let targets: Vec<String> = selected
        .iter()
        .filter(|q| q.predicate.as_iri() == Some(selected_flow.as_str()))
        .filter_map(|q| q.object.as_iri().map(str::to_string))
        .collect();
    if targets.is_empty() {
        return Ok(QuadDelta::empty());
    }

    let execution = required(config, config.execution_template.as_deref(), "execution")?;
    let target_ctx = ctx.with_targets(targets);
    let mut additions = constructed(store, execution, &target_ctx)?;
    additions.extend(selected);
    QuadDelta::additions_only(dedup_quads(additions)).map_err(Into::into)
}

/// Await: synchronization; fires when the threshold holds, optionally
/// clearing incoming tokens
pub fn await_threshold(
    store: &dyn RdfStore,
    ctx: &KernelContext,
    config: &VerbConfig,
) -> KernelResult<QuadDelta> {
    let threshold = required(config, config.threshold_template.as_deref(), "threshold")?;
    if !asked(store, threshold, ctx)? {
        return Ok(QuadDelta::empty());
    }
    if let Some(completion) = config.completion_template.as_deref() {
        if !asked(store, completion, ctx)? {
            return Ok(QuadDelta::empty());
        }
    }

    let execution = required(config, config.execution_template.as_deref(), "execution")?;
    let additions = constructed(store, execution, ctx)?;

    let removals = if config.reset_on_fire {
        match config.reset_template.as_deref() {
            Some(reset) => constructed(store, reset, ctx)?,
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    QuadDelta::checked(additions, removals).map_err(Into::into)
}

/// Void: cancellation; the scope template enumerates the targets whose
/// tokens and dependent state are removed
pub fn void(
    store: &dyn RdfStore,
    ctx: &KernelContext,
    config: &VerbConfig,
) -> KernelResult<QuadDelta> {
    let template = required(
        config,
        config.cancellation_template.as_deref(),
        "cancellation",
    )?;
    let rows = selected_rows(store, template, ctx)?;

    let mut additions = Vec::new();
    let mut removals = Vec::new();
    for row in rows {
        let Some(target) = row.get("target").and_then(|t| t.as_iri()) else {
            continue;
        };
        // Cancelled is reachable from any non-terminal state only.
        if let Some(status) = effective_status(store, target)? {
            if status.is_terminal() {
                continue;
            }
        }
        let cancelled = Quad::triple(
            Term::iri(target),
            Term::iri(vocab::kgc("status")),
            Term::literal(TaskStatus::Cancelled.to_string()),
        );
        if !additions.contains(&cancelled) {
            additions.push(cancelled);
        }
        let token_query = format!(
            "SELECT ?tok WHERE {{ <{}> <{}> ?tok }}",
            target,
            vocab::kgc("hasToken")
        );
        let tokens = store
            .query(&token_query)
            .map_err(|e| PhysicsError::Template(e.to_string()))?;
        for token_row in tokens.as_solutions().unwrap_or_default() {
            if let Some(token) = token_row.get("tok") {
                removals.push(Quad::triple(
                    Term::iri(target),
                    Term::iri(vocab::kgc("hasToken")),
                    token.clone(),
                ));
            }
        }
    }
    QuadDelta::checked(additions, removals).map_err(Into::into)
}

// --- template plumbing ---

fn dedup_quads(quads: Vec<Quad>) -> Vec<Quad> {
    let mut seen = std::collections::HashSet::new();
    quads.into_iter().filter(|q| seen.insert(q.clone())).collect()
}

fn required<'a>(
    config: &VerbConfig,
    template: Option<&'a str>,
    name: &'static str,
) -> KernelResult<&'a str> {
    template.ok_or(PhysicsError::MissingTemplate {
        verb: config.verb.name(),
        template: name,
    })
}

fn constructed(
    store: &dyn RdfStore,
    template: &str,
    ctx: &KernelContext,
) -> KernelResult<Vec<Quad>> {
    match execute_template(store, template, ctx)? {
        ResultSet::Graph(quads) => Ok(quads),
        other => Err(PhysicsError::Template(format!(
            "expected CONSTRUCT output, got {:?}",
            other
        ))),
    }
}

fn asked(store: &dyn RdfStore, template: &str, ctx: &KernelContext) -> KernelResult<bool> {
    match execute_template(store, template, ctx)? {
        ResultSet::Boolean(b) => Ok(b),
        other => Err(PhysicsError::Template(format!(
            "expected ASK output, got {:?}",
            other
        ))),
    }
}

fn selected_rows(
    store: &dyn RdfStore,
    template: &str,
    ctx: &KernelContext,
) -> KernelResult<Vec<kgc_store::Solution>> {
    match execute_template(store, template, ctx)? {
        ResultSet::Solutions(rows) => Ok(rows),
        other => Err(PhysicsError::Template(format!(
            "expected SELECT output, got {:?}",
            other
        ))),
    }
}

fn integer_result(
    store: &dyn RdfStore,
    template: &str,
    ctx: &KernelContext,
) -> KernelResult<Option<u64>> {
    let rows = selected_rows(store, template, ctx)?;
    Ok(rows
        .first()
        .and_then(|row| row.get("n"))
        .and_then(|t| t.as_integer())
        .map(|n| n.max(0) as u64))
}

/// The loop predicate literal on the subject, already evaluated by the
/// ingestion layer to a boolean expression the template can splice
fn loop_predicate(store: &dyn RdfStore, subject: &str) -> KernelResult<String> {
    let query = format!(
        "SELECT ?p WHERE {{ <{}> <{}> ?p }}",
        subject,
        vocab::kgc("loopPredicate")
    );
    let result = store
        .query(&query)
        .map_err(|e| PhysicsError::Template(e.to_string()))?;
    Ok(result
        .as_solutions()
        .unwrap_or_default()
        .first()
        .and_then(|row| row.get("p"))
        .and_then(|t| t.as_literal())
        .map(str::to_string)
        .unwrap_or_else(|| "false".to_string()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::driver::SemanticDriver;
    use crate::ontology::PhysicsOntology;
    use kgc_store::OxigraphStore;
    use std::sync::Arc;

    fn state(turtle: &str) -> OxigraphStore {
        let prefixed = format!("{}{}", vocab::turtle_prefixes(), turtle);
        OxigraphStore::from_turtle(&prefixed).unwrap()
    }

    fn resolve(store: &OxigraphStore, subject: &str) -> VerbConfig {
        let driver = SemanticDriver::new(Arc::new(PhysicsOntology::load_default().unwrap()));
        driver.resolve_verb(store, subject).unwrap().unwrap()
    }

    fn run(store: &OxigraphStore, subject: &str) -> QuadDelta {
        let config = resolve(store, subject);
        let ctx = KernelContext::new(subject, "tx-test");
        execute_verb(store, &ctx, &config).unwrap()
    }

    fn has_status(delta: &QuadDelta, subject: &str, status: &str) -> bool {
        delta.additions().iter().any(|q| {
            q.subject == Term::iri(subject)
                && q.predicate == Term::iri(vocab::kgc("status"))
                && q.object == Term::literal(status)
        })
    }

    #[test]
    fn test_sequence_moves_activation() {
        let store = state(
            r#"<urn:A> a yawl:Task ; kgc:status "Completed" ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:B> ] .
               <urn:B> a yawl:Task ; kgc:status "Pending" ."#,
        );
        let delta = run(&store, "urn:A");
        assert!(has_status(&delta, "urn:B", "Active"));
        assert!(has_status(&delta, "urn:A", "Archived"));
        assert!(delta.removals().is_empty());
    }

    #[test]
    fn test_terminal_source_archives_without_successor() {
        let store = state(r#"<urn:End> a yawl:Task ; kgc:status "Completed" ."#);
        let delta = run(&store, "urn:End");
        assert!(has_status(&delta, "urn:End", "Archived"));
        assert_eq!(delta.additions().len(), 1);
    }

    #[test]
    fn test_parallel_split_activates_all_successors() {
        let store = state(
            r#"<urn:S> a yawl:Task ; kgc:status "Completed" ;
                      yawl:hasSplit yawl:ControlTypeAnd ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:B1> ] ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:B2> ] ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:B3> ] .
               <urn:B1> a yawl:Task ; kgc:status "Pending" .
               <urn:B2> a yawl:Task ; kgc:status "Pending" .
               <urn:B3> a yawl:Task ; kgc:status "Pending" ."#,
        );
        let delta = run(&store, "urn:S");
        for successor in ["urn:B1", "urn:B2", "urn:B3"] {
            assert!(has_status(&delta, successor, "Active"), "{}", successor);
        }
        assert!(has_status(&delta, "urn:S", "Archived"));
        assert!(delta.additions().len() >= 3);
    }

    #[test]
    fn test_and_join_holds_until_all_complete() {
        let store = state(
            r#"<urn:B1> a yawl:Task ; kgc:status "Completed" ;
                       yawl:flowsInto [ yawl:nextElementRef <urn:J> ] .
               <urn:B2> a yawl:Task ; kgc:status "Active" ;
                       yawl:flowsInto [ yawl:nextElementRef <urn:J> ] .
               <urn:J> a yawl:Task ; kgc:status "Pending" ;
                       yawl:hasJoin yawl:ControlTypeAnd ."#,
        );
        let delta = run(&store, "urn:J");
        assert!(delta.is_empty());
    }

    #[test]
    fn test_and_join_fires_when_all_complete() {
        let store = state(
            r#"<urn:B1> a yawl:Task ; kgc:status "Completed" ;
                       yawl:flowsInto [ yawl:nextElementRef <urn:J> ] .
               <urn:B2> a yawl:Task ; kgc:status "Completed" ;
                       yawl:flowsInto [ yawl:nextElementRef <urn:J> ] .
               <urn:J> a yawl:Task ; kgc:status "Pending" ;
                       yawl:hasJoin yawl:ControlTypeAnd ."#,
        );
        let delta = run(&store, "urn:J");
        assert!(has_status(&delta, "urn:J", "Active"));
    }

    #[test]
    fn test_xor_split_activates_exactly_one() {
        let store = state(
            r#"<urn:D> a yawl:Task ; kgc:status "Completed" ;
                      yawl:hasSplit yawl:ControlTypeXor ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:Y> ; yawl:hasPredicate "true" ] ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:N> ; yawl:isDefaultFlow "true" ] .
               <urn:Y> a yawl:Task ; kgc:status "Pending" .
               <urn:N> a yawl:Task ; kgc:status "Pending" ."#,
        );
        let delta = run(&store, "urn:D");
        let y_active = has_status(&delta, "urn:Y", "Active");
        let n_active = has_status(&delta, "urn:N", "Active");
        assert!(y_active && !n_active);
    }

    #[test]
    fn test_xor_split_falls_back_to_default() {
        let store = state(
            r#"<urn:D> a yawl:Task ; kgc:status "Completed" ;
                      yawl:hasSplit yawl:ControlTypeXor ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:Y> ; yawl:hasPredicate "false" ] ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:N> ; yawl:isDefaultFlow "true" ] .
               <urn:Y> a yawl:Task ; kgc:status "Pending" .
               <urn:N> a yawl:Task ; kgc:status "Pending" ."#,
        );
        let delta = run(&store, "urn:D");
        assert!(!has_status(&delta, "urn:Y", "Active"));
        assert!(has_status(&delta, "urn:N", "Active"));
    }

    #[test]
    fn test_void_cancels_task_and_instances() {
        let store = state(
            r#"<urn:X> a yawl:Task ; kgc:status "Active" ;
                      kgc:cancelRequested "self" ;
                      kgc:hasToken <urn:X#token-1> .
               <urn:X#i0> a kgc:MIInstance ; kgc:baseTask <urn:X> ;
                      kgc:status "Active" ; kgc:hasToken <urn:X#token-2> ."#,
        );
        let delta = run(&store, "urn:X");
        assert!(has_status(&delta, "urn:X", "Cancelled"));
        assert!(has_status(&delta, "urn:X#i0", "Cancelled"));
        assert_eq!(delta.removals().len(), 2);
        assert!(delta
            .removals()
            .iter()
            .all(|q| q.predicate == Term::iri(vocab::kgc("hasToken"))));
    }

    #[test]
    fn test_void_skips_terminal_targets() {
        let store = state(
            r#"<urn:X> a yawl:Task ; kgc:status "Active" ; kgc:status "Archived" ;
                      kgc:cancelRequested "self" ."#,
        );
        let delta = run(&store, "urn:X");
        assert!(delta.is_empty());
    }

    #[test]
    fn test_static_instances_materialize() {
        let store = state(
            r#"<urn:M> a yawl:Task ; kgc:status "Completed" ;
                      kgc:instanceMode "static" ;
                      kgc:instanceCount 3 ."#,
        );
        let delta = run(&store, "urn:M");
        let instances: Vec<_> = delta
            .additions()
            .iter()
            .filter(|q| {
                q.predicate == Term::iri(vocab::rdf("type"))
                    && q.object == Term::iri(vocab::kgc("MIInstance"))
            })
            .collect();
        assert_eq!(instances.len(), 3);
        assert!(has_status(&delta, "urn:M", "Waiting"));
    }

    #[test]
    fn test_instances_bind_data_items() {
        let store = state(
            r#"<urn:M> a yawl:Task ; kgc:status "Completed" ;
                      kgc:instanceMode "data" ;
                      kgc:dataItem "alpha" , "beta" ."#,
        );
        let delta = run(&store, "urn:M");
        let bound: Vec<_> = delta
            .additions()
            .iter()
            .filter(|q| q.predicate == Term::iri(vocab::kgc("boundData")))
            .collect();
        assert_eq!(bound.len(), 2);
    }

    #[test]
    fn test_discriminator_clears_tokens_on_fire() {
        let store = state(
            r#"<urn:B1> a yawl:Task ; kgc:status "Completed" ; kgc:hasToken <urn:tok1> ;
                       yawl:flowsInto [ yawl:nextElementRef <urn:J> ] .
               <urn:B2> a yawl:Task ; kgc:status "Active" ; kgc:hasToken <urn:tok2> ;
                       yawl:flowsInto [ yawl:nextElementRef <urn:J> ] .
               <urn:J> a yawl:Task ; kgc:status "Pending" ;
                       kgc:joinBehavior "discriminator" ."#,
        );
        let delta = run(&store, "urn:J");
        assert!(has_status(&delta, "urn:J", "Active"));
        assert_eq!(delta.removals().len(), 2);
    }

    #[test]
    fn test_missing_execution_template_is_fatal() {
        let store = state(r#"<urn:A> a yawl:Task ; kgc:status "Completed" ."#);
        let mut config = resolve(&store, "urn:A");
        config.execution_template = None;
        let ctx = KernelContext::new("urn:A", "tx-test");
        let result = execute_verb(&store, &ctx, &config);
        assert!(matches!(
            result,
            Err(PhysicsError::MissingTemplate { .. })
        ));
    }

    #[test]
    fn test_verbs_are_pure() {
        let store = state(
            r#"<urn:A> a yawl:Task ; kgc:status "Completed" ;
                      yawl:flowsInto [ yawl:nextElementRef <urn:B> ] .
               <urn:B> a yawl:Task ; kgc:status "Pending" ."#,
        );
        let config = resolve(&store, "urn:A");
        let ctx = KernelContext::new("urn:A", "tx-fixed");
        let before = store.triple_count().unwrap();
        let first = execute_verb(&store, &ctx, &config).unwrap();
        let second = execute_verb(&store, &ctx, &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.triple_count().unwrap(), before);
    }

    #[test]
    fn test_substitution_placeholders() {
        let ctx = KernelContext {
            subject: "urn:s".to_string(),
            tx_id: "tx-9".to_string(),
            now: "2026-01-01T00:00:00Z".to_string(),
            targets: vec!["urn:a".to_string(), "urn:b".to_string()],
            iterator: Some(4),
            predicate_eval: Some("true".to_string()),
        };
        let out = substitute(
            "%SUBJECT% %TX_ID% %NOW% %TARGETS% %ITERATOR% %PREDICATE_EVAL%",
            &ctx,
        );
        assert!(out.contains("<urn:s> tx-9 2026-01-01T00:00:00Z <urn:a> <urn:b> 4 true"));
    }
}
