//! End-to-end engine scenarios
//!
//! Each test drives the full stack: workflow ingestion, physics ticks over
//! a fixture reasoner, transactional kernel deltas, hooks, receipts and
//! the four-law commit gate.

use kgc_engine::{EngineConfig, EngineError, KgcEngine};
use kgc_hooks::{
    handler_fn, Condition, HandlerEntry, Hook, Phase, SandboxProfile,
};
use kgc_lockchain::Lockchain;
use kgc_physics::{PhysicsError, PhysicsOntology, DEFAULT_PHYSICS, DEFAULT_RULES};
use kgc_store::{vocab, FixtureReasoner, Quad, QuadDelta, RdfStore, Term};
use kgc_validation::Law;
use serde_json::json;
use std::sync::Arc;

fn engine() -> KgcEngine {
    init_tracing();
    KgcEngine::new(
        EngineConfig::default(),
        Arc::new(FixtureReasoner::passthrough()),
    )
    .expect("engine construction")
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

async fn load(engine: &KgcEngine, turtle: &str) {
    let prefixed = format!("{}{}", vocab::turtle_prefixes(), turtle);
    engine.load_workflow(&prefixed).await.expect("workflow load");
}

async fn ask(engine: &KgcEngine, pattern: &str) -> bool {
    let query = format!("{}ASK {{ {} }}", vocab::sparql_prefixes(), pattern);
    engine
        .query(&query)
        .await
        .expect("ask query")
        .as_boolean()
        .expect("boolean result")
}

fn typed_quads(subject: &str, extra: usize) -> Vec<Quad> {
    let mut quads = vec![Quad::triple(
        Term::iri(subject),
        Term::iri(vocab::rdf("type")),
        Term::iri(vocab::yawl("Task")),
    )];
    for n in 0..extra {
        quads.push(Quad::triple(
            Term::iri(subject),
            Term::iri(vocab::kgc("dataItem")),
            Term::literal(format!("item-{}", n)),
        ));
    }
    quads
}

#[tokio::test]
async fn sequence_activates_successor() {
    let engine = engine();
    load(
        &engine,
        r#"<urn:A> a yawl:Task ; kgc:status "Completed" ;
                  yawl:flowsInto [ yawl:nextElementRef <urn:B> ] .
           <urn:B> a yawl:Task ; kgc:status "Pending" ."#,
    )
    .await;

    let report = engine.run_to_completion().await.expect("convergence");
    assert!(report.converged);
    assert!(ask(&engine, r#"<urn:B> kgc:status "Active""#).await);
    assert!(ask(&engine, r#"<urn:A> kgc:status "Archived""#).await);
}

#[tokio::test]
async fn parallel_split_activates_all_branches() {
    let engine = engine();
    load(
        &engine,
        r#"<urn:S> a yawl:Task ; kgc:status "Completed" ;
                  yawl:hasSplit yawl:ControlTypeAnd ;
                  yawl:flowsInto [ yawl:nextElementRef <urn:B1> ] ;
                  yawl:flowsInto [ yawl:nextElementRef <urn:B2> ] ;
                  yawl:flowsInto [ yawl:nextElementRef <urn:B3> ] .
           <urn:B1> a yawl:Task ; kgc:status "Pending" .
           <urn:B2> a yawl:Task ; kgc:status "Pending" .
           <urn:B3> a yawl:Task ; kgc:status "Pending" ."#,
    )
    .await;

    let result = engine.execute_tick().await.expect("tick");
    assert!(result.delta >= 3);
    for branch in ["<urn:B1>", "<urn:B2>", "<urn:B3>"] {
        assert!(ask(&engine, &format!(r#"{} kgc:status "Active""#, branch)).await);
    }
}

#[tokio::test]
async fn and_join_waits_for_all_branches() {
    let engine = engine();
    load(
        &engine,
        r#"<urn:B1> a yawl:Task ; kgc:status "Completed" ;
                   yawl:flowsInto [ yawl:nextElementRef <urn:J> ] .
           <urn:B2> a yawl:Task ; kgc:status "Active" ;
                   yawl:flowsInto [ yawl:nextElementRef <urn:J> ] .
           <urn:J> a yawl:Task ; kgc:status "Pending" ;
                   yawl:hasJoin yawl:ControlTypeAnd ."#,
    )
    .await;

    engine.run_to_completion().await.expect("first run");
    assert!(!ask(&engine, r#"<urn:J> kgc:status "Active""#).await);

    engine
        .apply(
            "tester",
            "complete second branch",
            QuadDelta::additions_only(vec![Quad::triple(
                Term::iri("urn:B2"),
                Term::iri(vocab::kgc("status")),
                Term::literal("Completed"),
            )])
            .expect("delta"),
        )
        .await
        .expect("branch completion");

    engine.run_to_completion().await.expect("second run");
    assert!(ask(&engine, r#"<urn:J> kgc:status "Active""#).await);
}

#[tokio::test]
async fn xor_split_activates_exactly_one() {
    let engine = engine();
    load(
        &engine,
        r#"<urn:D> a yawl:Task ; kgc:status "Completed" ;
                  yawl:hasSplit yawl:ControlTypeXor ;
                  yawl:flowsInto [ yawl:nextElementRef <urn:Y> ; yawl:hasPredicate "true" ] ;
                  yawl:flowsInto [ yawl:nextElementRef <urn:N> ; yawl:isDefaultFlow "true" ] .
           <urn:Y> a yawl:Task ; kgc:status "Pending" .
           <urn:N> a yawl:Task ; kgc:status "Pending" ."#,
    )
    .await;

    engine.run_to_completion().await.expect("convergence");
    let query = format!(
        "{}SELECT (COUNT(?t) AS ?n) WHERE {{ ?t kgc:status \"Active\" \
         FILTER(?t IN (<urn:Y>, <urn:N>)) }}",
        vocab::sparql_prefixes()
    );
    let result = engine.query(&query).await.expect("count query");
    let n = result.as_solutions().expect("rows")[0]
        .get("n")
        .and_then(|t| t.as_integer())
        .expect("count");
    assert_eq!(n, 1);
}

#[tokio::test]
async fn cancel_task_voids_tokens_and_instances() {
    let engine = engine();
    load(
        &engine,
        r#"<urn:X> a yawl:Task ; kgc:status "Active" ;
                  kgc:cancelRequested "self" ;
                  kgc:hasToken <urn:X#token-1> .
           <urn:X#i0> a kgc:MIInstance ; kgc:baseTask <urn:X> ;
                  kgc:status "Active" ; kgc:hasToken <urn:X#token-2> ."#,
    )
    .await;

    engine.run_to_completion().await.expect("convergence");
    assert!(ask(&engine, r#"<urn:X> kgc:status "Cancelled""#).await);
    assert!(ask(&engine, r#"<urn:X#i0> kgc:status "Cancelled""#).await);
    assert!(!ask(&engine, "<urn:X> kgc:hasToken ?tok").await);
    assert!(!ask(&engine, "<urn:X#i0> kgc:hasToken ?tok").await);
}

#[tokio::test]
async fn post_commit_hook_builds_a_lockchain() {
    let engine = engine();
    load(&engine, r#"<urn:T> a yawl:Task ; kgc:status "Pending" ."#).await;

    engine.registry().register_handler(
        "ok",
        HandlerEntry::new(handler_fn(|_ctx| async { Ok(json!({"ok": true})) })),
    );
    engine
        .registry()
        .register(Hook {
            id: "audit".to_string(),
            name: "Audit every commit".to_string(),
            priority: 50,
            phases: vec![Phase::PostCommit],
            condition: Condition::AlwaysTrue,
            handler_ref: "ok".to_string(),
            timeout_ms: 100,
            sandbox_profile: SandboxProfile::default(),
            version: "1.0.0".to_string(),
        })
        .expect("hook registration");

    for n in 0..3 {
        engine
            .apply(
                "tester",
                "marker",
                QuadDelta::additions_only(vec![Quad::triple(
                    Term::iri("urn:T"),
                    Term::iri(vocab::kgc("dataItem")),
                    Term::literal(format!("commit-{}", n)),
                )])
                .expect("delta"),
            )
            .await
            .expect("commit");
    }

    let receipts = engine.lockchain().window();
    assert_eq!(receipts.len(), 3);
    assert_eq!(receipts[1].prev_hash, receipts[0].sha256_hash);
    assert_eq!(receipts[2].prev_hash, receipts[1].sha256_hash);
    Lockchain::verify_sequence(&receipts).expect("chain verifies");

    // Tampering with the middle receipt invalidates its successor.
    let mut tampered = receipts.clone();
    tampered[1].actor = "mallory".to_string();
    assert!(Lockchain::verify_sequence(&tampered).is_err());
}

#[tokio::test]
async fn completeness_violation_aborts_commit() {
    // The topology cardinality parameter loses its template while the
    // parallel-split mapping still references it.
    let broken = DEFAULT_PHYSICS.replace("kgc:cardinalityTemplate", "kgc:retiredTemplate");
    let ontology = Arc::new(PhysicsOntology::from_turtle(&broken, DEFAULT_RULES).expect("ontology"));
    let engine = KgcEngine::with_ontology(
        EngineConfig::default(),
        Arc::new(FixtureReasoner::passthrough()),
        ontology,
    )
    .expect("engine");
    load(&engine, r#"<urn:T> a yawl:Task ; kgc:status "Pending" ."#).await;

    let before = engine.store().triple_count().expect("count");
    let result = engine
        .apply(
            "tester",
            "benign write",
            QuadDelta::additions_only(vec![Quad::triple(
                Term::iri("urn:T"),
                Term::iri(vocab::kgc("dataItem")),
                Term::literal("x"),
            )])
            .expect("delta"),
        )
        .await;

    match result {
        Err(EngineError::Invariant(violation)) => {
            assert_eq!(violation.law, Law::Completeness);
        }
        other => panic!("expected completeness violation, got {:?}", other.map(|_| ())),
    }
    assert_eq!(engine.store().triple_count().expect("count"), before);
}

#[tokio::test]
async fn hermeticity_boundary_at_sixty_four() {
    let engine = engine();

    let at_limit = QuadDelta::additions_only(typed_quads("urn:bulk", 63)).expect("64 quads");
    assert_eq!(at_limit.len(), 64);
    engine
        .apply("tester", "bulk load", at_limit)
        .await
        .expect("64 quads commit");

    let over_limit = QuadDelta::checked(typed_quads("urn:more", 64), Vec::new());
    assert!(over_limit.is_err(), "65 quads cannot even be constructed");

    // Staging two deltas whose merge exceeds the bound aborts the batch.
    let txn = engine.transactions().begin("tester", "overflow");
    engine
        .transactions()
        .stage(txn, QuadDelta::additions_only(typed_quads("urn:a", 40)).expect("delta"))
        .expect("first stage");
    let second = engine
        .transactions()
        .stage(txn, QuadDelta::additions_only(typed_quads("urn:b", 40)).expect("delta"));
    match second {
        Err(EngineError::Invariant(violation)) => assert_eq!(violation.law, Law::Hermeticity),
        other => panic!("expected hermeticity violation, got {:?}", other),
    }
}

#[tokio::test]
async fn typing_violation_rolls_back() {
    let engine = engine();
    let before = engine.store().triple_count().expect("count");
    let untyped = QuadDelta::additions_only(vec![Quad::triple(
        Term::iri("urn:ghost"),
        Term::iri(vocab::kgc("status")),
        Term::literal("Active"),
    )])
    .expect("delta");

    let result = engine.apply("tester", "untyped write", untyped).await;
    match result {
        Err(EngineError::Invariant(violation)) => assert_eq!(violation.law, Law::Typing),
        other => panic!("expected typing violation, got {:?}", other.map(|_| ())),
    }
    assert_eq!(engine.store().triple_count().expect("count"), before);
}

#[tokio::test]
async fn zero_tick_budget_fails_fast_on_unconverged_state() {
    let engine = engine();
    load(
        &engine,
        r#"<urn:A> a yawl:Task ; kgc:status "Completed" ;
                  yawl:flowsInto [ yawl:nextElementRef <urn:B> ] .
           <urn:B> a yawl:Task ; kgc:status "Pending" ."#,
    )
    .await;

    let result = engine.run_with_budget(0).await;
    match result {
        Err(EngineError::Physics(PhysicsError::Convergence {
            max_ticks,
            final_delta,
        })) => {
            assert_eq!(max_ticks, 0);
            assert!(final_delta > 0);
        }
        other => panic!("expected convergence error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn converged_run_is_idempotent() {
    let engine = engine();
    load(&engine, r#"<urn:B> a yawl:Task ; kgc:status "Pending" ."#).await;

    let first = engine.run_to_completion().await.expect("first run");
    assert!(first.converged);
    let second = engine.run_to_completion().await.expect("second run");
    assert_eq!(second.ticks.len(), 1);
    assert_eq!(second.ticks[0].delta, 0);
}

#[tokio::test]
async fn cancellation_stops_between_ticks() {
    let engine = engine();
    load(
        &engine,
        r#"<urn:A> a yawl:Task ; kgc:status "Completed" ;
                  yawl:flowsInto [ yawl:nextElementRef <urn:B> ] .
           <urn:B> a yawl:Task ; kgc:status "Pending" ."#,
    )
    .await;

    engine.cancel_token().cancel();
    let result = engine.run_with_budget(10).await;
    assert!(matches!(
        result,
        Err(EngineError::Physics(PhysicsError::Cancelled { .. }))
    ));
}

#[tokio::test]
async fn pre_transaction_veto_blocks_commit() {
    let engine = engine();
    load(&engine, r#"<urn:T> a yawl:Task ; kgc:status "Pending" ."#).await;

    engine.registry().register_handler(
        "veto",
        HandlerEntry::new(handler_fn(|ctx| async move {
            ctx.request_rollback("not on my watch");
            Ok(serde_json::Value::Null)
        })),
    );
    engine
        .registry()
        .register(Hook {
            id: "gatekeeper".to_string(),
            name: "Rejects everything".to_string(),
            priority: 90,
            phases: vec![Phase::PreTransaction],
            condition: Condition::AlwaysTrue,
            handler_ref: "veto".to_string(),
            timeout_ms: 100,
            sandbox_profile: SandboxProfile::default(),
            version: "1.0.0".to_string(),
        })
        .expect("hook registration");

    let before = engine.store().triple_count().expect("count");
    let result = engine
        .apply(
            "tester",
            "doomed write",
            QuadDelta::additions_only(vec![Quad::triple(
                Term::iri("urn:T"),
                Term::iri(vocab::kgc("dataItem")),
                Term::literal("x"),
            )])
            .expect("delta"),
        )
        .await;
    assert!(matches!(result, Err(EngineError::Transaction(_))));
    assert_eq!(engine.store().triple_count().expect("count"), before);
}

#[tokio::test]
async fn resilient_pack_hook_failure_does_not_abort() {
    let engine = engine();
    load(&engine, r#"<urn:T> a yawl:Task ; kgc:status "Pending" ."#).await;

    engine.registry().register_handler(
        "flaky",
        HandlerEntry::new(handler_fn(|_ctx| async {
            Err("transient downstream outage".to_string())
        })),
    );
    let pack = kgc_engine::PolicyPack {
        id: "tolerant".to_string(),
        version: "1.0.0".to_string(),
        shacl_shapes: Vec::new(),
        hooks: vec![Hook {
            id: "flaky-hook".to_string(),
            name: "Flaky observer".to_string(),
            priority: 50,
            phases: vec![Phase::PostCommit],
            condition: Condition::AlwaysTrue,
            handler_ref: "flaky".to_string(),
            timeout_ms: 100,
            sandbox_profile: SandboxProfile::default(),
            version: "1.0.0".to_string(),
        }],
        slo: Default::default(),
        dependencies: Vec::new(),
        resilient_hooks: vec!["flaky-hook".to_string()],
        enabled: false,
        loaded_at: None,
    };
    engine.install_policy_pack(pack).expect("pack install");
    engine.policy().activate("tolerant").expect("activation");

    // The pack carries the engine's chosen block size.
    let installed = engine.policy().get("tolerant").expect("pack");
    assert_eq!(installed.slo.get("lockchain.block_size"), Some(&64.0));

    // The failing hook is resilient, so the commit still lands.
    engine
        .apply(
            "tester",
            "marker",
            QuadDelta::additions_only(vec![Quad::triple(
                Term::iri("urn:T"),
                Term::iri(vocab::kgc("dataItem")),
                Term::literal("survives"),
            )])
            .expect("delta"),
        )
        .await
        .expect("commit despite resilient hook failure");
    assert!(ask(&engine, r#"<urn:T> kgc:dataItem "survives""#).await);
}

#[tokio::test]
async fn reasoner_unavailability_is_fatal() {
    let engine = KgcEngine::new(
        EngineConfig::default(),
        Arc::new(FixtureReasoner::unavailable()),
    )
    .expect("engine");
    load(&engine, r#"<urn:T> a yawl:Task ; kgc:status "Pending" ."#).await;

    let result = engine.execute_tick().await;
    match result {
        Err(error) => assert_eq!(error.exit_code(), 3),
        Ok(_) => panic!("tick must fail without a reasoner"),
    }
}

#[tokio::test]
async fn receipts_survive_the_retention_window_on_disk() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = EngineConfig::default();
    config.lockchain.storage_path = Some(dir.path().to_path_buf());
    config.lockchain.retention = 2;
    let engine = KgcEngine::new(config, Arc::new(FixtureReasoner::passthrough())).expect("engine");
    load(&engine, r#"<urn:T> a yawl:Task ; kgc:status "Pending" ."#).await;

    engine.registry().register_handler(
        "ok",
        HandlerEntry::new(handler_fn(|_ctx| async { Ok(json!({"ok": true})) })),
    );
    engine
        .registry()
        .register(Hook {
            id: "audit".to_string(),
            name: "Audit every commit".to_string(),
            priority: 50,
            phases: vec![Phase::PostCommit],
            condition: Condition::AlwaysTrue,
            handler_ref: "ok".to_string(),
            timeout_ms: 100,
            sandbox_profile: SandboxProfile::default(),
            version: "1.0.0".to_string(),
        })
        .expect("hook registration");

    for n in 0..6 {
        engine
            .apply(
                "tester",
                "marker",
                QuadDelta::additions_only(vec![Quad::triple(
                    Term::iri("urn:T"),
                    Term::iri(vocab::kgc("dataItem")),
                    Term::literal(format!("commit-{}", n)),
                )])
                .expect("delta"),
            )
            .await
            .expect("commit");
    }
    assert_eq!(engine.lockchain().window().len(), 2);

    // The bounded writer drains asynchronously; wait for it to catch up.
    let query = kgc_lockchain::ReceiptQuery::default();
    for _ in 0..50 {
        if engine.lockchain().query(&query).expect("query").len() == 6 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let receipts = engine.lockchain().query(&query).expect("query");
    assert_eq!(receipts.len(), 6);
    Lockchain::verify_sequence(&receipts).expect("full chain verifies");
}

#[tokio::test]
async fn dump_load_round_trip_preserves_answers() {
    let engine = engine();
    load(
        &engine,
        r#"<urn:A> a yawl:Task ; kgc:status "Completed" ;
                  yawl:flowsInto [ yawl:nextElementRef <urn:B> ] .
           <urn:B> a yawl:Task ; kgc:status "Pending" ."#,
    )
    .await;
    engine.run_to_completion().await.expect("convergence");

    let dump = engine
        .store()
        .dump(kgc_store::RdfSyntax::NTriples)
        .expect("dump");
    let restored = kgc_store::OxigraphStore::new().expect("store");
    restored
        .load(kgc_store::RdfSyntax::NTriples, &dump)
        .expect("load");

    let query = format!(
        "{}SELECT ?s ?status WHERE {{ ?s kgc:status ?status }} ORDER BY ?s ?status",
        vocab::sparql_prefixes()
    );
    assert_eq!(
        engine.store().query(&query).expect("original"),
        restored.query(&query).expect("restored")
    );
}
