//! Condition evaluation benchmarks
//!
//! The condition budget is milliseconds; these benches watch the two hot
//! paths, cold SPARQL ASK evaluation and cached re-evaluation.

use criterion::{criterion_group, criterion_main, Criterion};
use kgc_hooks::{Condition, ConditionEvaluator, HookContext};
use kgc_store::{OxigraphStore, QuadDelta};
use std::sync::Arc;
use std::time::Duration;

fn bench_condition_eval(c: &mut Criterion) {
    let mut turtle = String::from("@prefix ex: <http://example.org/> .\n");
    for n in 0..500 {
        turtle.push_str(&format!("ex:task{} ex:status \"Active\" .\n", n));
    }
    let store = Arc::new(OxigraphStore::from_turtle(&turtle).expect("fixture graph"));
    let ctx = HookContext::new(store, QuadDelta::empty(), "tx-bench", "bench");
    let condition = Condition::SparqlAsk {
        query: "ASK { ?s <http://example.org/status> \"Active\" }".to_string(),
    };

    c.bench_function("ask_condition_cold", |b| {
        b.iter(|| {
            let evaluator = ConditionEvaluator::new(64, Duration::from_secs(60));
            evaluator.evaluate(&condition, &ctx).expect("evaluation")
        })
    });

    let cached = ConditionEvaluator::new(64, Duration::from_secs(60));
    c.bench_function("ask_condition_cached", |b| {
        b.iter(|| cached.evaluate(&condition, &ctx).expect("evaluation"))
    });
}

criterion_group!(benches, bench_condition_eval);
criterion_main!(benches);
