//! Hook conditions and their evaluator
//!
//! Eight condition kinds decide whether a hook fires. Evaluation is
//! read-only over the context's graph snapshot and budgeted at
//! milliseconds; SPARQL goes through the shared query cache keyed by
//! canonical query hash and ontology generation.

use crate::cache::{canonical_query_hash, QueryCache};
use crate::context::HookContext;
use crate::error::{HookError, HookOpResult};
use kgc_store::{OxigraphStore, QuadDelta, RdfStore, ResultSet, Term};
use kgc_validation::ShaclValidator;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Comparison operator for threshold and window conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl CompareOp {
    pub fn compare(self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Lt => left < right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => (left - right).abs() < f64::EPSILON,
            CompareOp::Ne => (left - right).abs() >= f64::EPSILON,
            CompareOp::Gt => left > right,
            CompareOp::Ge => left >= right,
        }
    }
}

/// Direction filter for delta conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeltaDirection {
    Increase,
    Decrease,
    Any,
}

/// Aggregation over a sliding time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowAggregate {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

/// Boolean combinator for composite conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompositeOp {
    And,
    Or,
    Not,
}

/// When a hook fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Condition {
    /// Fires when the ASK query holds
    SparqlAsk { query: String },
    /// Fires when the SELECT row set is non-empty; rows go to the handler
    SparqlSelect { query: String },
    /// Fires when shape conformance differs between pre- and post-state
    Shacl { shapes: String },
    /// Fires when a named aggregate moves in the given direction
    Delta {
        query: String,
        variable: String,
        direction: DeltaDirection,
    },
    /// Compares a SELECT-extracted numeric against a constant
    Threshold {
        query: String,
        variable: String,
        operator: CompareOp,
        value: f64,
    },
    /// Sliding-time aggregation with a threshold compare
    Window {
        query: String,
        variable: String,
        aggregate: WindowAggregate,
        window_seconds: u64,
        operator: CompareOp,
        value: f64,
    },
    /// Short-circuited boolean combination of sub-conditions
    Composite {
        operator: CompositeOp,
        conditions: Vec<Condition>,
    },
    /// Unconditional phase listener
    AlwaysTrue,
}

/// Evaluates conditions against a hook context
pub struct ConditionEvaluator {
    cache: QueryCache,
    generation: AtomicU64,
    last_values: Mutex<HashMap<String, f64>>,
    samples: Mutex<HashMap<String, VecDeque<(Instant, f64)>>>,
}

impl ConditionEvaluator {
    pub fn new(cache_capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            cache: QueryCache::new(cache_capacity, cache_ttl),
            generation: AtomicU64::new(0),
            last_values: Mutex::new(HashMap::new()),
            samples: Mutex::new(HashMap::new()),
        }
    }

    /// Track the ontology generation used in cache keys
    pub fn set_generation(&self, generation: u64) {
        self.generation.store(generation, Ordering::SeqCst);
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Evaluate a condition: (fired, opaque result for the handler)
    pub fn evaluate(
        &self,
        condition: &Condition,
        ctx: &HookContext,
    ) -> HookOpResult<(bool, Value)> {
        match condition {
            Condition::SparqlAsk { query } => {
                let result = self.cached_query(ctx.store.as_ref(), query)?;
                let fired = result.as_boolean().ok_or_else(|| {
                    HookError::Condition("ASK condition requires an ASK query".to_string())
                })?;
                Ok((fired, json!({ "boolean": fired })))
            }
            Condition::SparqlSelect { query } => {
                let result = self.cached_query(ctx.store.as_ref(), query)?;
                let rows = result.as_solutions().ok_or_else(|| {
                    HookError::Condition("SELECT condition requires a SELECT query".to_string())
                })?;
                let rendered: Vec<Value> = rows
                    .iter()
                    .map(|row| {
                        let mut object = serde_json::Map::new();
                        for variable in row.variables() {
                            if let Some(term) = row.get(variable) {
                                object.insert(variable.to_string(), term_to_json(term));
                            }
                        }
                        Value::Object(object)
                    })
                    .collect();
                Ok((!rendered.is_empty(), json!({ "bindings": rendered })))
            }
            Condition::Shacl { shapes } => self.evaluate_shacl(shapes, ctx),
            Condition::Delta {
                query,
                variable,
                direction,
            } => self.evaluate_delta(query, variable, *direction, ctx),
            Condition::Threshold {
                query,
                variable,
                operator,
                value,
            } => {
                let current = self.numeric(ctx.store.as_ref(), query, variable)?;
                let fired = operator.compare(current, *value);
                Ok((fired, json!({ "value": current, "limit": value })))
            }
            Condition::Window {
                query,
                variable,
                aggregate,
                window_seconds,
                operator,
                value,
            } => self.evaluate_window(
                query,
                variable,
                *aggregate,
                *window_seconds,
                *operator,
                *value,
                ctx,
            ),
            Condition::Composite {
                operator,
                conditions,
            } => self.evaluate_composite(*operator, conditions, ctx),
            Condition::AlwaysTrue => Ok((true, Value::Null)),
        }
    }

    fn cached_query(&self, store: &dyn RdfStore, query: &str) -> HookOpResult<ResultSet> {
        let generation = self.generation.load(Ordering::SeqCst);
        if let Some(hit) = self.cache.get(query, generation) {
            return Ok(hit);
        }
        let result = store
            .query(query)
            .map_err(|e| HookError::Condition(e.to_string()))?;
        self.cache.put(query, generation, result.clone());
        Ok(result)
    }

    fn numeric(&self, store: &dyn RdfStore, query: &str, variable: &str) -> HookOpResult<f64> {
        let result = self.cached_query(store, query)?;
        let rows = result.as_solutions().ok_or_else(|| {
            HookError::Condition("numeric condition requires a SELECT query".to_string())
        })?;
        let term = rows
            .first()
            .and_then(|row| row.get(variable))
            .ok_or_else(|| {
                HookError::Condition(format!("variable ?{} is unbound", variable))
            })?;
        term.as_literal()
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| {
                HookError::Condition(format!("variable ?{} is not numeric", variable))
            })
    }

    /// Conformance difference between pre-state (delta un-applied) and
    /// post-state signals a validation-relevant change
    fn evaluate_shacl(&self, shapes: &str, ctx: &HookContext) -> HookOpResult<(bool, Value)> {
        let shapes = ShaclValidator::parse_shapes(shapes)?;
        let post_report = ShaclValidator::validate(ctx.store.as_ref(), &shapes)?;
        let pre_state = un_apply(ctx.store.as_ref(), &ctx.delta)?;
        let pre_report = ShaclValidator::validate(&pre_state, &shapes)?;

        let fired = pre_report.conforms != post_report.conforms;
        let result = json!({
            "pre_conforms": pre_report.conforms,
            "post_conforms": post_report.conforms,
            "violations": post_report
                .violations
                .iter()
                .map(|v| json!({
                    "focus": v.focus,
                    "path": v.path,
                    "constraint": v.constraint,
                    "message": v.message,
                }))
                .collect::<Vec<_>>(),
        });
        Ok((fired, result))
    }

    fn evaluate_delta(
        &self,
        query: &str,
        variable: &str,
        direction: DeltaDirection,
        ctx: &HookContext,
    ) -> HookOpResult<(bool, Value)> {
        let current = self.numeric(ctx.store.as_ref(), query, variable)?;
        let key = format!("{}#{}", canonical_query_hash(query), variable);
        let previous = self.last_values.lock().insert(key, current);

        let fired = match previous {
            None => false,
            Some(previous) => match direction {
                DeltaDirection::Increase => current > previous,
                DeltaDirection::Decrease => current < previous,
                DeltaDirection::Any => (current - previous).abs() >= f64::EPSILON,
            },
        };
        Ok((
            fired,
            json!({ "previous": previous, "current": current }),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate_window(
        &self,
        query: &str,
        variable: &str,
        aggregate: WindowAggregate,
        window_seconds: u64,
        operator: CompareOp,
        value: f64,
        ctx: &HookContext,
    ) -> HookOpResult<(bool, Value)> {
        let current = self.numeric(ctx.store.as_ref(), query, variable)?;
        let key = format!("{}#{}", canonical_query_hash(query), variable);
        let window = Duration::from_secs(window_seconds);
        let now = Instant::now();

        let aggregated = {
            let mut samples = self.samples.lock();
            let series = samples.entry(key).or_default();
            series.push_back((now, current));
            while series
                .front()
                .is_some_and(|(at, _)| now.duration_since(*at) > window)
            {
                series.pop_front();
            }
            let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
            match aggregate {
                WindowAggregate::Sum => values.iter().sum(),
                WindowAggregate::Avg => values.iter().sum::<f64>() / values.len() as f64,
                WindowAggregate::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
                WindowAggregate::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                WindowAggregate::Count => values.len() as f64,
            }
        };

        let fired = operator.compare(aggregated, value);
        Ok((
            fired,
            json!({ "aggregate": aggregated, "sample": current, "limit": value }),
        ))
    }

    fn evaluate_composite(
        &self,
        operator: CompositeOp,
        conditions: &[Condition],
        ctx: &HookContext,
    ) -> HookOpResult<(bool, Value)> {
        let mut results = Vec::new();
        let fired = match operator {
            CompositeOp::And => {
                let mut all = true;
                for condition in conditions {
                    let (fired, result) = self.evaluate(condition, ctx)?;
                    results.push(result);
                    if !fired {
                        all = false;
                        break;
                    }
                }
                all
            }
            CompositeOp::Or => {
                let mut any = false;
                for condition in conditions {
                    let (fired, result) = self.evaluate(condition, ctx)?;
                    results.push(result);
                    if fired {
                        any = true;
                        break;
                    }
                }
                any
            }
            CompositeOp::Not => {
                let first = conditions.first().ok_or_else(|| {
                    HookError::Condition("NOT requires one sub-condition".to_string())
                })?;
                let (fired, result) = self.evaluate(first, ctx)?;
                results.push(result);
                !fired
            }
        };
        Ok((fired, json!({ "sub_results": results })))
    }
}

fn term_to_json(term: &Term) -> Value {
    match term {
        Term::Iri { value } => json!({ "type": "uri", "value": value }),
        Term::Blank { id } => json!({ "type": "bnode", "value": id }),
        Term::Literal {
            value,
            datatype,
            language,
        } => json!({
            "type": "literal",
            "value": value,
            "datatype": datatype,
            "language": language,
        }),
    }
}

/// Reconstruct the pre-state of a delta on a scratch store
fn un_apply(post: &dyn RdfStore, delta: &QuadDelta) -> HookOpResult<OxigraphStore> {
    let dump = post.dump(kgc_store::RdfSyntax::NQuads)?;
    let scratch = OxigraphStore::new()?;
    scratch.load(kgc_store::RdfSyntax::NQuads, &dump)?;
    let inverse = QuadDelta::checked(delta.removals().to_vec(), delta.additions().to_vec())
        .map_err(|e| HookError::Condition(format!("delta cannot be inverted: {}", e)))?;
    scratch.apply(&inverse)?;
    Ok(scratch)
}
