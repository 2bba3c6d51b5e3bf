//! Semantic driver: trigger shape → (verb, parameter templates)
//!
//! The driver owns exactly one decision: which pattern mapping applies to a
//! node right now. It reads the node's (property, value) pairs from the
//! state graph, runs one unified extraction query against the physics
//! graph, and returns the resolved [`VerbConfig`]. It never branches on a
//! parameter value; a parameter resource without a template is a
//! completeness violation, not a fallback.

use crate::error::{KernelResult, PhysicsError};
use crate::ontology::PhysicsOntology;
use crate::status::{effective_status, TaskStatus};
use dashmap::DashMap;
use kgc_store::{vocab, RdfStore, Solution, Term};
use std::sync::Arc;

/// The five kernel verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Transmute,
    Copy,
    Filter,
    Await,
    Void,
}

impl Verb {
    pub fn name(self) -> &'static str {
        match self {
            Verb::Transmute => "Transmute",
            Verb::Copy => "Copy",
            Verb::Filter => "Filter",
            Verb::Await => "Await",
            Verb::Void => "Void",
        }
    }

    fn from_iri(iri: &str) -> Option<Self> {
        match iri.rsplit('#').next()? {
            "Transmute" => Some(Verb::Transmute),
            "Copy" => Some(Verb::Copy),
            "Filter" => Some(Verb::Filter),
            "Await" => Some(Verb::Await),
            "Void" => Some(Verb::Void),
            _ => None,
        }
    }
}

/// Resolved execution recipe for one node under the current ontology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbConfig {
    pub verb: Verb,
    /// Mapping IRI, kept for diagnostics and receipts
    pub mapping: String,
    /// Pattern IRI the mapping realizes
    pub pattern: String,
    pub threshold_template: Option<String>,
    pub cardinality_template: Option<String>,
    pub completion_template: Option<String>,
    pub selection_template: Option<String>,
    pub cancellation_template: Option<String>,
    pub execution_template: Option<String>,
    pub instance_template: Option<String>,
    pub binding_template: Option<String>,
    pub reset_template: Option<String>,
    pub reset_on_fire: bool,
}

/// Template parameter slots the unified query extracts. Each slot pairs a
/// mapping property with the template property its value must carry.
const PARAM_SLOTS: &[(&str, &str, &str)] = &[
    ("thresholdParam", "thresholdTemplate", "threshold"),
    ("cardinalityParam", "cardinalityTemplate", "cardinality"),
    ("completionParam", "completionTemplate", "completion"),
    ("selectionParam", "selectionTemplate", "selection"),
    ("cancellationParam", "cancellationTemplate", "cancellation"),
    ("executionParam", "executionTemplate", "execution"),
    ("instanceParam", "instanceGeneration", "instance"),
    ("bindingParam", "bindingTemplate", "binding"),
    ("resetParam", "executionTemplate", "reset"),
];

/// Resolves verbs for nodes, caching per (generation, trigger shape)
pub struct SemanticDriver {
    ontology: Arc<PhysicsOntology>,
    cache: DashMap<String, Option<VerbConfig>>,
}

impl SemanticDriver {
    pub fn new(ontology: Arc<PhysicsOntology>) -> Self {
        Self {
            ontology,
            cache: DashMap::new(),
        }
    }

    /// Resolve the verb configuration for `subject`, or `None` when no
    /// mapping triggers (the node has nothing to do this tick)
    pub fn resolve_verb(
        &self,
        state: &dyn RdfStore,
        subject: &str,
    ) -> KernelResult<Option<VerbConfig>> {
        let pairs = self.trigger_pairs(state, subject)?;
        if pairs.is_empty() {
            return Ok(None);
        }
        let status = effective_status(state, subject)?;

        let cache_key = Self::cache_key(self.ontology.generation(), &pairs, status);
        if let Some(cached) = self.cache.get(&cache_key) {
            return Ok(cached.clone());
        }

        let resolved = self.resolve_uncached(&pairs, status)?;
        self.cache.insert(cache_key, resolved.clone());
        Ok(resolved)
    }

    /// Drop all cached configurations (used after ontology reload)
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    fn cache_key(
        generation: u64,
        pairs: &[(String, String)],
        status: Option<TaskStatus>,
    ) -> String {
        let mut sorted: Vec<String> = pairs
            .iter()
            .map(|(p, v)| format!("{}={}", p, v))
            .collect();
        sorted.sort_unstable();
        format!(
            "g{}|s{}|{}",
            generation,
            status.map(|s| s.priority()).unwrap_or(u8::MAX),
            sorted.join("|")
        )
    }

    /// All (property, value) pairs of the subject in the state graph,
    /// rendered as SPARQL terms for the VALUES clause
    fn trigger_pairs(
        &self,
        state: &dyn RdfStore,
        subject: &str,
    ) -> KernelResult<Vec<(String, String)>> {
        let query = format!("SELECT ?p ?v WHERE {{ <{}> ?p ?v }}", subject);
        let result = state.query(&query)?;
        let mut pairs = Vec::new();
        for row in result.as_solutions().unwrap_or_default() {
            let (Some(p), Some(v)) = (row.get("p"), row.get("v")) else {
                continue;
            };
            let Term::Iri { value: property } = p else {
                continue;
            };
            let rendered = match v {
                Term::Iri { value } => format!("<{}>", value),
                Term::Literal { .. } => v.to_string(),
                Term::Blank { .. } => continue,
            };
            pairs.push((format!("<{}>", property), rendered));
        }
        Ok(pairs)
    }

    fn resolve_uncached(
        &self,
        pairs: &[(String, String)],
        status: Option<TaskStatus>,
    ) -> KernelResult<Option<VerbConfig>> {
        let query = Self::unified_query(pairs);
        let graph = self.ontology.graph();
        let result = graph.query(&query)?;
        let rows = result.as_solutions().unwrap_or_default();

        for row in rows {
            let guard = row
                .get("guard")
                .and_then(|t| t.as_literal())
                .map(|s| s.to_string());
            let matches = match (&guard, status) {
                (None, _) => true,
                (Some(required), Some(actual)) => required == &actual.to_string(),
                (Some(_), None) => false,
            };
            if !matches {
                continue;
            }
            return self.build_config(row).map(Some);
        }
        Ok(None)
    }

    /// The unified parameter-extraction query: one SPARQL round trip
    /// returning the verb plus every parameter resource and its template
    fn unified_query(pairs: &[(String, String)]) -> String {
        let values: String = pairs
            .iter()
            .map(|(p, v)| format!("({} {})", p, v))
            .collect::<Vec<_>>()
            .join(" ");
        let mut optionals = String::new();
        for (param, template, slot) in PARAM_SLOTS {
            optionals.push_str(&format!(
                "  OPTIONAL {{ ?mapping kgc:{param} ?{slot}Param . \
                   OPTIONAL {{ ?{slot}Param kgc:{template} ?{slot}Template }} }}\n",
                param = param,
                template = template,
                slot = slot,
            ));
        }
        format!(
            "{prefixes}SELECT * WHERE {{\n  VALUES (?tp ?tv) {{ {values} }}\n  \
             ?mapping a kgc:PatternMapping ;\n           kgc:pattern ?pattern ;\n           \
             kgc:triggerProperty ?tp ;\n           kgc:triggerValue ?tv ;\n           \
             kgc:verb ?verb .\n  \
             OPTIONAL {{ ?mapping kgc:priority ?priority }}\n  \
             OPTIONAL {{ ?mapping kgc:statusGuard ?guard }}\n{optionals}}}\n\
             ORDER BY DESC(?priority)",
            prefixes = vocab::sparql_prefixes(),
            values = values,
            optionals = optionals,
        )
    }

    fn build_config(&self, row: &Solution) -> KernelResult<VerbConfig> {
        let iri = |name: &str| -> Option<String> {
            row.get(name).and_then(|t| t.as_iri()).map(str::to_string)
        };
        let mapping = iri("mapping").unwrap_or_default();
        let pattern = iri("pattern").unwrap_or_default();
        let verb_iri = iri("verb").ok_or_else(|| PhysicsError::Ontology(format!(
            "mapping {} has no verb",
            mapping
        )))?;
        let verb = Verb::from_iri(&verb_iri).ok_or_else(|| PhysicsError::UnknownVerb {
            mapping: mapping.clone(),
            verb: verb_iri.clone(),
        })?;

        // A bound parameter resource with an unbound template is exactly the
        // failure the completeness law exists to catch.
        let mut templates: Vec<Option<String>> = Vec::with_capacity(PARAM_SLOTS.len());
        for (_, _, slot) in PARAM_SLOTS {
            let param = row.get(&format!("{}Param", slot));
            let template = row
                .get(&format!("{}Template", slot))
                .and_then(|t| t.as_literal())
                .map(str::to_string);
            if let (Some(param), None) = (param, &template) {
                return Err(PhysicsError::Completeness {
                    mapping: mapping.clone(),
                    parameter: param
                        .as_iri()
                        .unwrap_or("(unnamed parameter)")
                        .to_string(),
                });
            }
            templates.push(template);
        }
        let mut slots = templates.into_iter();
        let threshold_template = slots.next().flatten();
        let cardinality_template = slots.next().flatten();
        let completion_template = slots.next().flatten();
        let selection_template = slots.next().flatten();
        let cancellation_template = slots.next().flatten();
        let execution_template = slots.next().flatten();
        let instance_template = slots.next().flatten();
        let binding_template = slots.next().flatten();
        let reset_template = slots.next().flatten();

        Ok(VerbConfig {
            verb,
            mapping,
            pattern,
            threshold_template,
            cardinality_template,
            completion_template,
            selection_template,
            cancellation_template,
            execution_template,
            instance_template,
            binding_template,
            reset_on_fire: reset_template.is_some(),
            reset_template,
        })
    }
}
