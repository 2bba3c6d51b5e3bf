//! Physics ontology provider
//!
//! Owns the pattern→verb→template graph and the N3 rule text handed to the
//! reasoner. The ontology is immutable per engine generation; hot reload
//! swaps the content and bumps the generation counter, which downstream
//! caches use as part of their keys.

use crate::error::{KernelResult, PhysicsError};
use kgc_store::{vocab, OxigraphStore, RdfStore, RdfSyntax};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default physics ontology shipped with the engine
pub const DEFAULT_PHYSICS: &str = include_str!("../ontology/physics.ttl");

/// Default N3 rule set shipped with the engine
pub const DEFAULT_RULES: &str = include_str!("../ontology/rules.n3");

/// Catalog entry for one workflow control pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternInfo {
    pub id: String,
    pub name: String,
    pub verb: String,
    pub category: String,
}

/// The pattern physics graph plus reasoner rules, versioned by generation
pub struct PhysicsOntology {
    store: RwLock<Arc<OxigraphStore>>,
    rules: RwLock<String>,
    generation: AtomicU64,
}

impl PhysicsOntology {
    /// Load the ontology and rules shipped with the engine
    pub fn load_default() -> KernelResult<Self> {
        Self::from_turtle(DEFAULT_PHYSICS, DEFAULT_RULES)
    }

    /// Load an ontology graph (Turtle) and rule set (N3)
    pub fn from_turtle(physics_turtle: &str, rules: &str) -> KernelResult<Self> {
        let store = Self::parse(physics_turtle)?;
        Ok(Self {
            store: RwLock::new(Arc::new(store)),
            rules: RwLock::new(rules.to_string()),
            generation: AtomicU64::new(0),
        })
    }

    fn parse(physics_turtle: &str) -> KernelResult<OxigraphStore> {
        let store = OxigraphStore::new()?;
        store
            .load(RdfSyntax::Turtle, physics_turtle.as_bytes())
            .map_err(|e| PhysicsError::Ontology(format!("failed to parse physics graph: {}", e)))?;
        Ok(store)
    }

    /// Replace ontology and rules under a new generation
    pub fn reload(&self, physics_turtle: &str, rules: &str) -> KernelResult<u64> {
        let store = Self::parse(physics_turtle)?;
        *self.store.write() = Arc::new(store);
        *self.rules.write() = rules.to_string();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(generation, "physics ontology reloaded");
        Ok(generation)
    }

    /// Current ontology generation; bumped on every reload
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// The physics graph the driver queries
    pub fn graph(&self) -> Arc<OxigraphStore> {
        self.store.read().clone()
    }

    /// Full N3 rule text for the reasoner
    pub fn get_rules(&self) -> String {
        self.rules.read().clone()
    }

    /// Rules annotated for the given patterns, plus the shared prefix block.
    /// Rule sections are delimited by `# pattern: <id>` comment markers.
    pub fn get_rule_subset(&self, pattern_ids: &[&str]) -> String {
        let rules = self.rules.read();
        let mut out = String::new();
        let mut keep = true;
        for line in rules.lines() {
            let trimmed = line.trim();
            if let Some(id) = trimmed.strip_prefix("# pattern:") {
                keep = pattern_ids.contains(&id.trim());
                if keep {
                    out.push_str(line);
                    out.push('\n');
                }
                continue;
            }
            // Prefix declarations are always shared.
            if trimmed.starts_with("@prefix") || (keep && !trimmed.is_empty()) {
                out.push_str(line);
                out.push('\n');
            } else if keep && trimmed.is_empty() {
                out.push('\n');
            }
        }
        out
    }

    /// Catalog entry for one pattern id (e.g. `WCP-2`)
    pub fn get_pattern_info(&self, pattern_id: &str) -> KernelResult<Option<PatternInfo>> {
        let infos = self.list_patterns()?;
        Ok(infos.into_iter().find(|p| p.id == pattern_id))
    }

    /// All patterns the ontology declares, ordered by id
    pub fn list_patterns(&self) -> KernelResult<Vec<PatternInfo>> {
        let query = format!(
            "{}SELECT ?id ?name ?verb ?category WHERE {{ \
                ?p a kgc:Pattern ; kgc:patternId ?id ; rdfs:label ?name ; \
                   kgc:verb ?verb ; kgc:category ?category . \
             }} ORDER BY ?id",
            vocab::sparql_prefixes()
        );
        let graph = self.graph();
        let result = graph.query(&query)?;
        let rows = result.as_solutions().unwrap_or_default();
        let mut patterns = Vec::with_capacity(rows.len());
        for row in rows {
            let field = |name: &str| -> String {
                row.get(name)
                    .map(|t| match t {
                        kgc_store::Term::Iri { value } => value
                            .rsplit('#')
                            .next()
                            .unwrap_or(value.as_str())
                            .to_string(),
                        other => other.as_literal().unwrap_or_default().to_string(),
                    })
                    .unwrap_or_default()
            };
            patterns.push(PatternInfo {
                id: field("id"),
                name: field("name"),
                verb: field("verb"),
                category: field("category"),
            });
        }
        Ok(patterns)
    }
}
