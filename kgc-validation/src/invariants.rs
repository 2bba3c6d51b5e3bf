//! The four laws
//!
//! Checks run at commit time against the post-state and can be re-run at
//! any moment. A check reports violations; it never mutates and never
//! panics. Violation messages carry no internal paths or stack context so
//! they are safe to surface after sanitization.

use crate::ValidationResult;
use chrono::{DateTime, Utc};
use kgc_store::{vocab, QuadDelta, RdfStore, Term, MAX_DELTA_QUADS};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The four invariant families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Law {
    Typing,
    Hermeticity,
    Chronology,
    Completeness,
}

impl Law {
    /// Stable error code for the wire envelope
    pub fn code(self) -> &'static str {
        match self {
            Law::Typing => "TypingViolation",
            Law::Hermeticity => "HermeticityViolation",
            Law::Chronology => "ChronologyViolation",
            Law::Completeness => "CompletenessViolation",
        }
    }
}

/// One invariant breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub law: Law,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
}

/// Outcome of a validation pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn conforms(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn first_law(&self) -> Option<Law> {
        self.violations.first().map(|v| v.law)
    }
}

/// Declared predicate whitelist for the hermeticity law
#[derive(Debug, Clone)]
pub struct PredicateWhitelist {
    namespaces: Vec<String>,
    predicates: HashSet<String>,
}

impl PredicateWhitelist {
    pub fn new(namespaces: Vec<String>, predicates: HashSet<String>) -> Self {
        Self {
            namespaces,
            predicates,
        }
    }

    /// The namespaces the engine itself writes
    pub fn engine_default() -> Self {
        Self {
            namespaces: vec![
                vocab::KGC.to_string(),
                vocab::YAWL.to_string(),
                vocab::RDF.to_string(),
                vocab::RDFS.to_string(),
            ],
            predicates: HashSet::new(),
        }
    }

    pub fn allow_predicate(&mut self, iri: impl Into<String>) {
        self.predicates.insert(iri.into());
    }

    pub fn allows(&self, predicate: &str) -> bool {
        self.predicates.contains(predicate)
            || self.namespaces.iter().any(|ns| predicate.starts_with(ns))
    }
}

/// Timestamp predicates the chronology law watches
const TIME_PREDICATES: &[&str] = &["startedAt", "completedAt", "cancelledAt", "archivedAt"];

/// Runs the four laws
pub struct InvariantValidator {
    whitelist: PredicateWhitelist,
}

impl InvariantValidator {
    pub fn new(whitelist: PredicateWhitelist) -> Self {
        Self { whitelist }
    }

    pub fn whitelist(&self) -> &PredicateWhitelist {
        &self.whitelist
    }

    /// TYPING: every subject of a newly added triple is typed in post-state
    pub fn validate_typing(
        &self,
        post_state: &dyn RdfStore,
        delta: &QuadDelta,
    ) -> ValidationResult<Vec<Violation>> {
        let mut violations = Vec::new();
        let mut checked = HashSet::new();
        for quad in delta.additions() {
            let Term::Iri { value: subject } = &quad.subject else {
                continue;
            };
            if !checked.insert(subject.clone()) {
                continue;
            }
            let query = format!(
                "ASK {{ <{}> <{}type> ?type }}",
                subject,
                vocab::RDF
            );
            let typed = post_state.query(&query)?.as_boolean().unwrap_or(false);
            if !typed {
                violations.push(Violation {
                    law: Law::Typing,
                    subject: Some(subject.clone()),
                    message: format!("subject {} has no rdf:type", subject),
                });
            }
        }
        Ok(violations)
    }

    /// HERMETICITY: batch size within bounds, predicates within the whitelist
    pub fn validate_hermeticity(&self, delta: &QuadDelta) -> Vec<Violation> {
        let mut violations = Vec::new();
        if delta.len() > MAX_DELTA_QUADS {
            violations.push(Violation {
                law: Law::Hermeticity,
                subject: None,
                message: format!(
                    "batch of {} quads exceeds the limit of {}",
                    delta.len(),
                    MAX_DELTA_QUADS
                ),
            });
        }
        let mut flagged = HashSet::new();
        for quad in delta.additions().iter().chain(delta.removals()) {
            if let Term::Iri { value: predicate } = &quad.predicate {
                if !self.whitelist.allows(predicate) && flagged.insert(predicate.clone()) {
                    violations.push(Violation {
                        law: Law::Hermeticity,
                        subject: None,
                        message: format!("predicate {} is not whitelisted", predicate),
                    });
                }
            }
        }
        violations
    }

    /// CHRONOLOGY: no completion before start, and no added timestamp
    /// earlier than the transaction floor
    pub fn validate_chronology(
        &self,
        post_state: &dyn RdfStore,
        delta: &QuadDelta,
        floor: Option<DateTime<Utc>>,
    ) -> ValidationResult<Vec<Violation>> {
        let mut violations = Vec::new();

        let query = format!(
            "SELECT ?s ?start ?end WHERE {{ \
               ?s <{started}> ?start ; <{completed}> ?end . \
               FILTER(?end < ?start) }}",
            started = vocab::kgc("startedAt"),
            completed = vocab::kgc("completedAt"),
        );
        for row in post_state
            .query(&query)?
            .as_solutions()
            .unwrap_or_default()
        {
            let subject = row
                .get("s")
                .and_then(|t| t.as_iri())
                .unwrap_or("(unknown)")
                .to_string();
            violations.push(Violation {
                law: Law::Chronology,
                subject: Some(subject.clone()),
                message: format!("completedAt precedes startedAt on {}", subject),
            });
        }

        if let Some(floor) = floor {
            for quad in delta.additions() {
                let Term::Iri { value: predicate } = &quad.predicate else {
                    continue;
                };
                let is_time = TIME_PREDICATES
                    .iter()
                    .any(|p| predicate == &vocab::kgc(p));
                if !is_time {
                    continue;
                }
                let Some(raw) = quad.object.as_literal() else {
                    continue;
                };
                if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
                    if stamp.with_timezone(&Utc) < floor {
                        violations.push(Violation {
                            law: Law::Chronology,
                            subject: quad.subject.as_iri().map(str::to_string),
                            message: format!(
                                "timestamp {} predates the transaction floor",
                                raw
                            ),
                        });
                    }
                }
            }
        }
        Ok(violations)
    }

    /// COMPLETENESS: every parameter value a mapping references carries at
    /// least one execution template
    pub fn validate_completeness(
        &self,
        physics_graph: &dyn RdfStore,
    ) -> ValidationResult<Vec<Violation>> {
        const SLOTS: &[(&str, &str)] = &[
            ("thresholdParam", "thresholdTemplate"),
            ("cardinalityParam", "cardinalityTemplate"),
            ("completionParam", "completionTemplate"),
            ("selectionParam", "selectionTemplate"),
            ("cancellationParam", "cancellationTemplate"),
            ("executionParam", "executionTemplate"),
            ("instanceParam", "instanceGeneration"),
            ("bindingParam", "bindingTemplate"),
            ("resetParam", "executionTemplate"),
        ];
        let branches: Vec<String> = SLOTS
            .iter()
            .map(|(param, template)| {
                format!(
                    "{{ ?mapping kgc:{param} ?value . \
                       FILTER NOT EXISTS {{ ?value kgc:{template} ?template }} }}",
                    param = param,
                    template = template,
                )
            })
            .collect();
        let query = format!(
            "{}SELECT DISTINCT ?mapping ?value WHERE {{ \
               ?mapping a kgc:PatternMapping . {} }}",
            vocab::sparql_prefixes(),
            branches.join(" UNION ")
        );
        let mut violations = Vec::new();
        for row in physics_graph
            .query(&query)?
            .as_solutions()
            .unwrap_or_default()
        {
            let mapping = row
                .get("mapping")
                .and_then(|t| t.as_iri())
                .unwrap_or("(unknown)")
                .to_string();
            let value = row
                .get("value")
                .and_then(|t| t.as_iri())
                .unwrap_or("(unknown)")
                .to_string();
            violations.push(Violation {
                law: Law::Completeness,
                subject: Some(mapping.clone()),
                message: format!(
                    "parameter value {} referenced by {} has no template",
                    value, mapping
                ),
            });
        }
        Ok(violations)
    }

    /// Run all four laws and collect every violation
    pub fn validate_all(
        &self,
        post_state: &dyn RdfStore,
        physics_graph: &dyn RdfStore,
        delta: &QuadDelta,
        floor: Option<DateTime<Utc>>,
    ) -> ValidationResult<ValidationReport> {
        let mut violations = self.validate_typing(post_state, delta)?;
        violations.extend(self.validate_hermeticity(delta));
        violations.extend(self.validate_chronology(post_state, delta, floor)?);
        violations.extend(self.validate_completeness(physics_graph)?);
        if !violations.is_empty() {
            tracing::warn!(count = violations.len(), "invariant violations found");
        }
        Ok(ValidationReport { violations })
    }
}
