//! Owned RDF model: terms, quads, and atomic quad deltas
//!
//! The engine references quads by value everywhere outside the store; only
//! the store owns physical storage. Conversions to and from oxigraph nodes
//! live here so no other module touches the backend model types.

use crate::error::{StoreError, StoreResult};
use crate::vocab;
use oxigraph::model::{
    BlankNode, GraphName, Literal, NamedNode, Quad as OxQuad, Subject, Term as OxTerm,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Hermeticity bound: the largest batch a single delta may carry
pub const MAX_DELTA_QUADS: usize = 64;

/// An RDF term: IRI, blank node, or literal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Term {
    Iri { value: String },
    Blank { id: String },
    Literal {
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        language: Option<String>,
    },
}

impl Term {
    /// Create an IRI term
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri {
            value: value.into(),
        }
    }

    /// Create a blank node term
    pub fn blank(id: impl Into<String>) -> Self {
        Term::Blank { id: id.into() }
    }

    /// Create a plain string literal
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    /// Create a typed literal
    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    /// Create a language-tagged literal
    pub fn lang_literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    /// The IRI value, if this term is an IRI
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri { value } => Some(value),
            _ => None,
        }
    }

    /// The lexical value, if this term is a literal
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Term::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Parse a literal as an integer, if possible
    pub fn as_integer(&self) -> Option<i64> {
        self.as_literal().and_then(|v| v.parse().ok())
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal { .. })
    }
}

impl fmt::Display for Term {
    /// N-Quads surface form
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri { value } => write!(f, "<{}>", value),
            Term::Blank { id } => write!(f, "_:{}", id),
            Term::Literal {
                value,
                datatype,
                language,
            } => {
                let escaped = value
                    .replace('\\', "\\\\")
                    .replace('"', "\\\"")
                    .replace('\n', "\\n")
                    .replace('\r', "\\r");
                write!(f, "\"{}\"", escaped)?;
                if let Some(lang) = language {
                    write!(f, "@{}", lang)
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{}>", dt)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// A quad: triple plus optional named graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quad {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
}

impl Quad {
    /// Create a quad in the default graph
    pub fn triple(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            graph: None,
        }
    }

    /// Create a quad in a named graph
    pub fn in_graph(subject: Term, predicate: Term, object: Term, graph: impl Into<String>) -> Self {
        Self {
            subject,
            predicate,
            object,
            graph: Some(graph.into()),
        }
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.graph {
            Some(g) => write!(
                f,
                "{} {} {} <{}> .",
                self.subject, self.predicate, self.object, g
            ),
            None => write!(f, "{} {} {} .", self.subject, self.predicate, self.object),
        }
    }
}

/// One atomic mutation: a set of additions and a set of removals
///
/// Construction enforces the batch invariants: additions and removals are
/// disjoint, and the combined size stays within [`MAX_DELTA_QUADS`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadDelta {
    additions: Vec<Quad>,
    removals: Vec<Quad>,
}

impl QuadDelta {
    /// Create an empty delta
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a delta, validating the batch invariants
    pub fn checked(additions: Vec<Quad>, removals: Vec<Quad>) -> StoreResult<Self> {
        let size = additions.len() + removals.len();
        if size > MAX_DELTA_QUADS {
            return Err(StoreError::DeltaTooLarge {
                size,
                max: MAX_DELTA_QUADS,
            });
        }
        let added: HashSet<&Quad> = additions.iter().collect();
        if let Some(overlap) = removals.iter().find(|q| added.contains(*q)) {
            return Err(StoreError::InvalidDelta(format!(
                "quad appears in both additions and removals: {}",
                overlap
            )));
        }
        Ok(Self {
            additions,
            removals,
        })
    }

    /// Create a delta of additions only
    pub fn additions_only(additions: Vec<Quad>) -> StoreResult<Self> {
        Self::checked(additions, Vec::new())
    }

    pub fn additions(&self) -> &[Quad] {
        &self.additions
    }

    pub fn removals(&self) -> &[Quad] {
        &self.removals
    }

    /// Total quads carried by this delta
    pub fn len(&self) -> usize {
        self.additions.len() + self.removals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    /// Merge another delta into this one, revalidating the batch invariants
    pub fn merge(self, other: QuadDelta) -> StoreResult<Self> {
        let mut additions = self.additions;
        let mut removals = self.removals;
        for quad in other.additions {
            if !additions.contains(&quad) {
                additions.push(quad);
            }
        }
        for quad in other.removals {
            if !removals.contains(&quad) {
                removals.push(quad);
            }
        }
        Self::checked(additions, removals)
    }
}

// --- oxigraph conversions ---

impl TryFrom<&Term> for OxTerm {
    type Error = StoreError;

    fn try_from(term: &Term) -> StoreResult<Self> {
        match term {
            Term::Iri { value } => NamedNode::new(value)
                .map(OxTerm::from)
                .map_err(|e| StoreError::InvalidTerm(format!("invalid IRI {}: {}", value, e))),
            Term::Blank { id } => BlankNode::new(id)
                .map(OxTerm::from)
                .map_err(|e| StoreError::InvalidTerm(format!("invalid blank node {}: {}", id, e))),
            Term::Literal {
                value,
                datatype,
                language,
            } => {
                let literal = if let Some(lang) = language {
                    Literal::new_language_tagged_literal(value, lang).map_err(|e| {
                        StoreError::InvalidTerm(format!("invalid language tag {}: {}", lang, e))
                    })?
                } else if let Some(dt) = datatype {
                    let dt_node = NamedNode::new(dt).map_err(|e| {
                        StoreError::InvalidTerm(format!("invalid datatype {}: {}", dt, e))
                    })?;
                    Literal::new_typed_literal(value.clone(), dt_node)
                } else {
                    Literal::new_simple_literal(value.clone())
                };
                Ok(OxTerm::from(literal))
            }
        }
    }
}

impl TryFrom<&OxTerm> for Term {
    type Error = StoreError;

    fn try_from(term: &OxTerm) -> StoreResult<Self> {
        match term {
            OxTerm::NamedNode(n) => Ok(Term::iri(n.as_str())),
            OxTerm::BlankNode(b) => Ok(Term::blank(b.as_str())),
            OxTerm::Literal(l) => {
                let language = l.language().map(|s| s.to_string());
                // Simple literals come back typed as xsd:string; normalize so
                // round-trips compare equal.
                let datatype = if language.is_some() {
                    None
                } else {
                    let dt = l.datatype().as_str().to_string();
                    if dt == format!("{}string", vocab::XSD) {
                        None
                    } else {
                        Some(dt)
                    }
                };
                Ok(Term::Literal {
                    value: l.value().to_string(),
                    datatype,
                    language,
                })
            }
            OxTerm::Triple(_) => Err(StoreError::InvalidTerm(
                "quoted triples are not supported".to_string(),
            )),
        }
    }
}

impl TryFrom<&Quad> for OxQuad {
    type Error = StoreError;

    fn try_from(quad: &Quad) -> StoreResult<Self> {
        let subject: Subject = match &quad.subject {
            Term::Iri { value } => NamedNode::new(value)
                .map(Subject::from)
                .map_err(|e| StoreError::InvalidTerm(format!("invalid subject {}: {}", value, e)))?,
            Term::Blank { id } => BlankNode::new(id)
                .map(Subject::from)
                .map_err(|e| StoreError::InvalidTerm(format!("invalid subject _:{}: {}", id, e)))?,
            Term::Literal { .. } => {
                return Err(StoreError::InvalidTerm(
                    "literal cannot be a subject".to_string(),
                ))
            }
        };
        let predicate = match &quad.predicate {
            Term::Iri { value } => NamedNode::new(value).map_err(|e| {
                StoreError::InvalidTerm(format!("invalid predicate {}: {}", value, e))
            })?,
            other => {
                return Err(StoreError::InvalidTerm(format!(
                    "predicate must be an IRI, got {}",
                    other
                )))
            }
        };
        let object = OxTerm::try_from(&quad.object)?;
        let graph = match &quad.graph {
            Some(g) => GraphName::from(NamedNode::new(g).map_err(|e| {
                StoreError::InvalidTerm(format!("invalid graph IRI {}: {}", g, e))
            })?),
            None => GraphName::DefaultGraph,
        };
        Ok(OxQuad::new(subject, predicate, object, graph))
    }
}

impl TryFrom<&OxQuad> for Quad {
    type Error = StoreError;

    fn try_from(quad: &OxQuad) -> StoreResult<Self> {
        let subject = match &quad.subject {
            Subject::NamedNode(n) => Term::iri(n.as_str()),
            Subject::BlankNode(b) => Term::blank(b.as_str()),
            Subject::Triple(_) => {
                return Err(StoreError::InvalidTerm(
                    "quoted triples are not supported".to_string(),
                ))
            }
        };
        let predicate = Term::iri(quad.predicate.as_str());
        let object = Term::try_from(&OxTerm::from(quad.object.clone()))?;
        let graph = match &quad.graph_name {
            GraphName::NamedNode(n) => Some(n.as_str().to_string()),
            GraphName::BlankNode(b) => Some(format!("_:{}", b.as_str())),
            GraphName::DefaultGraph => None,
        };
        Ok(Quad {
            subject,
            predicate,
            object,
            graph,
        })
    }
}
