//! SHACL-subset shape validation
//!
//! Covers the constraint vocabulary policy packs actually use:
//! `sh:targetClass`, `sh:property`, `sh:path`, `sh:minCount`,
//! `sh:maxCount`, `sh:datatype` and `sh:nodeKind`. Shapes are parsed once
//! from a Turtle shapes graph and validated against any store.

use crate::{ValidationError, ValidationResult};
use kgc_store::{vocab, OxigraphStore, RdfStore, Term};
use serde::{Deserialize, Serialize};

/// One property constraint of a node shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyConstraint {
    pub path: String,
    pub min_count: Option<u64>,
    pub max_count: Option<u64>,
    pub datatype: Option<String>,
    pub node_kind: Option<String>,
}

/// A node shape with its target class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub iri: String,
    pub target_class: String,
    pub properties: Vec<PropertyConstraint>,
}

/// One constraint breach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaclViolation {
    pub focus: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub constraint: String,
    pub message: String,
}

/// Conformance outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaclReport {
    pub conforms: bool,
    pub violations: Vec<ShaclViolation>,
}

/// Parses shapes graphs and validates data stores against them
pub struct ShaclValidator;

impl ShaclValidator {
    /// Parse every node shape in a Turtle shapes graph
    pub fn parse_shapes(shapes_turtle: &str) -> ValidationResult<Vec<Shape>> {
        let store = OxigraphStore::from_turtle(shapes_turtle)
            .map_err(|e| ValidationError::Shapes(format!("failed to parse shapes: {}", e)))?;
        let query = format!(
            "{}SELECT ?shape ?targetClass WHERE {{ \
               ?shape a sh:NodeShape ; sh:targetClass ?targetClass . }} ORDER BY ?shape",
            vocab::sparql_prefixes()
        );
        let rows = store.query(&query)?;
        let mut shapes = Vec::new();
        for row in rows.as_solutions().unwrap_or_default() {
            let (Some(shape_iri), Some(target)) = (
                row.get("shape").and_then(|t| t.as_iri()),
                row.get("targetClass").and_then(|t| t.as_iri()),
            ) else {
                continue;
            };
            shapes.push(Shape {
                iri: shape_iri.to_string(),
                target_class: target.to_string(),
                properties: Self::parse_properties(&store, shape_iri)?,
            });
        }
        Ok(shapes)
    }

    fn parse_properties(
        store: &OxigraphStore,
        shape_iri: &str,
    ) -> ValidationResult<Vec<PropertyConstraint>> {
        let query = format!(
            "{}SELECT ?path ?minCount ?maxCount ?datatype ?nodeKind WHERE {{ \
               <{}> sh:property ?prop . ?prop sh:path ?path . \
               OPTIONAL {{ ?prop sh:minCount ?minCount }} \
               OPTIONAL {{ ?prop sh:maxCount ?maxCount }} \
               OPTIONAL {{ ?prop sh:datatype ?datatype }} \
               OPTIONAL {{ ?prop sh:nodeKind ?nodeKind }} \
             }} ORDER BY ?path",
            vocab::sparql_prefixes(),
            shape_iri
        );
        let rows = store.query(&query)?;
        let mut properties = Vec::new();
        for row in rows.as_solutions().unwrap_or_default() {
            let Some(path) = row.get("path").and_then(|t| t.as_iri()) else {
                continue;
            };
            properties.push(PropertyConstraint {
                path: path.to_string(),
                min_count: row
                    .get("minCount")
                    .and_then(|t| t.as_integer())
                    .map(|n| n.max(0) as u64),
                max_count: row
                    .get("maxCount")
                    .and_then(|t| t.as_integer())
                    .map(|n| n.max(0) as u64),
                datatype: row
                    .get("datatype")
                    .and_then(|t| t.as_iri())
                    .map(str::to_string),
                node_kind: row
                    .get("nodeKind")
                    .and_then(|t| t.as_iri())
                    .map(str::to_string),
            });
        }
        Ok(properties)
    }

    /// Validate a data store against parsed shapes
    pub fn validate(data: &dyn RdfStore, shapes: &[Shape]) -> ValidationResult<ShaclReport> {
        let mut violations = Vec::new();
        for shape in shapes {
            let focus_query = format!(
                "SELECT ?focus WHERE {{ ?focus <{}type> <{}> }} ORDER BY ?focus",
                vocab::RDF,
                shape.target_class
            );
            let focus_rows = data.query(&focus_query)?;
            for row in focus_rows.as_solutions().unwrap_or_default() {
                let Some(focus) = row.get("focus").and_then(|t| t.as_iri()) else {
                    continue;
                };
                for constraint in &shape.properties {
                    Self::check_property(data, focus, constraint, &mut violations)?;
                }
            }
        }
        Ok(ShaclReport {
            conforms: violations.is_empty(),
            violations,
        })
    }

    /// Parse shapes and validate in one step
    pub fn validate_turtle(
        data: &dyn RdfStore,
        shapes_turtle: &str,
    ) -> ValidationResult<ShaclReport> {
        let shapes = Self::parse_shapes(shapes_turtle)?;
        Self::validate(data, &shapes)
    }

    fn check_property(
        data: &dyn RdfStore,
        focus: &str,
        constraint: &PropertyConstraint,
        violations: &mut Vec<ShaclViolation>,
    ) -> ValidationResult<()> {
        let values_query = format!(
            "SELECT ?value WHERE {{ <{}> <{}> ?value }}",
            focus, constraint.path
        );
        let result = data.query(&values_query)?;
        let values: Vec<&Term> = result
            .as_solutions()
            .unwrap_or_default()
            .iter()
            .filter_map(|row| row.get("value"))
            .collect();
        let count = values.len() as u64;

        if let Some(min) = constraint.min_count {
            if count < min {
                violations.push(ShaclViolation {
                    focus: focus.to_string(),
                    path: Some(constraint.path.clone()),
                    constraint: "minCount".to_string(),
                    message: format!("{} values found, at least {} required", count, min),
                });
            }
        }
        if let Some(max) = constraint.max_count {
            if count > max {
                violations.push(ShaclViolation {
                    focus: focus.to_string(),
                    path: Some(constraint.path.clone()),
                    constraint: "maxCount".to_string(),
                    message: format!("{} values found, at most {} allowed", count, max),
                });
            }
        }
        if let Some(expected) = &constraint.datatype {
            for value in &values {
                let actual = match value {
                    Term::Literal {
                        datatype: Some(dt), ..
                    } => dt.clone(),
                    Term::Literal { datatype: None, language: None, .. } => {
                        format!("{}string", vocab::XSD)
                    }
                    _ => continue,
                };
                if &actual != expected {
                    violations.push(ShaclViolation {
                        focus: focus.to_string(),
                        path: Some(constraint.path.clone()),
                        constraint: "datatype".to_string(),
                        message: format!("expected datatype {}, found {}", expected, actual),
                    });
                }
            }
        }
        if let Some(kind) = &constraint.node_kind {
            for value in &values {
                let matches = match kind.rsplit('#').next() {
                    Some("IRI") => matches!(value, Term::Iri { .. }),
                    Some("Literal") => value.is_literal(),
                    Some("BlankNode") => matches!(value, Term::Blank { .. }),
                    _ => true,
                };
                if !matches {
                    violations.push(ShaclViolation {
                        focus: focus.to_string(),
                        path: Some(constraint.path.clone()),
                        constraint: "nodeKind".to_string(),
                        message: format!("value does not match node kind {}", kind),
                    });
                }
            }
        }
        Ok(())
    }
}
