//! `RdfStore` port and the oxigraph-backed adapter
//!
//! The store is the single state container of the engine. All mutation goes
//! through [`RdfStore::apply`] or [`RdfStore::update`]; both are atomic on
//! the call boundary. Reads concurrent with a writer observe a consistent
//! snapshot (oxigraph MVCC), and writers are serialized behind a write gate
//! so the engine keeps single-writer semantics without trusting callers.

use crate::error::{StoreError, StoreResult};
use crate::model::{Quad, QuadDelta, Term};
use oxigraph::io::RdfFormat;
use oxigraph::model::Quad as OxQuad;
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// RDF serialization syntaxes the store accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfSyntax {
    Turtle,
    NTriples,
    TriG,
    NQuads,
}

impl From<RdfSyntax> for RdfFormat {
    fn from(syntax: RdfSyntax) -> Self {
        match syntax {
            RdfSyntax::Turtle => RdfFormat::Turtle,
            RdfSyntax::NTriples => RdfFormat::NTriples,
            RdfSyntax::TriG => RdfFormat::TriG,
            RdfSyntax::NQuads => RdfFormat::NQuads,
        }
    }
}

/// One SELECT row: variable name to bound term
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Solution {
    bindings: BTreeMap<String, Term>,
}

impl Solution {
    pub fn new(bindings: BTreeMap<String, Term>) -> Self {
        Self { bindings }
    }

    /// The term bound to a variable, if any
    pub fn get(&self, variable: &str) -> Option<&Term> {
        self.bindings.get(variable)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// The result of a SPARQL query
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet {
    /// SELECT: zero or more rows, unordered unless ORDER BY was present
    Solutions(Vec<Solution>),
    /// ASK: a single boolean
    Boolean(bool),
    /// CONSTRUCT / DESCRIBE: a graph
    Graph(Vec<Quad>),
}

impl ResultSet {
    /// The boolean of an ASK result
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            ResultSet::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The rows of a SELECT result
    pub fn as_solutions(&self) -> Option<&[Solution]> {
        match self {
            ResultSet::Solutions(rows) => Some(rows),
            _ => None,
        }
    }

    /// The quads of a CONSTRUCT/DESCRIBE result
    pub fn as_graph(&self) -> Option<&[Quad]> {
        match self {
            ResultSet::Graph(quads) => Some(quads),
            _ => None,
        }
    }
}

/// Quad container with SPARQL query/update and atomic delta application
pub trait RdfStore: Send + Sync {
    /// Parse `bytes` in the given syntax into the store; returns quads added
    fn load(&self, syntax: RdfSyntax, bytes: &[u8]) -> StoreResult<u64>;

    /// Serialize the full store
    fn dump(&self, syntax: RdfSyntax) -> StoreResult<Vec<u8>>;

    /// Execute a SELECT, ASK, CONSTRUCT or DESCRIBE query
    fn query(&self, sparql: &str) -> StoreResult<ResultSet>;

    /// Execute an INSERT/DELETE/DELETE-INSERT update, atomic on the call
    fn update(&self, sparql: &str) -> StoreResult<()>;

    /// Apply a delta atomically: no partial application on failure
    fn apply(&self, delta: &QuadDelta) -> StoreResult<()>;

    /// Whether the store contains the quad
    fn contains(&self, quad: &Quad) -> StoreResult<bool>;

    fn triple_count(&self) -> StoreResult<u64>;

    fn clear(&self) -> StoreResult<()>;

    /// Full store as Turtle, for handing state to the reasoner
    fn snapshot_turtle(&self) -> StoreResult<String> {
        let bytes = self.dump(RdfSyntax::Turtle)?;
        String::from_utf8(bytes)
            .map_err(|e| StoreError::Operation(format!("snapshot is not UTF-8: {}", e)))
    }
}

/// In-memory oxigraph adapter
pub struct OxigraphStore {
    store: Store,
    // Serializes writers; oxigraph snapshots keep readers consistent.
    write_gate: Mutex<()>,
}

impl OxigraphStore {
    pub fn new() -> StoreResult<Self> {
        let store =
            Store::new().map_err(|e| StoreError::Operation(format!("failed to open store: {}", e)))?;
        Ok(Self {
            store,
            write_gate: Mutex::new(()),
        })
    }

    /// Build a store pre-loaded with Turtle data
    pub fn from_turtle(turtle: &str) -> StoreResult<Self> {
        let store = Self::new()?;
        store.load(RdfSyntax::Turtle, turtle.as_bytes())?;
        Ok(store)
    }
}

impl RdfStore for OxigraphStore {
    fn load(&self, syntax: RdfSyntax, bytes: &[u8]) -> StoreResult<u64> {
        let _gate = self.write_gate.lock();
        let before = self
            .store
            .len()
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        self.store
            .load_from_reader(RdfFormat::from(syntax), bytes)
            .map_err(|e| StoreError::Parse(format!("failed to parse input: {}", e)))?;
        let after = self
            .store
            .len()
            .map_err(|e| StoreError::Operation(e.to_string()))?;
        Ok((after - before) as u64)
    }

    fn dump(&self, syntax: RdfSyntax) -> StoreResult<Vec<u8>> {
        self.store
            .dump_to_writer(RdfFormat::from(syntax), Vec::new())
            .map_err(|e| StoreError::Operation(format!("dump failed: {}", e)))
    }

    fn query(&self, sparql: &str) -> StoreResult<ResultSet> {
        let results = self
            .store
            .query(sparql)
            .map_err(|e| StoreError::Query(format!("{}", e)))?;
        match results {
            QueryResults::Solutions(solutions) => {
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution =
                        solution.map_err(|e| StoreError::Query(format!("solution error: {}", e)))?;
                    let mut bindings = BTreeMap::new();
                    for (variable, term) in solution.iter() {
                        bindings.insert(variable.as_str().to_string(), Term::try_from(term)?);
                    }
                    rows.push(Solution::new(bindings));
                }
                Ok(ResultSet::Solutions(rows))
            }
            QueryResults::Boolean(b) => Ok(ResultSet::Boolean(b)),
            QueryResults::Graph(triples) => {
                let mut quads = Vec::new();
                for triple in triples {
                    let triple =
                        triple.map_err(|e| StoreError::Query(format!("triple error: {}", e)))?;
                    let ox_quad = triple.in_graph(oxigraph::model::GraphName::DefaultGraph);
                    quads.push(Quad::try_from(&ox_quad)?);
                }
                Ok(ResultSet::Graph(quads))
            }
        }
    }

    fn update(&self, sparql: &str) -> StoreResult<()> {
        let _gate = self.write_gate.lock();
        self.store
            .update(sparql)
            .map_err(|e| StoreError::Update(format!("{}", e)))
    }

    fn apply(&self, delta: &QuadDelta) -> StoreResult<()> {
        // Convert everything up front so a bad term cannot leave the store
        // half-mutated.
        let additions: Vec<OxQuad> = delta
            .additions()
            .iter()
            .map(OxQuad::try_from)
            .collect::<StoreResult<_>>()?;
        let removals: Vec<OxQuad> = delta
            .removals()
            .iter()
            .map(OxQuad::try_from)
            .collect::<StoreResult<_>>()?;

        let _gate = self.write_gate.lock();
        self.store
            .transaction(|mut txn| {
                for quad in &additions {
                    txn.insert(quad.as_ref())?;
                }
                for quad in &removals {
                    txn.remove(quad.as_ref())?;
                }
                Ok::<(), oxigraph::store::StorageError>(())
            })
            .map_err(|e| StoreError::Operation(format!("delta application failed: {}", e)))
    }

    fn contains(&self, quad: &Quad) -> StoreResult<bool> {
        let ox_quad = OxQuad::try_from(quad)?;
        self.store
            .contains(ox_quad.as_ref())
            .map_err(|e| StoreError::Operation(e.to_string()))
    }

    fn triple_count(&self) -> StoreResult<u64> {
        self.store
            .len()
            .map(|n| n as u64)
            .map_err(|e| StoreError::Operation(e.to_string()))
    }

    fn clear(&self) -> StoreResult<()> {
        let _gate = self.write_gate.lock();
        self.store
            .clear()
            .map_err(|e| StoreError::Operation(e.to_string()))
    }
}
