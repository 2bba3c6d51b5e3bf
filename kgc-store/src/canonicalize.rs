//! Deterministic graph canonicalization and content hashing
//!
//! Canonical form is sorted N-Quads over the default graph. Blank node
//! relabeling is out of scope; the engine mints IRIs for everything it
//! creates, so sorted N-Quads is stable for the graphs it hashes.

use crate::error::StoreResult;
use crate::store::{OxigraphStore, RdfStore, RdfSyntax};
use sha2::{Digest, Sha256};

/// Canonicalize Turtle data to sorted N-Quads
pub fn canonical_nquads(turtle: &str) -> StoreResult<String> {
    let store = OxigraphStore::from_turtle(turtle)?;
    let dumped = store.dump(RdfSyntax::NQuads)?;
    let text = String::from_utf8_lossy(&dumped);
    let mut lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines.sort_unstable();
    lines.dedup();
    Ok(lines.join("\n"))
}

/// Blake3 content hash of the canonical form (hex)
pub fn canonical_hash(turtle: &str) -> StoreResult<String> {
    let canonical = canonical_nquads(turtle)?;
    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}

/// SHA-256 content hash of the canonical form (hex)
pub fn canonical_hash_sha256(turtle: &str) -> StoreResult<String> {
    let canonical = canonical_nquads(turtle)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Whether two graphs share a canonical form
pub fn is_isomorphic(first: &str, second: &str) -> StoreResult<bool> {
    Ok(canonical_nquads(first)? == canonical_nquads(second)?)
}
