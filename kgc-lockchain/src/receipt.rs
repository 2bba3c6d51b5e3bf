//! Receipt record and content hashing
//!
//! A receipt is the sole audit artifact of a hook execution. Its hash
//! covers every field except `sha256_hash` itself and `merkle_anchor`
//! (anchors are stamped after linking), so tampering with any recorded
//! field breaks the chain.

use crate::{LockchainError, LockchainResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Zero hash used as the genesis link
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Immutable record of one hook execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Position in the chain, starting at 0
    pub sequence: u64,
    pub hook_id: String,
    /// Lifecycle phase the hook ran in
    pub phase: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    /// Opaque condition evaluation output
    pub condition_result: serde_json::Value,
    /// Opaque handler output
    pub handler_result: serde_json::Value,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Hash of the previous receipt, or the genesis hash
    pub prev_hash: String,
    /// SHA-256 over the canonical fields, hex encoded
    pub sha256_hash: String,
    /// Merkle path to the block root, stamped on block-closing receipts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merkle_anchor: Option<Vec<String>>,
}

impl Receipt {
    /// Compute the canonical content hash of this receipt's fields
    pub fn compute_hash(&self) -> LockchainResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(self.hook_id.as_bytes());
        hasher.update(self.phase.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(self.actor.as_bytes());
        let condition = serde_json::to_vec(&self.condition_result)
            .map_err(|e| LockchainError::Hashing(format!("condition result: {}", e)))?;
        hasher.update(&condition);
        let handler = serde_json::to_vec(&self.handler_result)
            .map_err(|e| LockchainError::Hashing(format!("handler result: {}", e)))?;
        hasher.update(&handler);
        hasher.update(self.duration_ms.to_le_bytes());
        if let Some(error) = &self.error {
            hasher.update(error.as_bytes());
        }
        hasher.update(self.prev_hash.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// The raw hash bytes, used as a Merkle leaf
    pub fn hash_bytes(&self) -> LockchainResult<[u8; 32]> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&self.sha256_hash, &mut bytes)
            .map_err(|e| LockchainError::Hashing(format!("invalid hash encoding: {}", e)))?;
        Ok(bytes)
    }

    /// Whether the recorded hash matches the recorded fields
    pub fn verify_hash(&self) -> LockchainResult<bool> {
        Ok(self.compute_hash()? == self.sha256_hash)
    }

    /// Whether this receipt correctly extends `prev`
    pub fn verify_link(&self, prev: &Receipt) -> LockchainResult<bool> {
        Ok(self.verify_hash()?
            && prev.verify_hash()?
            && self.prev_hash == prev.sha256_hash
            && self.sequence == prev.sequence + 1)
    }

    /// Serialize to the JSON wire format
    pub fn to_json(&self) -> LockchainResult<String> {
        serde_json::to_string(self)
            .map_err(|e| LockchainError::Hashing(format!("serialization failed: {}", e)))
    }

    /// Render as RDF (Turtle) for graph integration
    pub fn to_turtle(&self) -> String {
        let iri = format!("urn:kgc:receipt:{}", self.sequence);
        let mut out = String::new();
        out.push_str("@prefix kgc: <https://kgc.dev/ontology#> .\n");
        out.push_str("@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .\n\n");
        out.push_str(&format!("<{}> a kgc:Receipt ;\n", iri));
        out.push_str(&format!("    kgc:sequence {} ;\n", self.sequence));
        out.push_str(&format!("    kgc:hookId \"{}\" ;\n", escape(&self.hook_id)));
        out.push_str(&format!("    kgc:phase \"{}\" ;\n", escape(&self.phase)));
        out.push_str(&format!(
            "    kgc:timestamp \"{}\"^^xsd:dateTime ;\n",
            self.timestamp.to_rfc3339()
        ));
        out.push_str(&format!("    kgc:actor \"{}\" ;\n", escape(&self.actor)));
        out.push_str(&format!("    kgc:durationMs {} ;\n", self.duration_ms));
        if let Some(error) = &self.error {
            out.push_str(&format!("    kgc:error \"{}\" ;\n", escape(error)));
        }
        out.push_str(&format!("    kgc:prevHash \"{}\" ;\n", self.prev_hash));
        out.push_str(&format!("    kgc:sha256Hash \"{}\" .\n", self.sha256_hash));
        out
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
