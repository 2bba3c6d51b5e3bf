//! Merkle tree over receipt hashes
//!
//! One tree per block of receipts. Pairs hash as `H(left || right)`; an odd
//! node is paired with itself. The proof for a leaf is the sibling path up
//! to the root, which is what a receipt's `merkle_anchor` carries.

use crate::{LockchainError, LockchainResult};
use sha2::{Digest, Sha256};

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Binary Merkle tree built bottom-up from receipt hashes
#[derive(Debug, Default)]
pub struct MerkleTree {
    leaves: Vec<[u8; 32]>,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_leaves(leaves: Vec<[u8; 32]>) -> Self {
        Self { leaves }
    }

    pub fn push(&mut self, leaf: [u8; 32]) {
        self.leaves.push(leaf);
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Root hash; the zero hash for an empty tree
    pub fn root(&self) -> [u8; 32] {
        if self.leaves.is_empty() {
            return [0u8; 32];
        }
        let mut level = self.leaves.clone();
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(&pair[0]);
                    hash_pair(&pair[0], right)
                })
                .collect();
        }
        level[0]
    }

    /// Sibling path from `leaf_index` up to the root
    pub fn proof(&self, leaf_index: usize) -> LockchainResult<MerkleProof> {
        if leaf_index >= self.leaves.len() {
            return Err(LockchainError::Merkle(format!(
                "leaf index {} out of range ({} leaves)",
                leaf_index,
                self.leaves.len()
            )));
        }
        let mut path = Vec::new();
        let mut index = leaf_index;
        let mut level = self.leaves.clone();
        while level.len() > 1 {
            let sibling = if index % 2 == 0 {
                *level.get(index + 1).unwrap_or(&level[index])
            } else {
                level[index - 1]
            };
            path.push(sibling);
            level = level
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).unwrap_or(&pair[0]);
                    hash_pair(&pair[0], right)
                })
                .collect();
            index /= 2;
        }
        Ok(MerkleProof {
            leaf_index,
            leaf: self.leaves[leaf_index],
            path,
            root: self.root(),
        })
    }
}

/// Inclusion proof: leaf, sibling path, root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub leaf: [u8; 32],
    pub path: Vec<[u8; 32]>,
    pub root: [u8; 32],
}

impl MerkleProof {
    /// Recompute the root from the leaf and sibling path
    pub fn verify(&self) -> bool {
        let mut current = self.leaf;
        let mut index = self.leaf_index;
        for sibling in &self.path {
            current = if index % 2 == 0 {
                hash_pair(&current, sibling)
            } else {
                hash_pair(sibling, &current)
            };
            index /= 2;
        }
        current == self.root
    }

    /// Hex rendering stamped into a receipt: sibling path, root last
    pub fn to_anchor(&self) -> Vec<String> {
        let mut anchor: Vec<String> = self.path.iter().map(hex::encode).collect();
        anchor.push(hex::encode(self.root));
        anchor
    }
}
