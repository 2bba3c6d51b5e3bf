//! Lockchain: cryptographically linked receipts with Merkle anchoring
//!
//! Every hook execution emits a [`Receipt`]; receipts chain through
//! `prev_hash` and are anchored by a Merkle tree every block. The chain is
//! the canonical execution trace: receipts are totally ordered by emission
//! and append-only, and verifying one receipt needs only its chain prefix
//! and its Merkle path.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod chain;
pub mod merkle;
pub mod receipt;
pub mod storage;

pub use chain::{Lockchain, LockchainConfig, ReceiptDraft, ReceiptQuery};
pub use merkle::{MerkleProof, MerkleTree};
pub use receipt::Receipt;
pub use storage::ReceiptStorage;

use thiserror::Error;

/// Result type for lockchain operations
pub type LockchainResult<T> = Result<T, LockchainError>;

/// Errors raised by the receipt chain
#[derive(Error, Debug)]
pub enum LockchainError {
    /// Hashing or chain linking failed; the enclosing transaction aborts
    #[error("Receipt hashing failed: {0}")]
    Hashing(String),

    #[error("Receipt verification failed: {0}")]
    Verification(String),

    #[error("Merkle proof error: {0}")]
    Merkle(String),

    #[error("Receipt storage error: {0}")]
    Storage(String),

    /// The bounded persistence channel closed; receipts must never drop
    #[error("Receipt persistence channel closed")]
    PersistenceChannelClosed,
}
