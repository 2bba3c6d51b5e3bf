//! The chain itself: linking, anchoring, retention and persistence
//!
//! Appends are totally ordered; each receipt links to its predecessor and
//! every `block_size`-th receipt closes a Merkle block and carries the
//! anchor. The in-memory window is bounded; receipts rotate to persistent
//! storage through a bounded channel, so a slow writer applies
//! backpressure instead of dropping receipts.

use crate::merkle::MerkleTree;
use crate::receipt::{Receipt, GENESIS_HASH};
use crate::storage::ReceiptStorage;
use crate::{LockchainError, LockchainResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Chain tuning knobs
#[derive(Debug, Clone)]
pub struct LockchainConfig {
    /// Receipts per Merkle block
    pub block_size: usize,
    /// In-memory window cap; older receipts are only reachable via storage
    pub retention: usize,
    /// Capacity of the bounded persistence channel
    pub channel_capacity: usize,
}

impl Default for LockchainConfig {
    fn default() -> Self {
        Self {
            block_size: 64,
            retention: 1000,
            channel_capacity: 256,
        }
    }
}

/// Fields of a receipt before linking
#[derive(Debug, Clone)]
pub struct ReceiptDraft {
    pub hook_id: String,
    pub phase: String,
    pub actor: String,
    pub condition_result: serde_json::Value,
    pub handler_result: serde_json::Value,
    pub duration_ms: f64,
    pub error: Option<String>,
}

/// Query filter over the chain (window plus storage)
#[derive(Debug, Clone, Default)]
pub struct ReceiptQuery {
    pub hook_id: Option<String>,
    pub actor: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

struct ChainState {
    sequence: u64,
    last_hash: String,
    window: VecDeque<Receipt>,
    block: Vec<[u8; 32]>,
}

/// Append-only, totally ordered receipt chain
pub struct Lockchain {
    config: LockchainConfig,
    state: Mutex<ChainState>,
    persist_tx: Mutex<Option<mpsc::Sender<Receipt>>>,
    storage: Mutex<Option<Arc<ReceiptStorage>>>,
}

impl Lockchain {
    pub fn new(config: LockchainConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ChainState {
                sequence: 0,
                last_hash: GENESIS_HASH.to_string(),
                window: VecDeque::new(),
                block: Vec::new(),
            }),
            persist_tx: Mutex::new(None),
            storage: Mutex::new(None),
        }
    }

    /// Attach persistent storage; spawns the writer task draining the
    /// bounded channel
    pub fn attach_storage(&self, storage: ReceiptStorage) -> JoinHandle<()> {
        let storage = Arc::new(storage);
        let (tx, mut rx) = mpsc::channel::<Receipt>(self.config.channel_capacity);
        *self.persist_tx.lock() = Some(tx);
        *self.storage.lock() = Some(storage.clone());
        tokio::spawn(async move {
            while let Some(receipt) = rx.recv().await {
                if let Err(error) = storage.persist(&receipt) {
                    tracing::error!(%error, sequence = receipt.sequence, "receipt persistence failed");
                }
            }
        })
    }

    /// Link, anchor and record one receipt. Ordering is the emission order;
    /// the await on the persistence channel is the backpressure point.
    pub async fn append(&self, draft: ReceiptDraft) -> LockchainResult<Receipt> {
        let receipt = {
            let mut state = self.state.lock();
            let mut receipt = Receipt {
                sequence: state.sequence,
                hook_id: draft.hook_id,
                phase: draft.phase,
                timestamp: Utc::now(),
                actor: draft.actor,
                condition_result: draft.condition_result,
                handler_result: draft.handler_result,
                duration_ms: draft.duration_ms,
                error: draft.error,
                prev_hash: state.last_hash.clone(),
                sha256_hash: String::new(),
                merkle_anchor: None,
            };
            receipt.sha256_hash = receipt.compute_hash()?;

            state.block.push(receipt.hash_bytes()?);
            if state.block.len() >= self.config.block_size {
                let tree = MerkleTree::from_leaves(std::mem::take(&mut state.block));
                let proof = tree.proof(tree.leaf_count() - 1)?;
                receipt.merkle_anchor = Some(proof.to_anchor());
            }

            state.sequence += 1;
            state.last_hash = receipt.sha256_hash.clone();
            state.window.push_back(receipt.clone());
            while state.window.len() > self.config.retention {
                state.window.pop_front();
            }
            receipt
        };

        let tx = self.persist_tx.lock().clone();
        if let Some(tx) = tx {
            tx.send(receipt.clone())
                .await
                .map_err(|_| LockchainError::PersistenceChannelClosed)?;
        }
        Ok(receipt)
    }

    /// Number of receipts ever appended
    pub fn length(&self) -> u64 {
        self.state.lock().sequence
    }

    /// The most recent receipts, oldest first
    pub fn window(&self) -> Vec<Receipt> {
        self.state.lock().window.iter().cloned().collect()
    }

    /// Verify hash integrity and linking of the in-memory window
    pub fn verify_window(&self) -> LockchainResult<()> {
        let window = self.window();
        Self::verify_sequence(&window)
    }

    /// Verify an arbitrary contiguous run of receipts
    pub fn verify_sequence(receipts: &[Receipt]) -> LockchainResult<()> {
        for (index, receipt) in receipts.iter().enumerate() {
            if !receipt.verify_hash()? {
                return Err(LockchainError::Verification(format!(
                    "receipt {} hash mismatch",
                    receipt.sequence
                )));
            }
            if index > 0 && !receipt.verify_link(&receipts[index - 1])? {
                return Err(LockchainError::Verification(format!(
                    "receipt {} does not extend receipt {}",
                    receipt.sequence,
                    receipts[index - 1].sequence
                )));
            }
        }
        Ok(())
    }

    /// Query the window and, when attached, persistent storage
    pub fn query(&self, query: &ReceiptQuery) -> LockchainResult<Vec<Receipt>> {
        let storage = self.storage.lock().clone();
        let mut receipts = match storage {
            Some(storage) => storage.find(
                query.hook_id.as_deref(),
                query.actor.as_deref(),
                query.from,
                query.until,
            )?,
            None => Vec::new(),
        };
        let persisted: std::collections::HashSet<u64> =
            receipts.iter().map(|r| r.sequence).collect();
        for receipt in self.window() {
            if persisted.contains(&receipt.sequence) {
                continue;
            }
            if query.hook_id.as_deref().is_some_and(|id| receipt.hook_id != id) {
                continue;
            }
            if query.actor.as_deref().is_some_and(|a| receipt.actor != a) {
                continue;
            }
            if query.from.is_some_and(|t| receipt.timestamp < t) {
                continue;
            }
            if query.until.is_some_and(|t| receipt.timestamp > t) {
                continue;
            }
            receipts.push(receipt);
        }
        receipts.sort_by_key(|r| r.sequence);
        Ok(receipts)
    }
}
