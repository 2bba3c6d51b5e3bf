//! Persistent receipt storage
//!
//! Receipts rotate out of the in-memory window into a sled tree keyed
//! `receipt:{sequence:020}`, zero-padded so range scans follow chain
//! order. Receipts are stored as JSON, the same encoding as the wire
//! format.

use crate::receipt::Receipt;
use crate::{LockchainError, LockchainResult};
use chrono::{DateTime, Utc};
use sled::Db;
use std::path::Path;

/// sled-backed receipt log
pub struct ReceiptStorage {
    db: Db,
}

impl ReceiptStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> LockchainResult<Self> {
        let db = sled::open(path)
            .map_err(|e| LockchainError::Storage(format!("failed to open database: {}", e)))?;
        Ok(Self { db })
    }

    fn key(sequence: u64) -> String {
        format!("receipt:{:020}", sequence)
    }

    /// Persist one receipt; append-only, re-writing a sequence is an error
    pub fn persist(&self, receipt: &Receipt) -> LockchainResult<()> {
        let key = Self::key(receipt.sequence);
        if self
            .db
            .contains_key(key.as_bytes())
            .map_err(|e| LockchainError::Storage(e.to_string()))?
        {
            return Err(LockchainError::Storage(format!(
                "receipt {} already persisted",
                receipt.sequence
            )));
        }
        let value = serde_json::to_vec(receipt)
            .map_err(|e| LockchainError::Storage(format!("serialization failed: {}", e)))?;
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| LockchainError::Storage(e.to_string()))?;
        self.db
            .flush()
            .map_err(|e| LockchainError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn get(&self, sequence: u64) -> LockchainResult<Option<Receipt>> {
        let key = Self::key(sequence);
        match self
            .db
            .get(key.as_bytes())
            .map_err(|e| LockchainError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let receipt: Receipt = serde_json::from_slice(&bytes)
                    .map_err(|e| LockchainError::Storage(format!("corrupt receipt: {}", e)))?;
                Ok(Some(receipt))
            }
            None => Ok(None),
        }
    }

    /// Receipts in `[start, end]` sequence order
    pub fn range(&self, start: u64, end: u64) -> LockchainResult<Vec<Receipt>> {
        let start_key = Self::key(start);
        let end_key = Self::key(end);
        let mut receipts = Vec::new();
        for entry in self.db.range(start_key.as_bytes()..=end_key.as_bytes()) {
            let (_, value) = entry.map_err(|e| LockchainError::Storage(e.to_string()))?;
            let receipt: Receipt = serde_json::from_slice(&value)
                .map_err(|e| LockchainError::Storage(format!("corrupt receipt: {}", e)))?;
            receipts.push(receipt);
        }
        Ok(receipts)
    }

    /// All persisted receipts matching the filters, in chain order
    pub fn find(
        &self,
        hook_id: Option<&str>,
        actor: Option<&str>,
        from: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> LockchainResult<Vec<Receipt>> {
        let mut receipts = Vec::new();
        for entry in self.db.scan_prefix(b"receipt:") {
            let (_, value) = entry.map_err(|e| LockchainError::Storage(e.to_string()))?;
            let receipt: Receipt = serde_json::from_slice(&value)
                .map_err(|e| LockchainError::Storage(format!("corrupt receipt: {}", e)))?;
            if hook_id.is_some_and(|id| receipt.hook_id != id) {
                continue;
            }
            if actor.is_some_and(|a| receipt.actor != a) {
                continue;
            }
            if from.is_some_and(|t| receipt.timestamp < t) {
                continue;
            }
            if until.is_some_and(|t| receipt.timestamp > t) {
                continue;
            }
            receipts.push(receipt);
        }
        Ok(receipts)
    }

    pub fn count(&self) -> usize {
        self.db.len()
    }

    /// Whether every sequence in `[start, end]` is present
    pub fn verify_continuity(&self, start: u64, end: u64) -> LockchainResult<bool> {
        for sequence in start..=end {
            if self.get(sequence)?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
