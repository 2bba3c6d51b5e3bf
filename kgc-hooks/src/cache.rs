//! Query cache
//!
//! LRU over (SHA-256 of the whitespace-canonicalized query, ontology
//! generation) with a per-entry TTL. Entries are immutable; eviction is
//! strict LRU. Hit and miss counters are exposed for observability.

use kgc_store::ResultSet;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Cache key: canonical query hash plus ontology generation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query_hash: String,
    generation: u64,
}

impl CacheKey {
    pub fn new(query: &str, generation: u64) -> Self {
        Self {
            query_hash: canonical_query_hash(query),
            generation,
        }
    }
}

/// Collapse whitespace runs so formatting differences share a cache entry
pub fn canonicalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 of the canonical query text, hex encoded
pub fn canonical_query_hash(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize_query(query).as_bytes());
    hex::encode(hasher.finalize())
}

struct Entry {
    result: ResultSet,
    stored_at: Instant,
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheInner {
    entries: LruCache<CacheKey, Entry>,
    hits: u64,
    misses: u64,
}

/// LRU + TTL cache for condition query results
pub struct QueryCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
            ttl,
        }
    }

    pub fn get(&self, query: &str, generation: u64) -> Option<ResultSet> {
        let key = CacheKey::new(query, generation);
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                let result = entry.result.clone();
                inner.hits += 1;
                return Some(result);
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.pop(&key);
        }
        inner.misses += 1;
        None
    }

    pub fn put(&self, query: &str, generation: u64, result: ResultSet) {
        let key = CacheKey::new(query, generation);
        self.inner.lock().entries.put(
            key,
            Entry {
                result,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
            capacity: inner.entries.cap().get(),
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }
}
