//! Embedding cache
//!
//! Memoizes text → vector with a fixed time-to-live. When the cache grows past
//! its capacity the oldest 20% of entries are dropped in one sweep instead of
//! keeping per-access LRU bookkeeping.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

/// Share of entries evicted once capacity is exceeded (1/5 = 20%)
const EVICTION_DIVISOR: usize = 5;

/// Cheap, non-cryptographic content hash used as the cache key (FNV-1a 64)
pub fn content_hash(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
        (h ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

struct CacheEntry {
    text: String,
    vector: Vec<f32>,
    timestamp: Instant,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_secs: u64,
}

/// TTL cache in front of the embedding backends
pub struct EmbeddingCache {
    entries: DashMap<u64, CacheEntry>,
    ttl: Duration,
    capacity: usize,
}

impl EmbeddingCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Cached vector for `text`, unless missing, expired or a hash collision
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = content_hash(text);
        {
            let entry = self.entries.get(&key)?;
            if entry.text != text {
                return None;
            }
            if entry.timestamp.elapsed() <= self.ttl {
                return Some(entry.vector.clone());
            }
        }

        // Expired. The read guard must be gone before touching the shard again.
        self.entries
            .remove_if(&key, |_, entry| entry.timestamp.elapsed() > self.ttl);
        None
    }

    /// Store a vector, evicting the oldest entries if over capacity
    pub fn put(&self, text: &str, vector: Vec<f32>) {
        self.insert_at(text, vector, Instant::now());
    }

    fn insert_at(&self, text: &str, vector: Vec<f32>, timestamp: Instant) {
        self.entries.insert(
            content_hash(text),
            CacheEntry {
                text: text.to_string(),
                vector,
                timestamp,
            },
        );
        if self.entries.len() > self.capacity {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&self) {
        let mut by_age: Vec<(u64, Instant)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().timestamp))
            .collect();
        by_age.sort_by_key(|(_, timestamp)| *timestamp);

        let count = (by_age.len() / EVICTION_DIVISOR).max(1);
        for (key, _) in by_age.into_iter().take(count) {
            self.entries.remove(&key);
        }
        log::debug!("Embedding cache pruned: removed {} entries", count);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            ttl_secs: self.ttl.as_secs(),
        }
    }
}
