//! Cache Statistics Module
//!
//! Tracks operation counters including hits, misses, writes and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Per-manager operation counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (absent, expired, corrupt)
    pub misses: u64,
    /// Number of successful writes
    pub sets: u64,
    /// Number of delete calls, including ones for absent keys
    pub deletes: u64,
    /// Entries removed by the LRU governor
    pub evictions_lru: u64,
    /// Entries removed because their TTL had passed
    pub evictions_expired: u64,
    /// Entries removed because they failed to decode
    pub evictions_corrupt: u64,
    /// Write, delete and I/O failures
    pub errors: u64,
}

impl CacheStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total entries removed by any cause.
    pub fn evictions(&self) -> u64 {
        self.evictions_lru + self.evictions_expired + self.evictions_corrupt
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_set(&mut self) {
        self.sets += 1;
    }

    pub fn record_delete(&mut self) {
        self.deletes += 1;
    }

    pub fn record_lru_eviction(&mut self) {
        self.evictions_lru += 1;
    }

    pub fn record_expired(&mut self, count: u64) {
        self.evictions_expired += count;
    }

    pub fn record_corrupt(&mut self, count: u64) {
        self.evictions_corrupt += count;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
