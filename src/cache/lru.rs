//! LRU Index Module
//!
//! In-memory access ordering over namespaced keys. Not persisted: a new
//! process starts with an empty index and learns order from its own traffic.

use std::collections::HashMap;

use crate::cache::{LRU_MAX_TRACKED, LRU_TRIM_TARGET};

// == LRU Index ==
/// Maps each tracked namespaced key to the counter value of its last access.
///
/// The counter only ever grows, so sorting by it gives exact LRU order.
#[derive(Debug)]
pub struct LruIndex {
    access: HashMap<String, u64>,
    counter: u64,
    max_tracked: usize,
    trim_target: usize,
}

impl Default for LruIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LruIndex {
    // == Constructor ==
    pub fn new() -> Self {
        Self::with_limits(LRU_MAX_TRACKED, LRU_TRIM_TARGET)
    }

    /// Index that trims itself to `trim_target` keys once it grows past
    /// `max_tracked`.
    pub fn with_limits(max_tracked: usize, trim_target: usize) -> Self {
        Self {
            access: HashMap::new(),
            counter: 0,
            max_tracked,
            trim_target: trim_target.min(max_tracked),
        }
    }

    // == Touch ==
    /// Marks a key as most recently used.
    pub fn touch(&mut self, key: &str) {
        self.counter += 1;
        match self.access.get_mut(key) {
            Some(slot) => *slot = self.counter,
            None => {
                self.access.insert(key.to_string(), self.counter);
            }
        }

        if self.access.len() > self.max_tracked {
            self.trim();
        }
    }

    // == Remove ==
    /// Stops tracking a key.
    pub fn remove(&mut self, key: &str) {
        self.access.remove(key);
    }

    // == Oldest First ==
    /// Tracked keys ordered from least to most recently used.
    pub fn oldest_first(&self) -> Vec<String> {
        let mut keys: Vec<(&String, u64)> = self.access.iter().map(|(k, &c)| (k, c)).collect();
        keys.sort_unstable_by_key(|&(_, counter)| counter);
        keys.into_iter().map(|(k, _)| k.clone()).collect()
    }

    /// Last access counter of a key.
    pub fn last_access(&self, key: &str) -> Option<u64> {
        self.access.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.access.len()
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.access.contains_key(key)
    }

    /// Forgets every key. The counter keeps running.
    pub fn clear(&mut self) {
        self.access.clear();
    }

    // Keeps the `trim_target` most recent keys.
    fn trim(&mut self) {
        let mut counters: Vec<u64> = self.access.values().copied().collect();
        let excess = counters.len().saturating_sub(self.trim_target);
        if excess == 0 {
            return;
        }
        let (_, cutoff, _) = counters.select_nth_unstable(excess - 1);
        let cutoff = *cutoff;
        self.access.retain(|_, &mut c| c > cutoff);
        tracing::debug!(
            "LRU index trimmed to {} keys (cutoff counter {})",
            self.access.len(),
            cutoff
        );
    }
}
