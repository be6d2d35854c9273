//! Read-through cache with a fixed time-to-live

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Size past which an insert sweeps out expired entries
const PRUNE_THRESHOLD: usize = 256;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Concurrent map whose entries expire after `ttl`
#[derive(Debug)]
pub struct TtlCache<K: Eq + Hash, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    prune_threshold: usize,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            prune_threshold: PRUNE_THRESHOLD,
        }
    }

    pub fn with_prune_threshold(mut self, threshold: usize) -> Self {
        self.prune_threshold = threshold;
        self
    }

    /// Fresh value for `key`, dropping it if expired
    pub fn get(&self, key: &K) -> Option<V> {
        let ttl = self.ttl;
        self.entries
            .remove_if(key, |_, entry| entry.inserted_at.elapsed() > ttl);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        if self.entries.len() >= self.prune_threshold {
            self.prune();
        }
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every expired entry
    pub fn prune(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
