//! A simple bounded in-memory LRU cache. This is not built for speed,
//! because it's caching expensive image transforms that dominate it by
//! orders of magnitude. Instead, we focus on predictability: entry-count
//! bounded, least-recently-used out first.

use std::{collections::HashMap, hash::Hash};

use log::trace;

/// A bounded LRU cache from `K` to `V`.
///
/// Recency is tracked with a monotonic tick, bumped on every access. When an
/// insert pushes us past `approx_max_entries`, the stalest entries are
/// pruned until we fit again.
#[derive(Debug)]
pub struct Cache<K, V> {
    name: &'static str,
    approx_max_entries: usize,
    tick: u64,
    entries: HashMap<K, Entry<V>>,
}

#[derive(Debug)]
struct Entry<V> {
    last_used: u64,
    value: V,
}

impl<K, V> Cache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Create a cache holding at most roughly `approx_max_entries` values.
    /// A bound of 0 disables caching entirely.
    pub fn new(name: &'static str, approx_max_entries: usize) -> Cache<K, V> {
        Cache {
            name,
            approx_max_entries,
            tick: 0,
            entries: HashMap::new(),
        }
    }

    /// Get a value from the cache, marking it as freshly used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        if self.approx_max_entries == 0 {
            return None;
        }
        self.tick += 1;
        let tick = self.tick;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = tick;
                trace!("cache {}: hit", self.name);
                Some(entry.value.clone())
            }
            None => {
                trace!("cache {}: miss", self.name);
                None
            }
        }
    }

    /// Store a value in the cache, evicting the least-recently-used
    /// entries if we grew too big.
    pub fn insert(&mut self, key: K, value: V) {
        if self.approx_max_entries == 0 {
            return;
        }
        self.tick += 1;
        self.entries.insert(key, Entry { last_used: self.tick, value });
        if self.entries.len() > self.approx_max_entries {
            let excess = self.entries.len() - self.approx_max_entries;
            let mut by_age: Vec<(K, u64)> = self
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.last_used))
                .collect();
            by_age.sort_by_key(|(_, last_used)| *last_used);
            for (key, _) in by_age.into_iter().take(excess) {
                self.entries.remove(&key);
            }
            trace!("cache {}: evicted {} entries", self.name, excess);
        }
    }

    /// How many entries we currently hold.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the cache empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
