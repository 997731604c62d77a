use std::collections::HashMap;
use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::trace;

use crate::WATCH_INDEX_EDGES;

#[derive(Debug, Default)]
struct Edges {
    cache_keys_by_watch_key: HashMap<String, HashSet<String>>,
    watch_keys_by_cache_key: HashMap<String, HashSet<String>>,
    count: usize,
}

/// Many-to-many relation between watch keys and rendered cache keys.
///
/// Both directions sit behind a single lock, so every operation observes and
/// leaves the two maps consistent with each other.
#[derive(Debug, Default)]
pub struct WatchIndex {
    edges: RwLock<Edges>,
}

impl WatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the edge in both directions. Returns false if it already existed.
    pub fn subscribe(
        &self,
        watch_key: &str,
        cache_key: &str,
    ) -> bool {
        let mut edges = self.edges.write();
        let inserted = edges
            .cache_keys_by_watch_key
            .entry(watch_key.to_string())
            .or_default()
            .insert(cache_key.to_string());
        if inserted {
            edges
                .watch_keys_by_cache_key
                .entry(cache_key.to_string())
                .or_default()
                .insert(watch_key.to_string());
            edges.count += 1;
            WATCH_INDEX_EDGES.set(edges.count as i64);
        }
        inserted
    }

    /// Removes `watch_key`, every cache key reachable from it, and the edges
    /// other watch keys hold to those cache keys.
    ///
    /// Returns the removed cache keys; an unknown watch key yields an empty set.
    pub fn invalidate(
        &self,
        watch_key: &str,
    ) -> HashSet<String> {
        let mut edges = self.edges.write();
        let Some(cache_keys) = edges.cache_keys_by_watch_key.remove(watch_key) else {
            return HashSet::new();
        };

        let mut removed = 0;
        for cache_key in &cache_keys {
            let Some(watch_keys) = edges.watch_keys_by_cache_key.remove(cache_key) else {
                continue;
            };
            for other in watch_keys {
                removed += 1;
                if other == watch_key {
                    continue;
                }
                if let Some(siblings) = edges.cache_keys_by_watch_key.get_mut(&other) {
                    siblings.remove(cache_key);
                    if siblings.is_empty() {
                        edges.cache_keys_by_watch_key.remove(&other);
                    }
                }
            }
        }

        edges.count -= removed;
        WATCH_INDEX_EDGES.set(edges.count as i64);
        trace!(watch_key, cache_keys = cache_keys.len(), edges = removed, "watch key invalidated");
        cache_keys
    }

    /// Drops every edge of `cache_key`, e.g. when the entry is evicted for
    /// reasons other than a change
    pub fn forget_cache_key(
        &self,
        cache_key: &str,
    ) -> usize {
        let mut edges = self.edges.write();
        let Some(watch_keys) = edges.watch_keys_by_cache_key.remove(cache_key) else {
            return 0;
        };
        for watch_key in &watch_keys {
            if let Some(cache_keys) = edges.cache_keys_by_watch_key.get_mut(watch_key) {
                cache_keys.remove(cache_key);
                if cache_keys.is_empty() {
                    edges.cache_keys_by_watch_key.remove(watch_key);
                }
            }
        }
        edges.count -= watch_keys.len();
        WATCH_INDEX_EDGES.set(edges.count as i64);
        watch_keys.len()
    }

    pub fn cache_keys_of(
        &self,
        watch_key: &str,
    ) -> HashSet<String> {
        self.edges.read().cache_keys_by_watch_key.get(watch_key).cloned().unwrap_or_default()
    }

    pub fn watch_keys_of(
        &self,
        cache_key: &str,
    ) -> HashSet<String> {
        self.edges.read().watch_keys_by_cache_key.get(cache_key).cloned().unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.read().count
    }

    pub fn is_empty(&self) -> bool {
        self.edge_count() == 0
    }
}
