use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use tracing::trace;

use super::WatchIndex;
use crate::ChangeListener;
use crate::ChangeRecord;
use crate::ConfigCacheConfig;
use crate::Result;
use crate::CACHE_INVALIDATIONS;

#[derive(Debug, Clone)]
enum CacheSlot<V> {
    /// A loader owns the slot; only that loader may fill it
    Loading(u64),
    Ready(V),
}

/// Rendered configuration responses keyed by cache key, invalidated through a
/// [`WatchIndex`] whenever a watched subject changes.
///
/// A load marks its slot before running and stores its value only if the slot
/// still carries its mark afterwards. Invalidation clears the index edges
/// first and the slots second, so a value computed before a change can never
/// land in the cache after the change was dispatched.
#[derive(Debug)]
pub struct ConfigCache<V> {
    values: DashMap<String, CacheSlot<V>>,
    index: Arc<WatchIndex>,
    next_token: AtomicU64,
    enabled: bool,
    key_ignore_case: bool,
}

impl<V> ConfigCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        index: Arc<WatchIndex>,
        config: &ConfigCacheConfig,
    ) -> Self {
        Self {
            values: DashMap::new(),
            index,
            next_token: AtomicU64::new(1),
            enabled: config.enabled,
            key_ignore_case: config.key_ignore_case,
        }
    }

    pub fn index(&self) -> &Arc<WatchIndex> {
        &self.index
    }

    pub fn get(
        &self,
        cache_key: &str,
    ) -> Option<V> {
        match self.values.get(&self.normalize(cache_key))?.value() {
            CacheSlot::Ready(v) => Some(v.clone()),
            CacheSlot::Loading(_) => None,
        }
    }

    /// Returns the cached value for `cache_key`, or runs `loader` and caches
    /// its result under edges from each of `watch_keys`.
    ///
    /// The loaded value is always returned; it is only cached when no
    /// invalidation touched `cache_key` while the loader ran.
    pub async fn get_or_load<F, Fut>(
        &self,
        cache_key: &str,
        watch_keys: &[String],
        loader: F,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if !self.enabled {
            return loader().await;
        }

        let key = self.normalize(cache_key);
        if let Some(v) = self.get(&key) {
            return Ok(v);
        }

        // Marked before subscribing: an invalidation racing the subscription
        // must find the mark and void this load
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.values.insert(key.clone(), CacheSlot::Loading(token));
        for watch_key in watch_keys {
            self.index.subscribe(&self.normalize(watch_key), &key);
        }

        let loaded = loader().await;

        match self.values.entry(key) {
            Entry::Occupied(mut slot) if matches!(slot.get(), CacheSlot::Loading(t) if *t == token) => {
                match &loaded {
                    Ok(v) => {
                        slot.insert(CacheSlot::Ready(v.clone()));
                    }
                    Err(_) => {
                        self.index.forget_cache_key(slot.key());
                        slot.remove();
                    }
                }
            }
            Entry::Occupied(slot) => trace!(cache_key = slot.key().as_str(), "slot taken over by another load"),
            Entry::Vacant(slot) => debug!(
                cache_key = slot.key().as_str(),
                "invalidated while loading; value not cached"
            ),
        }

        loaded
    }

    /// Drops the values of `cache_keys`; returns how many were present
    pub fn evict<I, K>(
        &self,
        cache_keys: I,
    ) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut evicted = 0;
        for key in cache_keys {
            if self.values.remove(key.as_ref()).is_some() {
                evicted += 1;
            }
        }
        CACHE_INVALIDATIONS.inc_by(evicted as u64);
        evicted
    }

    /// Drops one entry together with its index edges
    pub fn remove(
        &self,
        cache_key: &str,
    ) -> bool {
        let key = self.normalize(cache_key);
        self.index.forget_cache_key(&key);
        self.evict([key]) > 0
    }

    /// Invalidates everything derived from `watch_key`
    pub fn invalidate(
        &self,
        watch_key: &str,
    ) -> usize {
        let cache_keys = self.index.invalidate(&self.normalize(watch_key));
        if cache_keys.is_empty() {
            return 0;
        }
        let evicted = self.evict(&cache_keys);
        debug!(watch_key, cache_keys = cache_keys.len(), evicted, "config cache invalidated");
        evicted
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn normalize(
        &self,
        key: &str,
    ) -> String {
        if self.key_ignore_case {
            key.to_lowercase()
        } else {
            key.to_string()
        }
    }
}

impl<V> ChangeListener for ConfigCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn handle(
        &self,
        record: &ChangeRecord,
        _topic: &str,
    ) -> Result<()> {
        self.invalidate(&record.subject);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "config_cache"
    }
}
