use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use autometrics::autometrics;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::async_task::task_with_timeout_and_exponential_backoff;
use crate::async_task::PeriodicTask;
use crate::async_task::Schedule;
use crate::constants::SECRET_SCAN_PAGE_SIZE;
use crate::BackoffPolicy;
use crate::Result;
use crate::SecretCacheConfig;
use crate::SecretEntry;
use crate::SecretStore;
use crate::API_SLO;
use crate::SECRET_CACHE_ENTRIES;

/// Secrets indexed by id and by owner.
///
/// Per entry id the version with the newest `last_modified` wins, whatever
/// the order the scans deliver versions in. `by_id` is always locked before
/// `by_owner`.
pub struct IncrementalSecretCache<S>
where
    S: SecretStore,
{
    store: Arc<S>,
    by_id: DashMap<u64, SecretEntry>,
    by_owner: DashMap<String, BTreeMap<u64, SecretEntry>>,
    /// `last_modified` of the newest entry fully read, ties included
    cursor: AtomicU64,
    refresh_lock: tokio::sync::Mutex<()>,
    page_size: usize,
    config: SecretCacheConfig,
    cancel: CancellationToken,
}

impl<S> std::fmt::Debug for IncrementalSecretCache<S>
where
    S: SecretStore,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("IncrementalSecretCache")
            .field("entries", &self.by_id.len())
            .field("owners", &self.by_owner.len())
            .field("cursor", &self.cursor())
            .finish()
    }
}

impl<S> IncrementalSecretCache<S>
where
    S: SecretStore,
{
    pub fn new(
        store: Arc<S>,
        config: SecretCacheConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            by_id: DashMap::new(),
            by_owner: DashMap::new(),
            cursor: AtomicU64::new(0),
            refresh_lock: tokio::sync::Mutex::new(()),
            page_size: SECRET_SCAN_PAGE_SIZE,
            config,
            cancel,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_page_size(
        mut self,
        page_size: usize,
    ) -> Self {
        self.page_size = page_size;
        self
    }

    /// Initial full load, retried per `policy`
    pub async fn initialize(
        &self,
        policy: BackoffPolicy,
    ) -> Result<usize> {
        let loaded = task_with_timeout_and_exponential_backoff(|| self.refresh(), policy).await?;
        info!(loaded, cursor = self.cursor(), "secret cache initialized");
        Ok(loaded)
    }

    /// Spawns the refresh (fixed delay) and reconciliation (fixed rate) loops
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let refresher = self.clone();
        let refresh = PeriodicTask::new(
            "secret_cache_refresh",
            self.config.scan_interval(),
            Schedule::FixedDelay,
            self.cancel.clone(),
        )
        .spawn(move || {
            let cache = refresher.clone();
            async move { cache.refresh().await.map(|_| ()) }
        });

        let reconciler = self.clone();
        let reconcile = PeriodicTask::new(
            "secret_cache_reconcile",
            self.config.rebuild_interval(),
            Schedule::FixedRate,
            self.cancel.clone(),
        )
        .spawn(move || {
            let cache = reconciler.clone();
            async move { cache.reconcile().await.map(|_| ()) }
        });

        vec![refresh, reconcile]
    }

    /// Reads every entry modified at or after the cursor.
    ///
    /// After a full page the entries sharing the page's last timestamp are
    /// read in full before paging continues past that timestamp. The cursor
    /// only moves once both reads succeeded, so a store error leaves it at the
    /// last fully read timestamp. Returns the number of versions applied.
    #[autometrics(objective = API_SLO)]
    pub async fn refresh(&self) -> Result<usize> {
        let _serialized = self.refresh_lock.lock().await;

        let mut since = self.cursor();
        let mut applied = 0;

        loop {
            let page = self.store.find_modified_since(since, self.page_size).await?;
            let Some(last_modified) = page.last().map(|e| e.last_modified) else {
                break;
            };
            let full_page = page.len() >= self.page_size;
            applied += self.apply(page);

            if !full_page {
                self.advance_cursor(last_modified);
                break;
            }

            let ties = self.store.find_modified_at(last_modified).await?;
            trace!(last_modified, ties = ties.len(), "boundary tie pass");
            applied += self.apply(ties);
            self.advance_cursor(last_modified);

            match last_modified.checked_add(1) {
                Some(next) => since = next,
                None => break,
            }
        }

        SECRET_CACHE_ENTRIES.set(self.by_id.len() as i64);
        if applied > 0 {
            debug!(applied, cursor = self.cursor(), "secret cache refreshed");
        }
        Ok(applied)
    }

    /// Drops every cached id the store no longer has, asking the store in
    /// batches of `reconcile_batch_size`. Returns the number removed.
    #[autometrics(objective = API_SLO)]
    pub async fn reconcile(&self) -> Result<usize> {
        let ids: Vec<u64> = self.by_id.iter().map(|e| *e.key()).collect();
        let mut removed = 0;

        for chunk in ids.chunks(self.config.reconcile_batch_size.max(1)) {
            let existing = self.store.find_existing_ids(chunk).await?;
            for id in chunk {
                if !existing.contains(id) && self.remove(*id) {
                    removed += 1;
                }
            }
        }

        SECRET_CACHE_ENTRIES.set(self.by_id.len() as i64);
        if removed > 0 {
            info!(removed, checked = ids.len(), "secret cache reconciled");
        }
        Ok(removed)
    }

    /// Current entries of `owner`, disabled ones included
    pub fn get_by_owner(
        &self,
        owner: &str,
    ) -> Vec<SecretEntry> {
        self.by_owner
            .get(owner)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Secrets of `owner` that may be used to authenticate
    pub fn available_secrets(
        &self,
        owner: &str,
    ) -> Vec<String> {
        self.by_owner
            .get(owner)
            .map(|entries| {
                entries
                    .values()
                    .filter(|e| e.enabled)
                    .map(|e| e.secret.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(
        &self,
        id: u64,
    ) -> Option<SecretEntry> {
        self.by_id.get(&id).map(|e| e.value().clone())
    }

    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn advance_cursor(
        &self,
        last_modified: u64,
    ) {
        self.cursor.fetch_max(last_modified, Ordering::SeqCst);
    }

    fn apply(
        &self,
        entries: Vec<SecretEntry>,
    ) -> usize {
        entries.into_iter().map(|e| self.upsert(e)).filter(|applied| *applied).count()
    }

    /// Stores `entry` unless a newer version of the same id is cached
    fn upsert(
        &self,
        entry: SecretEntry,
    ) -> bool {
        match self.by_id.entry(entry.id) {
            Entry::Occupied(mut cached) => {
                if entry.last_modified < cached.get().last_modified {
                    trace!(id = entry.id, "stale secret version ignored");
                    return false;
                }
                let previous = cached.insert(entry.clone());
                if previous.owner_key != entry.owner_key {
                    self.remove_from_owner(&previous.owner_key, previous.id);
                }
                self.by_owner.entry(entry.owner_key.clone()).or_default().insert(entry.id, entry);
            }
            Entry::Vacant(slot) => {
                // Keep the id shard locked until the owner index is updated
                let _cached = slot.insert(entry.clone());
                self.by_owner.entry(entry.owner_key.clone()).or_default().insert(entry.id, entry);
            }
        }
        true
    }

    fn remove(
        &self,
        id: u64,
    ) -> bool {
        match self.by_id.entry(id) {
            Entry::Occupied(cached) => {
                self.remove_from_owner(&cached.get().owner_key, id);
                cached.remove();
                trace!(id, "secret removed from cache");
                true
            }
            Entry::Vacant(_) => false,
        }
    }

    fn remove_from_owner(
        &self,
        owner: &str,
        id: u64,
    ) {
        self.by_owner.remove_if_mut(owner, |_, entries| {
            entries.remove(&id);
            entries.is_empty()
        });
    }
}
