use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use autometrics::autometrics;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ChangeListener;
use super::ListenerRegistry;
use super::MissingRecordTracker;
use crate::async_task::task_with_timeout_and_exponential_backoff;
use crate::async_task::PeriodicTask;
use crate::async_task::Schedule;
use crate::constants::RELEASE_TOPIC;
use crate::BackoffPolicy;
use crate::ChangeLogStore;
use crate::ChangeRecord;
use crate::Result;
use crate::ScannerConfig;
use crate::API_SLO;
use crate::ABANDONED_RECORDS;
use crate::HIGH_WATER_MARK;
use crate::MISSING_RECORDS;
use crate::SCANNED_RECORDS;

/// Polls the change log and fans every new record out to the listeners.
///
/// Each tick first retries the ids tracked as missing, then scans forward
/// from the high-water mark in batches. Ticks are serialized whether they
/// come from the periodic task or a direct call.
pub struct LogScanner<S>
where
    S: ChangeLogStore,
{
    store: Arc<S>,
    listeners: ListenerRegistry,
    missing: Mutex<MissingRecordTracker>,
    high_water_mark: AtomicU64,
    tick_lock: tokio::sync::Mutex<()>,
    batch_size: usize,
    missing_record_max_age: u32,
    cancel: CancellationToken,
}

impl<S> std::fmt::Debug for LogScanner<S>
where
    S: ChangeLogStore,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LogScanner")
            .field("high_water_mark", &self.high_water_mark())
            .field("missing", &self.missing.lock().len())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl<S> LogScanner<S>
where
    S: ChangeLogStore,
{
    pub fn new(
        store: Arc<S>,
        config: &ScannerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            listeners: ListenerRegistry::new(),
            missing: Mutex::new(MissingRecordTracker::new(
                config.missing_record_max_age,
                config.max_missing_records,
            )),
            high_water_mark: AtomicU64::new(0),
            tick_lock: tokio::sync::Mutex::new(()),
            batch_size: config.batch_size,
            missing_record_max_age: config.missing_record_max_age,
            cancel,
        }
    }

    /// Sets the high-water mark to the newest id in the log, so records that
    /// existed before startup are never replayed.
    pub async fn initialize(
        &self,
        policy: BackoffPolicy,
    ) -> Result<u64> {
        let store = self.store.clone();
        let newest = task_with_timeout_and_exponential_backoff(
            move || {
                let store = store.clone();
                async move { store.find_newest_id().await }
            },
            policy,
        )
        .await?
        .unwrap_or(0);

        self.high_water_mark.fetch_max(newest, Ordering::SeqCst);
        HIGH_WATER_MARK.set(self.high_water_mark() as i64);
        info!(high_water_mark = self.high_water_mark(), "log scanner initialized");
        Ok(self.high_water_mark())
    }

    /// Spawns the fixed-delay polling loop; it stops with the cancellation token
    pub fn start(
        self: &Arc<Self>,
        poll_interval: Duration,
    ) -> JoinHandle<()> {
        let scanner = self.clone();
        PeriodicTask::new(
            "log_scanner",
            poll_interval,
            Schedule::FixedDelay,
            self.cancel.clone(),
        )
        .spawn(move || {
            let scanner = scanner.clone();
            async move { scanner.tick().await }
        })
    }

    pub fn add_listener(
        &self,
        listener: Arc<dyn ChangeListener>,
    ) -> bool {
        let added = self.listeners.add(listener);
        debug!(added, total = self.listeners.len(), "listener registration");
        added
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn high_water_mark(&self) -> u64 {
        self.high_water_mark.load(Ordering::SeqCst)
    }

    /// Tracks `id` as missing so the next ticks look it up again.
    ///
    /// Ids above the high-water mark are left to the forward scan.
    pub fn mark_missing(
        &self,
        id: u64,
    ) -> bool {
        if id == 0 || id > self.high_water_mark() {
            return false;
        }
        let mut missing = self.missing.lock();
        let tracked = missing.track(id);
        MISSING_RECORDS.set(missing.len() as i64);
        tracked
    }

    pub fn missing_ids(&self) -> Vec<u64> {
        self.missing.lock().ids()
    }

    /// One scan cycle. Store errors abort the cycle without moving the mark
    /// past unread data; the next cycle starts over from the same point.
    #[autometrics(objective = API_SLO)]
    pub async fn tick(&self) -> Result<()> {
        let _serialized = self.tick_lock.lock().await;

        self.resolve_missing().await?;
        self.scan_forward().await
    }

    async fn resolve_missing(&self) -> Result<()> {
        let ids = self.missing.lock().ids();
        if ids.is_empty() {
            return Ok(());
        }

        let mut found = self.store.find_by_ids(&ids).await?;
        found.sort_by_key(|r| r.id);
        for record in &found {
            // Another path may have resolved it meanwhile
            if self.missing.lock().resolve(record.id) {
                debug!(id = record.id, "missing change record found");
                self.dispatch(record);
            }
        }

        let abandoned = self.missing.lock().age(&ids);
        for id in abandoned {
            ABANDONED_RECORDS.inc();
            info!(
                id,
                lookups = self.missing_record_max_age,
                "giving up on missing change record"
            );
        }

        MISSING_RECORDS.set(self.missing.lock().len() as i64);
        Ok(())
    }

    async fn scan_forward(&self) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                debug!("forward scan cancelled");
                return Ok(());
            }

            let batch = self.store.find_after(self.high_water_mark(), self.batch_size).await?;
            let fetched = batch.len();

            for record in batch {
                let mark = self.high_water_mark();
                if record.id <= mark {
                    warn!(id = record.id, mark, "store returned a record at or below the mark");
                    continue;
                }

                self.track_gap(mark, record.id);
                self.missing.lock().resolve(record.id);
                self.dispatch(&record);

                self.high_water_mark.store(record.id, Ordering::SeqCst);
                HIGH_WATER_MARK.set(record.id as i64);
            }

            MISSING_RECORDS.set(self.missing.lock().len() as i64);

            if fetched < self.batch_size {
                return Ok(());
            }
        }
    }

    /// Ids strictly between `mark` and `next_id` were skipped: a writer with a
    /// smaller id has not committed yet.
    fn track_gap(
        &self,
        mark: u64,
        next_id: u64,
    ) {
        // Before the first record there is nothing to have skipped
        if mark == 0 || next_id <= mark + 1 {
            return;
        }

        let mut missing = self.missing.lock();
        for id in (mark + 1)..next_id {
            if missing.is_full() {
                warn!(
                    from = id,
                    to = next_id - 1,
                    "missing record tracker full; gap not tracked"
                );
                break;
            }
            missing.track(id);
        }
    }

    fn dispatch(
        &self,
        record: &ChangeRecord,
    ) {
        SCANNED_RECORDS.inc();
        self.listeners.dispatch(record, RELEASE_TOPIC);
    }
}
