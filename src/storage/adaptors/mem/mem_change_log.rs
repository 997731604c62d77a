use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use crate::time::timestamp_millis;
use crate::ChangeLogStore;
use crate::ChangeRecord;
use crate::Result;

/// In-memory change log
///
/// Besides `append`, records can be inserted with an explicit id to reproduce
/// out-of-order commits (a larger id visible before a smaller one).
#[derive(Debug)]
pub struct MemoryChangeLog {
    records: RwLock<BTreeMap<u64, ChangeRecord>>,
    next_id: AtomicU64,
}

impl Default for MemoryChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Appends a record with the next id
    pub fn append(
        &self,
        subject: impl Into<String>,
    ) -> ChangeRecord {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = ChangeRecord::new(id, subject, timestamp_millis());
        self.records.write().insert(id, record.clone());
        trace!(id, "change record appended");
        record
    }

    /// Inserts a record keeping its id; later appends continue after the largest id
    pub fn insert(
        &self,
        record: ChangeRecord,
    ) {
        self.next_id.fetch_max(record.id + 1, Ordering::SeqCst);
        self.records.write().insert(record.id, record);
    }

    pub fn remove(
        &self,
        id: u64,
    ) -> Option<ChangeRecord> {
        self.records.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChangeLogStore for MemoryChangeLog {
    async fn find_by_ids(
        &self,
        ids: &[u64],
    ) -> Result<Vec<ChangeRecord>> {
        let records = self.records.read();
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }

    async fn find_newest_id(&self) -> Result<Option<u64>> {
        Ok(self.records.read().keys().next_back().copied())
    }

    async fn find_after(
        &self,
        min_id_exclusive: u64,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>> {
        let records = self.records.read();
        Ok(records
            .range(min_id_exclusive.saturating_add(1)..)
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect())
    }
}
