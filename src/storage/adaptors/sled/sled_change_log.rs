use async_trait::async_trait;
use sled::Tree;
use tracing::instrument;
use tracing::trace;

use crate::constants::CHANGE_LOG_TREE;
use crate::convert::safe_kv;
use crate::time::timestamp_millis;
use crate::ChangeLogStore;
use crate::ChangeRecord;
use crate::Result;

/// Change log persisted in a sled tree keyed by big-endian record id
#[derive(Debug, Clone)]
pub struct SledChangeLog {
    db: sled::Db,
    tree: Tree,
}

impl SledChangeLog {
    pub fn new(db: sled::Db) -> Result<Self> {
        let tree = db.open_tree(CHANGE_LOG_TREE)?;
        Ok(Self { db, tree })
    }

    /// Appends a record; ids come from the database's monotonic generator
    pub fn append(
        &self,
        subject: impl Into<String>,
    ) -> Result<ChangeRecord> {
        // generate_id starts at 0, record ids start at 1
        let id = self.db.generate_id()? + 1;
        let record = ChangeRecord::new(id, subject, timestamp_millis());
        self.insert(&record)?;
        trace!(id, "change record appended");
        Ok(record)
    }

    /// Writes `record` under its own id
    pub fn insert(
        &self,
        record: &ChangeRecord,
    ) -> Result<()> {
        self.tree.insert(safe_kv(record.id), bincode::serialize(record)?)?;
        Ok(())
    }

    pub fn remove(
        &self,
        id: u64,
    ) -> Result<()> {
        self.tree.remove(safe_kv(id))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub async fn flush(&self) -> Result<()> {
        self.tree.flush_async().await?;
        Ok(())
    }

    fn decode(value: &[u8]) -> Result<ChangeRecord> {
        Ok(bincode::deserialize(value)?)
    }
}

#[async_trait]
impl ChangeLogStore for SledChangeLog {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_by_ids(
        &self,
        ids: &[u64],
    ) -> Result<Vec<ChangeRecord>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(value) = self.tree.get(safe_kv(*id))? {
                found.push(Self::decode(&value)?);
            }
        }
        Ok(found)
    }

    async fn find_newest_id(&self) -> Result<Option<u64>> {
        match self.tree.last()? {
            Some((_, value)) => Ok(Some(Self::decode(&value)?.id)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn find_after(
        &self,
        min_id_exclusive: u64,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>> {
        let Some(start) = min_id_exclusive.checked_add(1) else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for item in self.tree.range(safe_kv(start)..).take(limit) {
            let (_, value) = item?;
            records.push(Self::decode(&value)?);
        }
        Ok(records)
    }
}
