use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::Result;
use crate::SecretEntry;
use crate::SecretStore;

/// In-memory secret store
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<u64, SecretEntry>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry with the same id
    pub fn upsert(
        &self,
        entry: SecretEntry,
    ) {
        self.entries.write().insert(entry.id, entry);
    }

    pub fn delete(
        &self,
        id: u64,
    ) -> Option<SecretEntry> {
        self.entries.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn find_modified_since(
        &self,
        since: u64,
        limit: usize,
    ) -> Result<Vec<SecretEntry>> {
        let mut found: Vec<SecretEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| e.last_modified >= since)
            .cloned()
            .collect();
        found.sort_by_key(|e| (e.last_modified, e.id));
        found.truncate(limit);
        Ok(found)
    }

    async fn find_modified_at(
        &self,
        at: u64,
    ) -> Result<Vec<SecretEntry>> {
        let mut found: Vec<SecretEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| e.last_modified == at)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.id);
        Ok(found)
    }

    async fn find_existing_ids(
        &self,
        ids: &[u64],
    ) -> Result<HashSet<u64>> {
        let entries = self.entries.read();
        Ok(ids.iter().copied().filter(|id| entries.contains_key(id)).collect())
    }
}
