use std::collections::HashSet;

use async_trait::async_trait;
use sled::transaction::ConflictableTransactionError;
use sled::transaction::TransactionError;
use sled::Transactional;
use sled::Tree;
use tracing::instrument;

use crate::constants::SECRET_MODIFIED_INDEX_TREE;
use crate::constants::SECRET_TREE;
use crate::convert::composite_key;
use crate::convert::safe_kv;
use crate::convert::split_composite_key;
use crate::Error;
use crate::Result;
use crate::SecretEntry;
use crate::SecretStore;
use crate::StorageError;

/// Secret store persisted in sled.
///
/// `secrets` maps id to entry; `by_modified` maps `(last_modified, id)` to
/// nothing and gives the ordered scan the incremental cache pages through.
/// Both trees change inside one transaction.
#[derive(Debug, Clone)]
pub struct SledSecretStore {
    secrets: Tree,
    by_modified: Tree,
}

impl SledSecretStore {
    pub fn new(db: &sled::Db) -> Result<Self> {
        Ok(Self {
            secrets: db.open_tree(SECRET_TREE)?,
            by_modified: db.open_tree(SECRET_MODIFIED_INDEX_TREE)?,
        })
    }

    /// Inserts or replaces the entry with the same id
    pub fn upsert(
        &self,
        entry: &SecretEntry,
    ) -> Result<()> {
        let id_key = safe_kv(entry.id);
        let value = bincode::serialize(entry)?;
        let index_key = composite_key(entry.last_modified, entry.id);

        (&self.secrets, &self.by_modified)
            .transaction(|(secrets, by_modified)| {
                if let Some(previous) = secrets.insert(id_key.to_vec(), value.clone())? {
                    let previous = decode_in_tx(&previous)?;
                    by_modified.remove(composite_key(previous.last_modified, previous.id).to_vec())?;
                }
                by_modified.insert(index_key.to_vec(), Vec::<u8>::new())?;
                Ok(())
            })
            .map_err(map_tx_error)
    }

    /// Removes the entry with `id`, returning it when present
    pub fn delete(
        &self,
        id: u64,
    ) -> Result<Option<SecretEntry>> {
        let id_key = safe_kv(id);

        (&self.secrets, &self.by_modified)
            .transaction(|(secrets, by_modified)| match secrets.remove(id_key.to_vec())? {
                Some(previous) => {
                    let previous = decode_in_tx(&previous)?;
                    by_modified.remove(composite_key(previous.last_modified, previous.id).to_vec())?;
                    Ok(Some(previous))
                }
                None => Ok(None),
            })
            .map_err(map_tx_error)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    fn load(
        &self,
        id: u64,
    ) -> Result<Option<SecretEntry>> {
        match self.secrets.get(safe_kv(id))? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn load_indexed(
        &self,
        index_key: &[u8],
    ) -> Result<SecretEntry> {
        let (_, id) = split_composite_key(index_key)?;
        self.load(id)?.ok_or_else(|| {
            StorageError::DataCorruption {
                location: format!("secret index points at missing id {id}"),
            }
            .into()
        })
    }
}

fn decode_in_tx(
    value: &[u8]
) -> std::result::Result<SecretEntry, ConflictableTransactionError<StorageError>> {
    bincode::deserialize(value)
        .map_err(|e| ConflictableTransactionError::Abort(StorageError::BincodeError(e)))
}

fn map_tx_error(e: TransactionError<StorageError>) -> Error {
    match e {
        TransactionError::Abort(e) => e.into(),
        TransactionError::Storage(e) => e.into(),
    }
}

#[async_trait]
impl SecretStore for SledSecretStore {
    #[instrument(skip(self))]
    async fn find_modified_since(
        &self,
        since: u64,
        limit: usize,
    ) -> Result<Vec<SecretEntry>> {
        let mut entries = Vec::new();
        for item in self.by_modified.range(composite_key(since, 0)..).take(limit) {
            let (key, _) = item?;
            entries.push(self.load_indexed(&key)?);
        }
        Ok(entries)
    }

    async fn find_modified_at(
        &self,
        at: u64,
    ) -> Result<Vec<SecretEntry>> {
        let mut entries = Vec::new();
        for item in self.by_modified.range(composite_key(at, 0)..=composite_key(at, u64::MAX)) {
            let (key, _) = item?;
            entries.push(self.load_indexed(&key)?);
        }
        Ok(entries)
    }

    async fn find_existing_ids(
        &self,
        ids: &[u64],
    ) -> Result<HashSet<u64>> {
        let mut existing = HashSet::with_capacity(ids.len());
        for id in ids {
            if self.secrets.contains_key(safe_kv(*id))? {
                existing.insert(*id);
            }
        }
        Ok(existing)
    }
}
