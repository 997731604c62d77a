//! Secret (access key) store access
//!
//! Secrets belong to an owner (an application) and carry a last-modified
//! timestamp that the incremental cache uses as its scan cursor.

use std::collections::HashSet;

#[cfg(test)]
use mockall::automock;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// One credential as stored and cached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretEntry {
    pub id: u64,
    /// Owner the secret authenticates, e.g. an app id
    pub owner_key: String,
    pub secret: String,
    /// Disabled secrets stay cached but are not handed out
    pub enabled: bool,
    /// Milliseconds since the unix epoch
    pub last_modified: u64,
}

impl SecretEntry {
    pub fn new(
        id: u64,
        owner_key: impl Into<String>,
        secret: impl Into<String>,
        last_modified: u64,
    ) -> Self {
        Self {
            id,
            owner_key: owner_key.into(),
            secret: secret.into(),
            enabled: true,
            last_modified,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Query surface of the secret store consumed by the incremental cache
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync + 'static {
    /// Up to `limit` entries with `last_modified >= since`, ordered by
    /// `(last_modified, id)` ascending
    async fn find_modified_since(
        &self,
        since: u64,
        limit: usize,
    ) -> Result<Vec<SecretEntry>>;

    /// Every entry whose `last_modified` equals `at`
    async fn find_modified_at(
        &self,
        at: u64,
    ) -> Result<Vec<SecretEntry>>;

    /// The subset of `ids` still present in the store
    async fn find_existing_ids(
        &self,
        ids: &[u64],
    ) -> Result<HashSet<u64>>;
}
