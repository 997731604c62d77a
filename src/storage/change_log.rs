//! Durable change log access
//!
//! The change log is an append-only table: every configuration release appends
//! one record whose `subject` names what changed (a watch key such as
//! `app+cluster+namespace`). Ids are assigned by the store and increase
//! monotonically, but a record with a smaller id may become visible after a
//! larger one when writers commit out of order.

#[cfg(test)]
use mockall::automock;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// A durable log entry signaling that a configuration subject changed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Store-assigned, monotonically increasing id
    pub id: u64,
    /// Logical key of what changed
    pub subject: String,
    /// Milliseconds since the unix epoch
    pub last_modified: u64,
}

impl ChangeRecord {
    pub fn new(
        id: u64,
        subject: impl Into<String>,
        last_modified: u64,
    ) -> Self {
        Self {
            id,
            subject: subject.into(),
            last_modified,
        }
    }
}

/// Query surface of the change log consumed by the scanner
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChangeLogStore: Send + Sync + 'static {
    /// Records among `ids` that exist; missing ids are simply absent
    async fn find_by_ids(
        &self,
        ids: &[u64],
    ) -> Result<Vec<ChangeRecord>>;

    /// Largest id in the log, `None` when the log is empty
    async fn find_newest_id(&self) -> Result<Option<u64>>;

    /// Up to `limit` records with `id > min_id_exclusive`, ordered by id ascending
    async fn find_after(
        &self,
        min_id_exclusive: u64,
        limit: usize,
    ) -> Result<Vec<ChangeRecord>>;
}
