//! Incrementally refreshed secret cache
//!
//! Two periodic tasks keep the cache in step with the [`SecretStore`](crate::SecretStore): an
//! incremental refresh pages through entries modified since a timestamp
//! cursor, and a reconciliation drops cached ids the store no longer has.
//! Both may run concurrently with each other and with reads.

mod incremental_cache;

pub use incremental_cache::*;
