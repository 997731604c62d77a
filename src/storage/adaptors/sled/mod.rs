mod sled_change_log;
mod sled_secret_store;

pub use sled_change_log::*;
pub use sled_secret_store::*;


use std::path::Path;

use crate::Result;

/// Opens the embedded database holding the change log and secret trees
#[doc(hidden)]
pub fn init_sled_db(sled_db_root_path: impl AsRef<Path> + std::fmt::Debug) -> Result<sled::Db> {
    tracing::debug!("init_sled_db from path: {:?}", &sled_db_root_path);

    let db_path = sled_db_root_path.as_ref().join("config_store");

    sled::Config::default()
        .path(&db_path)
        .cache_capacity(256 * 1024 * 1024) //256MB
        .flush_every_ms(Some(10))
        .use_compression(true)
        .compression_factor(1)
        .mode(sled::Mode::HighThroughput)
        .open()
        .map_err(|e| {
            tracing::warn!(
                "Try to open DB at this location: {:?} and failed: {:?}",
                db_path,
                e
            );
            e.into()
        })
}
