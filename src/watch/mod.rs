//! Watch-key to cache-key invalidation

mod config_cache;
mod keys;
mod watch_index;

pub use config_cache::*;
pub use keys::*;
pub use watch_index::*;
