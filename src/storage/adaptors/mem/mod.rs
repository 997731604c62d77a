pub mod mem_change_log;
pub mod mem_secret_store;

pub use mem_change_log::*;
pub use mem_secret_store::*;

#[cfg(test)]
mod mem_store_test;
