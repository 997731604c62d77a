//! Store access for the change log and the secret table.
//!
//! The core only talks to the [`ChangeLogStore`] and [`SecretStore`] traits.
//! In-memory and sled-backed implementations live under `adaptors`.

mod adaptors;
mod change_log;
mod secret_store;

pub use adaptors::*;
pub use change_log::*;
pub use secret_store::*;
