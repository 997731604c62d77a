//! Long-poll slots: a request's pending wait for matching changes

mod manager;
mod slot;

pub use manager::*;
pub use slot::*;
