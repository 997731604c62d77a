//! Change log scanning and listener fan-out

mod listener;
mod log_scanner;
mod missing;

pub use listener::*;
pub use log_scanner::*;
pub use missing::*;

#[cfg(test)]
mod listener_test;
#[cfg(test)]
mod log_scanner_test;
#[cfg(test)]
mod missing_test;
