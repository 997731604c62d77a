//! Shared helpers for unit tests
mod listeners;
mod record_builder;

pub use listeners::*;
pub use record_builder::*;

/// Installs a test subscriber once so `RUST_LOG` works in unit tests
pub fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
