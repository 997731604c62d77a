//! Change propagation core of a distributed configuration service.
//!
//! A [`LogScanner`] polls the durable change log and fans new records out to
//! listeners. Two listeners ship with the crate: the [`ConfigCache`], which
//! evicts rendered configuration through the [`WatchIndex`], and the
//! [`LongPollManager`], which completes clients' pending waits. The
//! [`IncrementalSecretCache`] mirrors the secret store on its own schedule.

mod config;
mod constants;
mod errors;
mod long_poll;
mod metrics;
mod node;
mod scanner;
mod secret_cache;
mod storage;
mod watch;
pub mod utils;

pub use config::*;
pub use constants::*;
pub use errors::*;
pub use long_poll::*;
pub use metrics::*;
pub use node::*;
pub use scanner::*;
pub use secret_cache::*;
pub use storage::*;
pub use utils::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
