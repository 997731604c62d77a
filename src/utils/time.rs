use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Milliseconds since the unix epoch, the timestamp unit of change records and secrets
pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
