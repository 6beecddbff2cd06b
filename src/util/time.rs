//! Time utilities for status reporting

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Process start time for uptime tracking
static PROCESS_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize process start time (call once at startup)
pub fn init_process_time() {
    PROCESS_START.get_or_init(Instant::now);
}

/// Get process uptime in seconds
pub fn uptime_secs() -> u64 {
    PROCESS_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}
