//! Log throttling utilities
//!
//! A misconfigured or hostile telemetry sender can push hundreds of malformed
//! payloads per second. Warnings about them go through a limiter so the log
//! stays readable while the listener keeps serving.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default budget for malformed-telemetry warnings
pub const MALFORMED_WARN_RATE: u32 = 2; // Max 2 warnings per second

/// Throttle gate for repetitive log lines
pub struct LogLimiter {
    limiter: Limiter,
}

impl LogLimiter {
    /// Create a limiter allowing `per_second` log lines per second
    pub fn per_second(per_second: u32) -> Self {
        let quota =
            Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Check whether the next log line is within budget
    pub fn allow(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl Default for LogLimiter {
    fn default() -> Self {
        Self::per_second(MALFORMED_WARN_RATE)
    }
}
