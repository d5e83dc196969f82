/*!
 * Core Types
 * Common types used across the platform
 */

use std::time::{SystemTime, UNIX_EPOCH};

/// Process ID type
pub type Pid = u32;

/// Wall-clock timestamp, seconds since epoch with sub-second precision
pub type TimestampSecs = f64;

/// Common result type for platform operations
pub type MonitorResult<T> = Result<T, super::errors::MonitorError>;

/// Current wall-clock time as seconds since epoch.
///
/// Used for event timestamps only; intervals and cooldowns use the
/// monotonic clock (`std::time::Instant`).
#[inline]
pub fn now_secs() -> TimestampSecs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_secs_monotonic_enough() {
        let a = now_secs();
        let b = now_secs();
        assert!(b >= a);
        assert!(a > 1_000_000_000.0, "epoch seconds should be in the past decade");
    }
}
