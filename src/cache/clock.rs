//! Time source abstraction for expiration decisions
//!
//! Expiration math runs on monotonic nanosecond stamps supplied by a
//! [`Clock`] injected at engine construction. Production uses the
//! process-relative [`SystemClock`]; tests drive a [`ManualClock`] so that
//! absolute and sliding expiration can be exercised without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;

/// Process start reference for monotonic stamps
static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic nanosecond time source
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Nanoseconds since an arbitrary fixed origin; never decreases
    fn now_ns(&self) -> u64;
}

/// Monotonic wall clock relative to process start
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        PROCESS_EPOCH.elapsed().as_nanos() as u64
    }
}

/// Manually advanced clock for tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by the given number of milliseconds
    pub fn advance_ms(&self, millis: u64) {
        self.now_ns
            .fetch_add(millis.saturating_mul(1_000_000), Ordering::SeqCst);
    }

    /// Advance the clock by the given number of seconds
    pub fn advance_secs(&self, secs: u64) {
        self.advance_ms(secs.saturating_mul(1_000));
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

/// Convert a fractional minute count to nanoseconds, clamping negatives to 0
#[inline(always)]
pub fn minutes_to_ns(minutes: f64) -> u64 {
    if minutes <= 0.0 {
        return 0;
    }
    (minutes * 60.0 * 1e9) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_ns(), 0);
        clock.advance_ms(250);
        assert_eq!(clock.now_ns(), 250_000_000);
        clock.advance_secs(1);
        assert_eq!(clock.now_ns(), 1_250_000_000);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }

    #[test]
    fn test_minutes_conversion() {
        assert_eq!(minutes_to_ns(1.0), 60_000_000_000);
        assert_eq!(minutes_to_ns(0.5), 30_000_000_000);
        assert_eq!(minutes_to_ns(0.0), 0);
        assert_eq!(minutes_to_ns(-3.0), 0);
    }
}
