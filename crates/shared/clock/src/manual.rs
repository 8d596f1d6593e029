//! Manually advanced clock for deterministic tests

use crate::Clock;
use std::sync::atomic::{AtomicU64, Ordering};

/// A clock that only moves when told to
///
/// Time is an atomic counter, so a shared `Arc<ManualClock>` can be
/// advanced from a test while components read it concurrently. This is
/// how TTL, decay, and window-eviction behavior is tested without
/// sleeping.
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
        }
    }

    /// Move time forward by `delta_ns` nanoseconds.
    pub fn advance_ns(&self, delta_ns: u64) {
        self.now_ns.fetch_add(delta_ns, Ordering::SeqCst);
    }

    /// Move time forward by `delta_ms` milliseconds.
    pub fn advance_ms(&self, delta_ms: u64) {
        self.advance_ns(delta_ms * 1_000_000);
    }

    /// Jump to an absolute time.
    pub fn set_ns(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_only_moves_when_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ns(), 1_000);
        assert_eq!(clock.now_ns(), 1_000);

        clock.advance_ns(500);
        assert_eq!(clock.now_ns(), 1_500);

        clock.advance_ms(2);
        assert_eq!(clock.now_ns(), 2_001_500);

        clock.set_ns(42);
        assert_eq!(clock.now_ns(), 42);
    }
}
