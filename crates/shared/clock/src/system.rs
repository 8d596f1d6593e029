//! Real system clock

use crate::Clock;
use chrono::Utc;

/// Real system clock for production use
///
/// Returns the current wall-clock time in nanoseconds since the epoch.
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        // Nanosecond precision covers dates through 2262; saturate rather
        // than wrap if the representable range is ever exceeded.
        Utc::now()
            .timestamp_nanos_opt()
            .map(|ns| ns.max(0) as u64)
            .unwrap_or(u64::MAX)
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock::new();
        let time1 = clock.now_ns();
        thread::sleep(Duration::from_millis(10));
        let time2 = clock.now_ns();

        assert!(time2 > time1);
        assert!(time2 - time1 >= 9_000_000);
    }
}
