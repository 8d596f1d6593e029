//! Kestrel Clock Infrastructure
//!
//! Time abstractions for the signal-gating core. Every component that
//! reasons about signal age - compressor, TTL validation, aggregation
//! windows, policy evaluation budgets - takes an explicitly constructed
//! clock instead of reading ambient time, so expiry and decay behavior is
//! deterministic under test.
//!
//! Timestamps are nanoseconds since the Unix epoch as `u64`, matching the
//! wire record's `publish_timestamp_ns`.
//!
//! ## Usage
//!
//! ```ignore
//! use kestrel_clock::{Clock, ManualClock, SystemClock};
//! use std::sync::Arc;
//!
//! // Production: wall-clock time
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
//!
//! // Tests: frozen time, advanced by hand
//! let clock = Arc::new(ManualClock::new(1_000_000_000));
//! clock.advance_ms(600); // a 500ms-TTL signal is now expired
//! ```

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

/// Port for time abstraction
///
/// This allows the system to use different time sources:
/// - Real system time for production
/// - A manually advanced counter for deterministic tests
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds since the Unix epoch.
    fn now_ns(&self) -> u64;

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}
