//! TTL validation and decay weighting
//!
//! Consumers call this at the moment of use: a signal that was live when
//! it left the cache may be dead by the time an order is built from it.
//! Staleness is a normal terminal state, not an error - stale signals are
//! filtered, and only strict mode records them, into a bounded violation
//! log consumed by audit tooling. The log never drives control flow.

use kestrel_clock::Clock;
use kestrel_core::CompactSignal;
use log::debug;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone)]
pub struct TtlConfig {
    /// Exponential decay rate per millisecond
    pub decay_lambda: f64,
    /// Record freshness failures in the violation log
    pub strict: bool,
    /// Violation log capacity; oldest entries are dropped beyond this
    pub max_violations: usize,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            decay_lambda: 0.001,
            strict: false,
            max_violations: 1024,
        }
    }
}

/// One recorded freshness failure, for downstream audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessViolation {
    /// When the stale signal was observed
    pub timestamp_ns: u64,
    pub signal_id: u32,
    pub observed_age_ms: u64,
    pub allowed_max_ms: u64,
}

/// Evaluates freshness and decayed weight of signals at query time
pub struct TtlValidator {
    config: TtlConfig,
    clock: Arc<dyn Clock>,
    violations: Mutex<VecDeque<FreshnessViolation>>,
}

impl TtlValidator {
    pub fn new(config: TtlConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            violations: Mutex::new(VecDeque::new()),
        }
    }

    /// Is the signal still inside its TTL window right now?
    pub fn validate_signal_freshness(&self, signal: &CompactSignal) -> bool {
        self.freshness_at(signal, self.clock.now_ns())
    }

    /// Freshness at an explicit point in time.
    pub fn freshness_at(&self, signal: &CompactSignal, now_ns: u64) -> bool {
        let fresh = !signal.is_expired(now_ns);
        if !fresh && self.config.strict {
            self.record_violation(signal, now_ns);
        }
        fresh
    }

    /// Decayed confidence weight in [0, 1], using the signal's own decay
    /// function and the configured lambda. Expired signals weigh 0.0.
    pub fn calculate_signal_weight(&self, signal: &CompactSignal) -> f64 {
        self.weight_at(signal, self.clock.now_ns())
    }

    /// Decayed weight at an explicit point in time.
    pub fn weight_at(&self, signal: &CompactSignal, now_ns: u64) -> f64 {
        signal.decayed_confidence(now_ns, self.config.decay_lambda)
    }

    /// Evaluate a batch against one point-in-time snapshot.
    ///
    /// Results are in input order and every signal is evaluated
    /// independently - no short-circuit on the first stale entry.
    pub fn validate_batch(&self, signals: &[CompactSignal]) -> Vec<bool> {
        let now_ns = self.clock.now_ns();
        signals
            .iter()
            .map(|signal| self.freshness_at(signal, now_ns))
            .collect()
    }

    /// Decayed weights for a batch, in input order.
    pub fn weigh_batch(&self, signals: &[CompactSignal]) -> Vec<f64> {
        let now_ns = self.clock.now_ns();
        signals
            .iter()
            .map(|signal| self.weight_at(signal, now_ns))
            .collect()
    }

    /// Copy of the current violation log, oldest first.
    pub fn violations(&self) -> Vec<FreshnessViolation> {
        self.violations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    pub fn violation_count(&self) -> usize {
        self.violations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear_violations(&self) {
        self.violations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record_violation(&self, signal: &CompactSignal, now_ns: u64) {
        let violation = FreshnessViolation {
            timestamp_ns: now_ns,
            signal_id: signal.signal_id,
            observed_age_ms: signal.age_ms_at(now_ns),
            allowed_max_ms: u64::from(signal.ttl_ms),
        };
        debug!(
            "[TTL] signal {} stale: {}ms old, {}ms allowed",
            violation.signal_id, violation.observed_age_ms, violation.allowed_max_ms
        );

        let mut log = self.violations.lock().unwrap_or_else(PoisonError::into_inner);
        log.push_back(violation);
        while log.len() > self.config.max_violations {
            log.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_clock::ManualClock;
    use kestrel_core::DecayFunction;

    fn make_signal(id: u32, publish_ns: u64, ttl_ms: u16, decay: DecayFunction) -> CompactSignal {
        let mut signal = CompactSignal {
            signal_id: id,
            confidence: 255,
            publish_timestamp_ns: publish_ns,
            ttl_ms,
            decay_function: decay,
            ..Default::default()
        };
        signal.refresh_checksum();
        signal
    }

    fn validator(strict: bool, clock: Arc<ManualClock>) -> TtlValidator {
        TtlValidator::new(
            TtlConfig {
                strict,
                ..Default::default()
            },
            clock,
        )
    }

    #[test]
    fn test_freshness_tracks_ttl() {
        let clock = Arc::new(ManualClock::new(1_000_000_000));
        let validator = validator(false, Arc::clone(&clock));
        let signal = make_signal(1, 1_000_000_000, 500, DecayFunction::Exponential);

        assert!(validator.validate_signal_freshness(&signal));
        clock.advance_ms(499);
        assert!(validator.validate_signal_freshness(&signal));
        clock.advance_ms(2);
        assert!(!validator.validate_signal_freshness(&signal));
    }

    #[test]
    fn test_expired_signal_weighs_zero_for_every_decay() {
        let clock = Arc::new(ManualClock::new(1_000_000_000));
        let validator = validator(false, Arc::clone(&clock));
        clock.advance_ms(600);

        for decay in [
            DecayFunction::Exponential,
            DecayFunction::Linear,
            DecayFunction::Step,
        ] {
            let signal = make_signal(1, 1_000_000_000, 500, decay);
            assert_eq!(validator.calculate_signal_weight(&signal), 0.0);
        }
    }

    #[test]
    fn test_exponential_weight_decreases_with_age() {
        let clock = Arc::new(ManualClock::new(1_000_000_000));
        let validator = validator(false, Arc::clone(&clock));
        let signal = make_signal(1, 1_000_000_000, 60_000, DecayFunction::Exponential);

        let fresh = validator.calculate_signal_weight(&signal);
        assert!((fresh - 1.0).abs() < 1e-9);

        clock.advance_ms(100);
        let aged = validator.calculate_signal_weight(&signal);
        assert!(aged < fresh);
        assert!((aged - (-0.001f64 * 100.0).exp()).abs() < 1e-6);
    }

    #[test]
    fn test_batch_keeps_order_and_evaluates_every_entry() {
        let clock = Arc::new(ManualClock::new(2_000_000_000));
        let validator = validator(true, Arc::clone(&clock));

        let signals = [
            make_signal(1, 1_000_000_000, 100, DecayFunction::Step), // long expired
            make_signal(2, 2_000_000_000, 500, DecayFunction::Step), // fresh
            make_signal(3, 1_000_000_000, 100, DecayFunction::Step), // long expired
            make_signal(4, 2_000_000_000, 500, DecayFunction::Step), // fresh
        ];

        let results = validator.validate_batch(&signals);
        assert_eq!(results, vec![false, true, false, true]);

        // No short-circuit: both stale entries were independently seen
        let violations = validator.violations();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].signal_id, 1);
        assert_eq!(violations[1].signal_id, 3);
        assert_eq!(violations[0].observed_age_ms, 1_000);
        assert_eq!(violations[0].allowed_max_ms, 100);
    }

    #[test]
    fn test_non_strict_mode_records_nothing() {
        let clock = Arc::new(ManualClock::new(2_000_000_000));
        let validator = validator(false, Arc::clone(&clock));
        let stale = make_signal(1, 1_000_000_000, 100, DecayFunction::Step);

        assert!(!validator.validate_signal_freshness(&stale));
        assert_eq!(validator.violation_count(), 0);
    }

    #[test]
    fn test_violation_log_is_bounded() {
        let clock = Arc::new(ManualClock::new(2_000_000_000));
        let validator = TtlValidator::new(
            TtlConfig {
                strict: true,
                max_violations: 3,
                ..Default::default()
            },
            clock.clone(),
        );

        for id in 0..10 {
            let stale = make_signal(id, 1_000_000_000, 100, DecayFunction::Step);
            validator.validate_signal_freshness(&stale);
        }

        let violations = validator.violations();
        assert_eq!(violations.len(), 3);
        // Oldest entries dropped
        assert_eq!(violations[0].signal_id, 7);
        assert_eq!(violations[2].signal_id, 9);
    }
}
