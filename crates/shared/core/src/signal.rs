//! CompactSignal - the fixed 64-byte trading signal record
//!
//! Producers compress rich analysis output into this record once; after
//! that it is passive data, cloned by value between threads and components.
//! All scaled fields are written through [`crate::quant`], the checksum is
//! a pure function of the other encoded bytes, and expiry depends only on
//! `publish_timestamp_ns` and `ttl_ms` - never on the observational
//! `age_ms`, which records source-to-publish latency and nothing else.

use crate::codec;
use serde::{Deserialize, Serialize};

/// Direction of a trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignalType {
    /// No position change
    #[default]
    Hold = 0,
    /// Enter or add to a long position
    Buy = 1,
    /// Enter or add to a short position / reduce long
    Sell = 2,
}

impl SignalType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Hold),
            1 => Some(Self::Buy),
            2 => Some(Self::Sell),
            _ => None,
        }
    }
}

/// How a signal's confidence ages between publish and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum DecayFunction {
    /// `confidence * exp(-lambda * age_ms)`
    #[default]
    Exponential = 0,
    /// `confidence * max(0, 1 - age_ms / ttl_ms)`
    Linear = 1,
    /// Full confidence until expiry, then zero
    Step = 2,
}

impl DecayFunction {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Exponential),
            1 => Some(Self::Linear),
            2 => Some(Self::Step),
            _ => None,
        }
    }
}

/// Compact signal record (64 bytes on the wire)
///
/// `Copy` by design: a fixed 64-byte value has no aliasing hazards and
/// requires no synchronization to read, so it is always passed by value
/// between threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactSignal {
    /// Producer-assigned, unique per compression event
    pub signal_id: u32,
    pub signal_type: SignalType,
    /// Calibrated probability quantized onto [0, 255]
    pub confidence: u8,
    /// Higher = more urgent
    pub priority: u8,
    /// Bitfield of venues eligible to act on this signal
    pub platform_mask: u8,
    /// When the signal became consumable (ns since epoch)
    pub publish_timestamp_ns: u64,
    /// Validity window after publish
    pub ttl_ms: u16,
    /// Source-to-publish latency, written once at publish. Observational
    /// only: expiry and decay never read this field.
    pub age_ms: u16,
    /// Scaled signal strength in [-1000, 1000]
    pub direction: i16,
    /// Absolute signal strength in [0, 1000]
    pub magnitude: i16,
    /// Scaled risk in [0, 1000], higher = riskier
    pub risk_score: u16,
    /// Expected volatility, scaled to [0, 1000]
    pub volatility: u16,
    /// NUL-padded symbol, at most 8 bytes
    pub token_symbol: [u8; 8],
    /// Stable hash of the full contract address
    pub token_hash: u64,
    /// Bitfield of data sources that contributed
    pub source_mask: u32,
    /// Producing model version, for audit
    pub model_version: u16,
    pub decay_function: DecayFunction,
    /// CRC32 over the other encoded bytes
    pub checksum: u32,
}

impl Default for CompactSignal {
    fn default() -> Self {
        let mut signal = Self {
            signal_id: 0,
            signal_type: SignalType::Hold,
            confidence: 0,
            priority: 0,
            platform_mask: 0,
            publish_timestamp_ns: 0,
            ttl_ms: 0,
            age_ms: 0,
            direction: 0,
            magnitude: 0,
            risk_score: 0,
            volatility: 0,
            token_symbol: [0; 8],
            token_hash: 0,
            source_mask: 0,
            model_version: 0,
            decay_function: DecayFunction::Exponential,
            checksum: 0,
        };
        signal.refresh_checksum();
        signal
    }
}

impl CompactSignal {
    /// Symbol as a string slice, up to the first NUL byte.
    pub fn symbol(&self) -> &str {
        let end = self
            .token_symbol
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.token_symbol.len());
        std::str::from_utf8(&self.token_symbol[..end]).unwrap_or("")
    }

    /// Write a symbol, truncated to 8 bytes on a character boundary.
    ///
    /// The caller is responsible for calling [`Self::refresh_checksum`]
    /// once all mutations are done.
    pub fn set_symbol(&mut self, symbol: &str) {
        self.token_symbol = [0; 8];
        let mut len = symbol.len().min(8);
        while !symbol.is_char_boundary(len) {
            len -= 1;
        }
        self.token_symbol[..len].copy_from_slice(&symbol.as_bytes()[..len]);
    }

    /// Age in whole milliseconds at `now_ns`, recomputed from the publish
    /// timestamp. Zero if the clock reads before publish.
    pub fn age_ms_at(&self, now_ns: u64) -> u64 {
        now_ns.saturating_sub(self.publish_timestamp_ns) / 1_000_000
    }

    /// Has the TTL lapsed at `now_ns`?
    ///
    /// Monotone in `now_ns - publish_timestamp_ns`; depends only on
    /// `ttl_ms`. Compared in nanoseconds so the signal expires the instant
    /// its window is exceeded, not a full millisecond later.
    pub fn is_expired(&self, now_ns: u64) -> bool {
        now_ns.saturating_sub(self.publish_timestamp_ns) > u64::from(self.ttl_ms) * 1_000_000
    }

    /// Confidence in [0, 1] after applying this signal's decay function.
    ///
    /// Expired signals weight to 0.0 regardless of function. `lambda` is
    /// the exponential decay rate per millisecond.
    pub fn decayed_confidence(&self, now_ns: u64, lambda: f64) -> f64 {
        if self.is_expired(now_ns) {
            return 0.0;
        }

        let age_ms = now_ns.saturating_sub(self.publish_timestamp_ns) as f64 / 1_000_000.0;
        let base = f64::from(self.confidence) / 255.0;

        match self.decay_function {
            DecayFunction::Exponential => base * (-lambda * age_ms).exp(),
            DecayFunction::Linear => {
                if self.ttl_ms == 0 {
                    base
                } else {
                    base * (1.0 - age_ms / f64::from(self.ttl_ms)).max(0.0)
                }
            }
            DecayFunction::Step => base,
        }
    }

    /// Is the *observational* age (source-to-publish latency) within
    /// `max_age_ns`? Distinct from TTL expiry: this asks whether the signal
    /// was fresh when published, not whether it is still alive.
    pub fn is_fresh(&self, now_ns: u64, max_age_ns: u64) -> bool {
        let age_ns = u64::from(self.age_ms) * 1_000_000;
        age_ns <= max_age_ns && self.publish_timestamp_ns <= now_ns
    }

    /// Checksum over every encoded byte except the checksum field itself.
    pub fn compute_checksum(&self) -> u32 {
        codec::checksum_of(self)
    }

    /// Recompute and store the checksum. Must be called after any other
    /// field changes.
    pub fn refresh_checksum(&mut self) {
        self.checksum = self.compute_checksum();
    }

    /// Does the stored checksum match the record's bytes?
    pub fn verify_integrity(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    /// Encode to the 64-byte wire image.
    pub fn encode(&self) -> [u8; codec::SIGNAL_WIRE_SIZE] {
        codec::encode(self)
    }

    /// Decode from a wire image, verifying version and integrity.
    pub fn decode(bytes: &[u8]) -> Result<Self, codec::CodecError> {
        codec::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_signal(publish_ns: u64, ttl_ms: u16, confidence: u8) -> CompactSignal {
        let mut signal = CompactSignal {
            signal_id: 42,
            signal_type: SignalType::Buy,
            confidence,
            publish_timestamp_ns: publish_ns,
            ttl_ms,
            ..Default::default()
        };
        signal.set_symbol("BTC");
        signal.refresh_checksum();
        signal
    }

    #[test]
    fn test_not_expired_at_publish_instant() {
        let signal = make_signal(1_000_000_000, 500, 200);
        assert!(!signal.is_expired(1_000_000_000));
    }

    #[test]
    fn test_expiry_is_monotone() {
        let publish = 1_000_000_000u64;
        let signal = make_signal(publish, 500, 200);
        let ttl_ns = 500 * 1_000_000u64;

        assert!(!signal.is_expired(publish + ttl_ns));
        assert!(signal.is_expired(publish + ttl_ns + 1));
        assert!(signal.is_expired(publish + ttl_ns + 1_000_000_000));
    }

    #[test]
    fn test_expired_signal_weighs_zero_for_every_decay_function() {
        let publish = 1_000_000_000u64;
        // 600ms old with a 500ms TTL
        let query = publish + 600 * 1_000_000;

        for decay in [
            DecayFunction::Exponential,
            DecayFunction::Linear,
            DecayFunction::Step,
        ] {
            let mut signal = make_signal(publish, 500, 255);
            signal.decay_function = decay;
            signal.refresh_checksum();
            assert!(signal.is_expired(query));
            assert_eq!(signal.decayed_confidence(query, 0.001), 0.0);
        }
    }

    #[test]
    fn test_exponential_decay_strictly_decreasing() {
        let publish = 1_000_000_000u64;
        let signal = make_signal(publish, 60_000, 255);

        let at_zero = signal.decayed_confidence(publish, 0.001);
        assert!((at_zero - 1.0).abs() < 1e-9);

        let mut previous = at_zero;
        for age_ms in [1u64, 10, 100, 1_000, 10_000] {
            let weight = signal.decayed_confidence(publish + age_ms * 1_000_000, 0.001);
            assert!(weight < previous, "decay must strictly decrease with age");
            previous = weight;
        }
    }

    #[test]
    fn test_linear_decay_reaches_zero_at_ttl() {
        let publish = 1_000_000_000u64;
        let mut signal = make_signal(publish, 1_000, 255);
        signal.decay_function = DecayFunction::Linear;
        signal.refresh_checksum();

        let half = signal.decayed_confidence(publish + 500 * 1_000_000, 0.001);
        assert!((half - 0.5).abs() < 1e-6);

        let full = signal.decayed_confidence(publish + 1_000 * 1_000_000, 0.001);
        assert!(full.abs() < 1e-6);
    }

    #[test]
    fn test_step_decay_holds_until_expiry() {
        let publish = 1_000_000_000u64;
        let mut signal = make_signal(publish, 500, 128);
        signal.decay_function = DecayFunction::Step;
        signal.refresh_checksum();

        let base = f64::from(signal.confidence) / 255.0;
        let just_before = signal.decayed_confidence(publish + 499 * 1_000_000, 0.001);
        assert!((just_before - base).abs() < 1e-9);
        assert_eq!(signal.decayed_confidence(publish + 501 * 1_000_000, 0.001), 0.0);
    }

    #[test]
    fn test_freshness_uses_observational_age_not_ttl() {
        let mut signal = make_signal(1_000_000_000, 500, 200);
        signal.age_ms = 50;
        signal.refresh_checksum();

        // 50ms of source latency against a 60ms window: fresh
        assert!(signal.is_fresh(2_000_000_000, 60 * 1_000_000));
        // Against a 40ms window: not fresh, even though the TTL is fine
        assert!(!signal.is_fresh(2_000_000_000, 40 * 1_000_000));
    }

    #[test]
    fn test_tampering_breaks_integrity() {
        let mut signal = make_signal(1_000_000_000, 500, 200);
        assert!(signal.verify_integrity());

        signal.direction = 999;
        assert!(!signal.verify_integrity());

        signal.refresh_checksum();
        assert!(signal.verify_integrity());
    }

    #[test]
    fn test_symbol_truncates_on_char_boundary() {
        let mut signal = CompactSignal::default();

        signal.set_symbol("PEPE");
        assert_eq!(signal.symbol(), "PEPE");

        signal.set_symbol("LONGSYMBOL");
        assert_eq!(signal.symbol(), "LONGSYMB");

        // 4 x 3-byte chars: 12 bytes, must cut at 6 not mid-character
        signal.set_symbol("€€€€");
        assert_eq!(signal.symbol(), "€€");
    }
}
