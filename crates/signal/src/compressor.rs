//! Signal compression
//!
//! The one place a [`CompactSignal`] is created. Compression quantizes
//! every floating-point field of the rich input through the explicit
//! quantizers, runs raw confidence through the calibrator, stamps the
//! publish timestamp and TTL, and computes the checksum last.
//! Decompression reconstructs a lossy audit record: aggregate scores and
//! source names survive, free text does not.

use crate::calibrator::{CalibrationSnapshot, ConfidenceCalibrator};
use crate::error::{Error, Result};
use kestrel_clock::Clock;
use kestrel_core::codec::fnv1a_64;
use kestrel_core::{CompactSignal, DecayFunction, LLMSignalInput, SignalType, quant};
use log::warn;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Bit set in `source_mask` for data sources with no configured bit.
pub const UNKNOWN_SOURCE_BIT: u8 = 31;

/// Sentiment magnitude below which a signal is Hold rather than Buy/Sell.
const SENTIMENT_DEADBAND: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Default signal lifetime
    pub default_ttl_ms: u16,
    /// Lifetime for inputs flagged urgent
    pub urgent_ttl_ms: u16,
    /// Decay function stamped on produced signals
    pub default_decay: DecayFunction,
    /// Maximum batch size for [`SignalCompressor::compress_batch`]
    pub max_batch_size: usize,
    /// Venues eligible to act on produced signals
    pub platform_mask: u8,
    /// Named data source -> bit index in `source_mask` (0..=30).
    /// Unnamed sources fold into [`UNKNOWN_SOURCE_BIT`].
    pub source_bits: HashMap<String, u8>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 500,
            urgent_ttl_ms: 100,
            default_decay: DecayFunction::Exponential,
            max_batch_size: 1000,
            platform_mask: 0xFF,
            source_bits: HashMap::new(),
        }
    }
}

/// Compression counters. All atomic; read through [`Self::snapshot`].
#[derive(Debug, Default)]
pub struct CompressionMetrics {
    pub signals_compressed: AtomicU64,
    pub signals_validated: AtomicU64,
    pub compression_errors: AtomicU64,
    pub checksum_failures: AtomicU64,
    pub avg_compression_time_ns: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionMetricsSnapshot {
    pub signals_compressed: u64,
    pub signals_validated: u64,
    pub compression_errors: u64,
    pub checksum_failures: u64,
    pub avg_compression_time_ns: u64,
}

impl CompressionMetrics {
    pub fn snapshot(&self) -> CompressionMetricsSnapshot {
        CompressionMetricsSnapshot {
            signals_compressed: self.signals_compressed.load(Ordering::Relaxed),
            signals_validated: self.signals_validated.load(Ordering::Relaxed),
            compression_errors: self.compression_errors.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            avg_compression_time_ns: self.avg_compression_time_ns.load(Ordering::Relaxed),
        }
    }

    fn record_time(&self, elapsed_ns: u64) {
        // Moving average over the last ~64 observations
        let current = self.avg_compression_time_ns.load(Ordering::Relaxed);
        let updated = (current * 63 + elapsed_ns) / 64;
        self.avg_compression_time_ns.store(updated, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.signals_compressed.store(0, Ordering::Relaxed);
        self.signals_validated.store(0, Ordering::Relaxed);
        self.compression_errors.store(0, Ordering::Relaxed);
        self.checksum_failures.store(0, Ordering::Relaxed);
        self.avg_compression_time_ns.store(0, Ordering::Relaxed);
    }
}

/// Signal compression engine
pub struct SignalCompressor {
    config: CompressionConfig,
    calibrator: Arc<ConfidenceCalibrator>,
    clock: Arc<dyn Clock>,
    next_signal_id: AtomicU32,
    metrics: CompressionMetrics,
}

impl SignalCompressor {
    pub fn new(
        config: CompressionConfig,
        calibrator: Arc<ConfidenceCalibrator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            calibrator,
            clock,
            next_signal_id: AtomicU32::new(0),
            metrics: CompressionMetrics::default(),
        }
    }

    /// Compress one rich input into a signed-off 64-byte record.
    pub fn compress(&self, input: &LLMSignalInput) -> CompactSignal {
        let calibration = self.calibrator.snapshot();
        self.compress_with(input, &calibration)
    }

    /// Compress a batch, preserving input order.
    ///
    /// One calibration snapshot is applied to every element: a refit that
    /// lands mid-batch must not make the batch internally incomparable.
    pub fn compress_batch(&self, inputs: &[LLMSignalInput]) -> Result<Vec<CompactSignal>> {
        if inputs.len() > self.config.max_batch_size {
            return Err(Error::BatchTooLarge {
                got: inputs.len(),
                max: self.config.max_batch_size,
            });
        }

        let calibration = self.calibrator.snapshot();
        Ok(inputs
            .iter()
            .map(|input| self.compress_with(input, &calibration))
            .collect())
    }

    /// Reconstruct a best-effort rich record for audit/replay.
    ///
    /// Lossy: free text and per-source detail are not recoverable, only
    /// aggregate scores and the named sources behind the source mask.
    pub fn decompress(&self, signal: &CompactSignal) -> Result<LLMSignalInput> {
        self.validate_signal(signal)?;

        let mut output = LLMSignalInput::new(
            signal.signal_id.to_string(),
            String::new(),
            signal.symbol(),
        );
        output.sentiment_score = quant::milli_to_signed_unit(signal.direction);
        output.confidence_score = quant::u8_to_unit(signal.confidence);
        output.risk_score = quant::milli_to_unit(signal.risk_score);
        output.volatility_estimate = quant::milli_to_unit(signal.volatility);
        output.data_sources = self.sources_from_mask(signal.source_mask);
        output.is_urgent = signal.priority == u8::MAX;

        let age_ns = u64::from(signal.age_ms) * 1_000_000;
        output.source_timestamp_ns = signal.publish_timestamp_ns.saturating_sub(age_ns);
        // Processing window is not stored; split the latency evenly
        output.processing_start_ns = signal.publish_timestamp_ns.saturating_sub(age_ns / 2);
        output.processing_end_ns = signal.publish_timestamp_ns;

        Ok(output)
    }

    /// Hard integrity check. A failed checksum means programmer error or
    /// memory corruption: the signal is discarded and counted, never
    /// repaired.
    pub fn validate_signal(&self, signal: &CompactSignal) -> Result<()> {
        if signal.verify_integrity() {
            self.metrics.signals_validated.fetch_add(1, Ordering::Relaxed);
            Ok(())
        } else {
            self.metrics.checksum_failures.fetch_add(1, Ordering::Relaxed);
            self.metrics.compression_errors.fetch_add(1, Ordering::Relaxed);
            warn!(
                "[COMPRESS] integrity check failed for signal {}, discarding",
                signal.signal_id
            );
            Err(Error::IntegrityCheckFailed {
                signal_id: signal.signal_id,
            })
        }
    }

    /// Staleness against an override window: TTL expiry OR publish older
    /// than `max_age_ns`.
    pub fn is_signal_stale(&self, signal: &CompactSignal, max_age_ns: u64) -> bool {
        let now_ns = self.clock.now_ns();
        signal.is_expired(now_ns)
            || now_ns.saturating_sub(signal.publish_timestamp_ns) > max_age_ns
    }

    pub fn calibrator(&self) -> &Arc<ConfidenceCalibrator> {
        &self.calibrator
    }

    pub fn metrics(&self) -> &CompressionMetrics {
        &self.metrics
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn compress_with(
        &self,
        input: &LLMSignalInput,
        calibration: &CalibrationSnapshot,
    ) -> CompactSignal {
        let publish_ns = self.clock.now_ns();

        let calibrated = calibration.calibrate(input.confidence_score);
        let confidence = quant::unit_to_u8(calibrated);

        let signal_type = if input.sentiment_score > SENTIMENT_DEADBAND {
            SignalType::Buy
        } else if input.sentiment_score < -SENTIMENT_DEADBAND {
            SignalType::Sell
        } else {
            SignalType::Hold
        };

        let age_ms = (publish_ns.saturating_sub(input.source_timestamp_ns) / 1_000_000)
            .min(u64::from(u16::MAX)) as u16;

        let mut signal = CompactSignal {
            signal_id: self.next_signal_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1),
            signal_type,
            confidence,
            priority: if input.is_urgent { u8::MAX } else { confidence },
            platform_mask: self.config.platform_mask,
            publish_timestamp_ns: publish_ns,
            ttl_ms: if input.is_urgent {
                self.config.urgent_ttl_ms
            } else {
                self.config.default_ttl_ms
            },
            age_ms,
            direction: quant::signed_unit_to_milli(input.sentiment_score),
            magnitude: quant::unit_to_milli(input.sentiment_score.abs()) as i16,
            risk_score: quant::unit_to_milli(input.risk_score),
            volatility: quant::unit_to_milli(input.volatility_estimate),
            token_symbol: [0; 8],
            token_hash: fnv1a_64(input.token_address.as_bytes()),
            source_mask: self.source_mask_for(&input.data_sources),
            model_version: (fnv1a_64(input.model_version.as_bytes()) & 0xFFFF) as u16,
            decay_function: self.config.default_decay,
            checksum: 0,
        };
        signal.set_symbol(&input.token_symbol);
        signal.refresh_checksum();

        self.metrics.signals_compressed.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .record_time(self.clock.now_ns().saturating_sub(publish_ns));

        signal
    }

    fn source_mask_for(&self, sources: &[String]) -> u32 {
        sources.iter().fold(0u32, |mask, source| {
            let bit = self
                .config
                .source_bits
                .get(source)
                .copied()
                .unwrap_or(UNKNOWN_SOURCE_BIT)
                .min(UNKNOWN_SOURCE_BIT);
            mask | (1 << bit)
        })
    }

    fn sources_from_mask(&self, mask: u32) -> Vec<String> {
        let mut sources: Vec<String> = self
            .config
            .source_bits
            .iter()
            .filter(|&(_, bit)| *bit < 32 && mask & (1 << *bit) != 0)
            .map(|(name, _)| name.clone())
            .collect();
        sources.sort();
        sources
    }
}
