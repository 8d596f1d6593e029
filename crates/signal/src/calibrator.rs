//! Confidence calibration
//!
//! Models are habitually over- or under-confident; acting on raw
//! confidence misprices every downstream decision. The calibrator
//! accumulates `(predicted_confidence, actual_outcome)` pairs from trade
//! results and fits a monotone curve mapping raw confidence to the
//! empirical hit-rate observed at that confidence level.
//!
//! Fitting bins the samples, computes per-bin accuracy, and pools adjacent
//! violators so the curve is non-decreasing. The fitted curve is published
//! as an [`CalibrationSnapshot`] behind an `Arc`: readers clone the handle
//! and keep a consistent view while a refit swaps in a replacement.
//! With too few samples the calibrator stays at the identity mapping -
//! degraded calibration must not block signal flow.

use kestrel_core::quant;
use log::{debug, info};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// One point of the fitted calibration curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    /// Bin center on the raw-confidence axis
    pub raw_confidence: f64,
    /// Empirical hit-rate of samples in the bin
    pub actual_accuracy: f64,
    pub sample_count: u32,
}

#[derive(Debug, Clone)]
pub struct CalibratorConfig {
    /// Histogram resolution over [0, 1]
    pub num_bins: usize,
    /// Below this many samples the identity mapping is used
    pub min_samples: usize,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            num_bins: 10,
            min_samples: 50,
        }
    }
}

/// Frozen view of a fitted calibration curve.
///
/// An empty snapshot is the identity mapping (calibration underflow
/// fallback). Cloning is an `Arc` clone.
#[derive(Debug, Clone, Default)]
pub struct CalibrationSnapshot {
    points: Arc<Vec<CalibrationPoint>>,
}

impl CalibrationSnapshot {
    /// True when no curve has been fitted and raw confidence passes
    /// through unchanged.
    pub fn is_identity(&self) -> bool {
        self.points.is_empty()
    }

    /// Map raw model confidence to calibrated probability.
    ///
    /// Monotone non-decreasing in `raw`: piecewise-linear between fitted
    /// points (whose accuracies are non-decreasing by construction), flat
    /// beyond the outermost bins.
    pub fn calibrate(&self, raw: f64) -> f64 {
        let raw = raw.clamp(0.0, 1.0);
        let points = &self.points;
        if points.is_empty() {
            return raw;
        }

        if raw <= points[0].raw_confidence {
            return points[0].actual_accuracy;
        }

        for pair in points.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            if raw <= right.raw_confidence {
                let span = right.raw_confidence - left.raw_confidence;
                if span <= f64::EPSILON {
                    return right.actual_accuracy;
                }
                let t = (raw - left.raw_confidence) / span;
                return left.actual_accuracy + t * (right.actual_accuracy - left.actual_accuracy);
            }
        }

        points[points.len() - 1].actual_accuracy
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }
}

/// Calibration mapping for confidence scores
///
/// Shared mutable state: outcome feeds call [`Self::add_sample`] and
/// [`Self::fit_calibration_curve`] from their own task; compression reads
/// snapshots and never blocks on a refit in progress.
pub struct ConfidenceCalibrator {
    config: CalibratorConfig,
    samples: Mutex<Vec<(f64, bool)>>,
    curve: RwLock<CalibrationSnapshot>,
}

impl ConfidenceCalibrator {
    pub fn new(config: CalibratorConfig) -> Self {
        Self {
            config,
            samples: Mutex::new(Vec::new()),
            curve: RwLock::new(CalibrationSnapshot::default()),
        }
    }

    /// Record one `(predicted confidence, actual outcome)` observation.
    pub fn add_sample(&self, predicted_confidence: f64, actual_outcome: bool) {
        let predicted = predicted_confidence.clamp(0.0, 1.0);
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((predicted, actual_outcome));
    }

    pub fn sample_count(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Refit the calibration curve from accumulated samples and publish it.
    ///
    /// With fewer than `min_samples` observations the published curve is
    /// cleared back to the identity mapping.
    pub fn fit_calibration_curve(&self) {
        let samples = self
            .samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if samples.len() < self.config.min_samples {
            debug!(
                "[CALIBRATION] {} samples < {} required, staying at identity",
                samples.len(),
                self.config.min_samples
            );
            self.publish(Vec::new());
            return;
        }

        let binned = self.bin_samples(&samples);
        let fitted = pool_adjacent_violators(binned);

        info!(
            "[CALIBRATION] fitted {} curve points from {} samples",
            fitted.len(),
            samples.len()
        );
        self.publish(fitted);
    }

    /// Map raw confidence through the current curve.
    pub fn calibrate_confidence(&self, raw_confidence: f64) -> f64 {
        self.snapshot().calibrate(raw_confidence)
    }

    /// Quantize a calibrated probability onto [0, 255].
    pub fn quantize_confidence(&self, calibrated_confidence: f64) -> u8 {
        quant::unit_to_u8(calibrated_confidence)
    }

    /// Consistent view of the fitted curve, for batch operations that must
    /// apply one calibration to every element.
    pub fn snapshot(&self) -> CalibrationSnapshot {
        self.curve
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Expected calibration error: sample-weighted mean absolute gap
    /// between bin confidence and bin accuracy. Zero at identity.
    pub fn calibration_error(&self) -> f64 {
        let snapshot = self.snapshot();
        let points = snapshot.points();
        let total: u64 = points.iter().map(|p| u64::from(p.sample_count)).sum();
        if total == 0 {
            return 0.0;
        }

        points
            .iter()
            .map(|p| {
                (p.actual_accuracy - p.raw_confidence).abs() * f64::from(p.sample_count)
            })
            .sum::<f64>()
            / total as f64
    }

    pub fn calibration_curve(&self) -> Vec<CalibrationPoint> {
        self.snapshot().points().to_vec()
    }

    fn publish(&self, points: Vec<CalibrationPoint>) {
        *self.curve.write().unwrap_or_else(PoisonError::into_inner) = CalibrationSnapshot {
            points: Arc::new(points),
        };
    }

    fn bin_samples(&self, samples: &[(f64, bool)]) -> Vec<CalibrationPoint> {
        let bins = self.config.num_bins.max(1);
        let width = 1.0 / bins as f64;
        let mut points = Vec::with_capacity(bins);

        for i in 0..bins {
            let lo = i as f64 * width;
            let hi = lo + width;
            let last_bin = i == bins - 1;

            let mut hits = 0u32;
            let mut count = 0u32;
            for &(confidence, outcome) in samples {
                let in_bin = confidence >= lo && (confidence < hi || (last_bin && confidence <= hi));
                if in_bin {
                    count += 1;
                    if outcome {
                        hits += 1;
                    }
                }
            }

            if count > 0 {
                points.push(CalibrationPoint {
                    raw_confidence: lo + width / 2.0,
                    actual_accuracy: f64::from(hits) / f64::from(count),
                    sample_count: count,
                });
            }
        }

        points
    }
}

impl Default for ConfidenceCalibrator {
    fn default() -> Self {
        Self::new(CalibratorConfig::default())
    }
}

/// Isotonic step: merge neighboring bins until accuracies are
/// non-decreasing. Merged bins take the sample-weighted mean of both axes,
/// which preserves x-ordering.
fn pool_adjacent_violators(points: Vec<CalibrationPoint>) -> Vec<CalibrationPoint> {
    let mut blocks: Vec<CalibrationPoint> = Vec::with_capacity(points.len());

    for point in points {
        blocks.push(point);
        while blocks.len() >= 2 {
            let right = blocks[blocks.len() - 1];
            let left = blocks[blocks.len() - 2];
            if left.actual_accuracy <= right.actual_accuracy {
                break;
            }

            let weight = f64::from(left.sample_count) + f64::from(right.sample_count);
            let merged = CalibrationPoint {
                raw_confidence: (left.raw_confidence * f64::from(left.sample_count)
                    + right.raw_confidence * f64::from(right.sample_count))
                    / weight,
                actual_accuracy: (left.actual_accuracy * f64::from(left.sample_count)
                    + right.actual_accuracy * f64::from(right.sample_count))
                    / weight,
                sample_count: left.sample_count + right.sample_count,
            };
            blocks.truncate(blocks.len() - 2);
            blocks.push(merged);
        }
    }

    blocks
}
