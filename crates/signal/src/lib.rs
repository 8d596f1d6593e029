//! Kestrel Signal Pipeline
//!
//! Turns rich, variable-shape analysis output into fixed-size,
//! time-decaying, integrity-checked records and builds consensus across
//! independent sources:
//!
//! ```text
//! LLMSignalInput ──► ┌──────────────────────────────────────────┐
//!                    │        Signal Compressor                 │
//!                    │  - calibrated confidence (snapshot read) │
//!                    │  - deterministic quantization            │
//!                    │  - TTL + decay function assignment       │
//!                    │  - checksum last                         │
//!                    └───────────────┬──────────────────────────┘
//!                                    │ CompactSignal (64 bytes)
//!                    ┌───────────────▼──────────────────────────┐
//!                    │        Signal Aggregator                 │
//!                    │  - rolling per-instrument window         │
//!                    │  - outlier rejection (z-score)           │
//!                    │  - agreement scoring, consensus or       │
//!                    │    disagreement callback                 │
//!                    └───────────────┬──────────────────────────┘
//!                                    │ consensus CompactSignal
//!                                    ▼
//!                    consumers call TtlValidator to discard
//!                    stale copies before acting
//! ```
//!
//! The [`ConfidenceCalibrator`] is shared mutable state fed asynchronously
//! from trade outcomes; compression only ever reads a frozen snapshot of
//! the fitted curve, so a batch is internally comparable and producers
//! never block on a refit.

pub mod aggregator;
pub mod calibrator;
pub mod compressor;
pub mod error;
pub mod ttl;

// Re-export main types
pub use aggregator::{AggregationConfig, SignalAggregator};
pub use calibrator::{CalibrationPoint, CalibrationSnapshot, CalibratorConfig, ConfidenceCalibrator};
pub use compressor::{
    CompressionConfig, CompressionMetricsSnapshot, SignalCompressor, UNKNOWN_SOURCE_BIT,
};
pub use error::{Error, Result};
pub use ttl::{FreshnessViolation, TtlConfig, TtlValidator};
