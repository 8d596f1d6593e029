//! Multi-source signal aggregation
//!
//! Several analysis pipelines may cover the same instrument at once. The
//! aggregator keeps a short rolling window per instrument and produces a
//! consensus signal only when enough *distinct* sources agree; when they
//! disagree it hands the raw window to a disagreement callback and emits
//! nothing - guessing is the caller's prerogative, not the aggregator's.
//!
//! Distinct sources are counted as the population of the union of the
//! window's `source_mask` bits, so five signals from one feed never
//! masquerade as five sources. Signals carrying no source bits never
//! reach consensus.

use kestrel_clock::Clock;
use kestrel_core::{CompactSignal, SignalType};
use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Scaled-direction deadband for classifying a consensus as Buy/Sell/Hold.
const DIRECTION_DEADBAND: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Minimum distinct sources before a consensus may be emitted
    pub min_sources: usize,
    /// Minimum agreement score; below it the disagreement callback fires
    pub consensus_threshold: f64,
    pub enable_outlier_detection: bool,
    /// Z-score on `direction` beyond which an entry is an outlier
    pub outlier_z_threshold: f64,
    /// Rolling window length
    pub window_ns: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            min_sources: 2,
            consensus_threshold: 0.7,
            enable_outlier_detection: true,
            outlier_z_threshold: 2.0,
            window_ns: 100_000_000, // 100ms
        }
    }
}

pub type ConsensusCallback = Box<dyn Fn(&CompactSignal) + Send + Sync>;
pub type DisagreementCallback = Box<dyn Fn(&[CompactSignal]) + Send + Sync>;

/// Signal aggregation and consensus
pub struct SignalAggregator {
    config: AggregationConfig,
    clock: Arc<dyn Clock>,
    /// Rolling windows keyed by `token_hash`
    windows: Mutex<HashMap<u64, VecDeque<CompactSignal>>>,
    consensus_callback: RwLock<Option<ConsensusCallback>>,
    disagreement_callback: RwLock<Option<DisagreementCallback>>,
    loop_running: AtomicBool,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SignalAggregator {
    pub fn new(config: AggregationConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            windows: Mutex::new(HashMap::new()),
            consensus_callback: RwLock::new(None),
            disagreement_callback: RwLock::new(None),
            loop_running: AtomicBool::new(false),
            loop_handle: Mutex::new(None),
        }
    }

    /// Append a signal to its instrument's window, evicting entries older
    /// than the window.
    pub fn add_signal(&self, signal: CompactSignal) {
        let now_ns = self.clock.now_ns();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(signal.token_hash).or_default();
        Self::evict_older_than(window, now_ns, self.config.window_ns);
        window.push_back(signal);
    }

    /// Current consensus for one instrument, if the window supports one.
    ///
    /// `None` means insufficient distinct sources or disagreement; in the
    /// disagreement case the callback receives the raw window and the
    /// admission decision stays with the caller.
    pub fn consensus_signal(&self, token_hash: u64) -> Option<CompactSignal> {
        let now_ns = self.clock.now_ns();
        let entries = {
            let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
            let window = windows.get_mut(&token_hash)?;
            Self::evict_older_than(window, now_ns, self.config.window_ns);
            window.iter().copied().collect::<Vec<_>>()
        };
        self.consensus_from(&entries, token_hash, now_ns)
    }

    /// Would this set of signals produce a consensus?
    pub fn validate_consensus(&self, signals: &[CompactSignal]) -> bool {
        Self::distinct_source_count(signals) >= self.config.min_sources
            && self.calculate_agreement_score(signals) >= self.config.consensus_threshold
    }

    /// Fraction of entries whose direction sign matches the majority sign.
    pub fn calculate_agreement_score(&self, signals: &[CompactSignal]) -> f64 {
        if signals.is_empty() {
            return 0.0;
        }

        let mut counts = [0usize; 3]; // sell, hold, buy
        for signal in signals {
            counts[(signal.direction.signum() + 1) as usize] += 1;
        }
        let majority = counts.into_iter().max().unwrap_or(0);
        majority as f64 / signals.len() as f64
    }

    /// Indices of entries whose direction z-score exceeds the threshold.
    pub fn detect_outliers(&self, signals: &[CompactSignal]) -> Vec<usize> {
        if signals.len() < 2 {
            return Vec::new();
        }

        let directions: Vec<f64> = signals.iter().map(|s| f64::from(s.direction)).collect();
        let mean = directions.iter().sum::<f64>() / directions.len() as f64;
        let variance = directions
            .iter()
            .map(|d| (d - mean).powi(2))
            .sum::<f64>()
            / directions.len() as f64;
        let std_dev = variance.sqrt();
        if std_dev <= f64::EPSILON {
            return Vec::new();
        }

        directions
            .iter()
            .enumerate()
            .filter(|(_, d)| ((*d - mean) / std_dev).abs() > self.config.outlier_z_threshold)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn set_consensus_callback(&self, callback: ConsensusCallback) {
        *self
            .consensus_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn set_disagreement_callback(&self, callback: DisagreementCallback) {
        *self
            .disagreement_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Number of live entries in an instrument's window.
    pub fn window_len(&self, token_hash: u64) -> usize {
        let now_ns = self.clock.now_ns();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        match windows.get_mut(&token_hash) {
            Some(window) => {
                Self::evict_older_than(window, now_ns, self.config.window_ns);
                window.len()
            }
            None => 0,
        }
    }

    /// Sweep every instrument once, emitting consensus signals through the
    /// consensus callback.
    pub fn sweep(&self) {
        let keys: Vec<u64> = {
            let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
            windows.keys().copied().collect()
        };

        for token_hash in keys {
            if let Some(consensus) = self.consensus_signal(token_hash)
                && let Some(callback) = self
                    .consensus_callback
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_ref()
            {
                callback(&consensus);
            }
        }
    }

    /// Start a background task sweeping for consensus every `interval_ms`.
    /// No-op if already running.
    pub fn start_aggregation_loop(self: Arc<Self>, interval_ms: u64) {
        if self.loop_running.swap(true, Ordering::SeqCst) {
            return;
        }

        let aggregator = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            while aggregator.loop_running.load(Ordering::SeqCst) {
                ticker.tick().await;
                aggregator.sweep();
            }
        });
        *self
            .loop_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Stop the background sweep task.
    pub fn stop_aggregation_loop(&self) {
        self.loop_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self
            .loop_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    fn evict_older_than(window: &mut VecDeque<CompactSignal>, now_ns: u64, window_ns: u64) {
        let cutoff = now_ns.saturating_sub(window_ns);
        while let Some(front) = window.front() {
            if front.publish_timestamp_ns < cutoff {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    fn distinct_source_count(signals: &[CompactSignal]) -> usize {
        signals
            .iter()
            .fold(0u32, |mask, signal| mask | signal.source_mask)
            .count_ones() as usize
    }

    fn consensus_from(
        &self,
        entries: &[CompactSignal],
        token_hash: u64,
        now_ns: u64,
    ) -> Option<CompactSignal> {
        if entries.is_empty() || Self::distinct_source_count(entries) < self.config.min_sources {
            return None;
        }

        let agreement = self.calculate_agreement_score(entries);
        if agreement < self.config.consensus_threshold {
            debug!(
                "[AGGREGATE] agreement {agreement:.2} below threshold for instrument {token_hash:#018x}, deferring to caller"
            );
            if let Some(callback) = self
                .disagreement_callback
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
            {
                callback(entries);
            }
            return None;
        }

        // Outlier rejection is all-or-nothing: it must never itself drop
        // the surviving count below min_sources.
        let mut survivors: Vec<CompactSignal> = entries.to_vec();
        if self.config.enable_outlier_detection {
            let outliers = self.detect_outliers(entries);
            if !outliers.is_empty() && entries.len() - outliers.len() >= self.config.min_sources {
                survivors = entries
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !outliers.contains(i))
                    .map(|(_, s)| *s)
                    .collect();
            }
        }

        Some(self.synthesize(&survivors, token_hash, now_ns))
    }

    fn synthesize(
        &self,
        survivors: &[CompactSignal],
        token_hash: u64,
        now_ns: u64,
    ) -> CompactSignal {
        let count = survivors.len() as f64;
        let mean = |extract: fn(&CompactSignal) -> f64| -> f64 {
            survivors.iter().map(extract).sum::<f64>() / count
        };

        let direction_mean = mean(|s| f64::from(s.direction));
        let signal_type = if direction_mean > DIRECTION_DEADBAND {
            SignalType::Buy
        } else if direction_mean < -DIRECTION_DEADBAND {
            SignalType::Sell
        } else {
            SignalType::Hold
        };

        // Most recent contributor lends its identity fields
        let latest = survivors
            .iter()
            .max_by_key(|s| s.publish_timestamp_ns)
            .copied()
            .unwrap_or_default();

        let mut consensus = CompactSignal {
            signal_id: latest.signal_id,
            signal_type,
            confidence: mean(|s| f64::from(s.confidence)).round() as u8,
            priority: survivors.iter().map(|s| s.priority).max().unwrap_or(0),
            platform_mask: survivors.iter().fold(0, |m, s| m | s.platform_mask),
            publish_timestamp_ns: now_ns,
            // A consensus lives only as long as its shortest-lived parent
            ttl_ms: survivors.iter().map(|s| s.ttl_ms).min().unwrap_or(0),
            // Observational latency inherits the slowest contributor
            age_ms: survivors
                .iter()
                .map(|s| s.age_ms_at(now_ns))
                .max()
                .unwrap_or(0)
                .min(u64::from(u16::MAX)) as u16,
            direction: direction_mean.round() as i16,
            magnitude: mean(|s| f64::from(s.magnitude)).round() as i16,
            risk_score: mean(|s| f64::from(s.risk_score)).round() as u16,
            volatility: mean(|s| f64::from(s.volatility)).round() as u16,
            token_symbol: latest.token_symbol,
            token_hash,
            source_mask: survivors.iter().fold(0, |m, s| m | s.source_mask),
            model_version: latest.model_version,
            decay_function: latest.decay_function,
            checksum: 0,
        };
        consensus.refresh_checksum();
        consensus
    }
}
