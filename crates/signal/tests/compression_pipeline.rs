//! Signal Pipeline Integration Test
//!
//! Tests the full flow:
//! 1. Outcome feed trains the confidence calibrator
//! 2. Compressor quantizes rich inputs into 64-byte records
//! 3. Aggregator builds a consensus across distinct sources
//! 4. TTL validator weighs the consensus and filters it once stale

use kestrel_clock::ManualClock;
use kestrel_core::LLMSignalInput;
use kestrel_signal::{
    AggregationConfig, CalibratorConfig, CompressionConfig, ConfidenceCalibrator,
    SignalAggregator, SignalCompressor, TtlConfig, TtlValidator,
};
use std::collections::HashMap;
use std::sync::Arc;

const TOKEN_ADDRESS: &str = "0x6982508145454ce325ddbe47a25d4ec3d2311933";

fn source_bits() -> HashMap<String, u8> {
    let mut bits = HashMap::new();
    bits.insert("twitter".to_string(), 0);
    bits.insert("dex-screener".to_string(), 1);
    bits.insert("news-wire".to_string(), 2);
    bits
}

fn analysis_from(source: &str, sentiment: f64, confidence: f64) -> LLMSignalInput {
    LLMSignalInput::new(format!("sig-{source}"), TOKEN_ADDRESS, "PEPE")
        .with_sentiment(sentiment, confidence)
        .with_risk(0.35, 0.5)
        .with_source(source)
}

#[test]
fn test_full_pipeline() {
    let _ = env_logger::builder().is_test(true).try_init();

    // === Setup Components ===
    let clock = Arc::new(ManualClock::new(1_700_000_000_000_000_000));

    let calibrator = Arc::new(ConfidenceCalibrator::new(CalibratorConfig {
        num_bins: 10,
        min_samples: 50,
    }));
    let compressor = SignalCompressor::new(
        CompressionConfig {
            source_bits: source_bits(),
            ..Default::default()
        },
        Arc::clone(&calibrator),
        clock.clone(),
    );
    let aggregator = SignalAggregator::new(
        AggregationConfig::default(),
        clock.clone(),
    );
    let ttl = TtlValidator::new(
        TtlConfig::default(),
        clock.clone(),
    );

    // === Step 1: Outcomes train the calibrator ===
    // The model claims 0.9 but hits only ~60% of the time
    for i in 0..100 {
        calibrator.add_sample(0.9, i % 10 < 6);
    }
    calibrator.fit_calibration_curve();

    // === Step 2: Three sources analyze the same token ===
    let inputs = [
        analysis_from("twitter", 0.62, 0.9),
        analysis_from("dex-screener", 0.55, 0.9),
        analysis_from("news-wire", 0.70, 0.9),
    ];
    let signals = compressor.compress_batch(&inputs).expect("batch within cap");
    assert_eq!(signals.len(), 3);

    // Calibration pulled the claimed 0.9 down toward the observed hit-rate
    let calibrated = f64::from(signals[0].confidence) / 255.0;
    assert!(calibrated < 0.75, "overconfidence must be corrected, got {calibrated}");

    // One snapshot across the batch: identical inputs, identical confidence
    assert_eq!(signals[0].confidence, signals[1].confidence);
    assert_eq!(signals[1].confidence, signals[2].confidence);

    // === Step 3: Aggregate into a consensus ===
    let token_hash = signals[0].token_hash;
    for signal in &signals {
        aggregator.add_signal(*signal);
    }

    let consensus = aggregator
        .consensus_signal(token_hash)
        .expect("three agreeing distinct sources");
    assert_eq!(consensus.source_mask, 0b111);
    assert_eq!(consensus.direction, 623); // mean of 620, 550, 700
    assert!(consensus.verify_integrity());

    // === Step 4: Consume while fresh, drop once stale ===
    assert!(ttl.validate_signal_freshness(&consensus));
    let live_weight = ttl.calculate_signal_weight(&consensus);
    assert!(live_weight > 0.0);

    clock.advance_ms(200);
    let aged_weight = ttl.calculate_signal_weight(&consensus);
    assert!(aged_weight < live_weight, "exponential decay with age");

    clock.advance_ms(400); // 600ms past publish, TTL is 500ms
    assert!(!ttl.validate_signal_freshness(&consensus));
    assert_eq!(ttl.calculate_signal_weight(&consensus), 0.0);

    // === Audit: the record survives a wire round-trip ===
    let decoded = kestrel_core::CompactSignal::decode(&consensus.encode())
        .expect("wire image round-trips");
    assert_eq!(decoded, consensus);

    let recovered = compressor.decompress(&signals[0]).expect("intact signal");
    assert_eq!(recovered.data_sources, vec!["twitter"]);
}

#[test]
fn test_disagreement_defers_to_caller() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000_000_000));
    let calibrator = Arc::new(ConfidenceCalibrator::default());
    let compressor = SignalCompressor::new(
        CompressionConfig {
            source_bits: source_bits(),
            ..Default::default()
        },
        calibrator,
        clock.clone(),
    );
    let aggregator = SignalAggregator::new(
        AggregationConfig::default(),
        clock.clone(),
    );

    let disagreements = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&disagreements);
    aggregator.set_disagreement_callback(Box::new(move |signals| {
        sink.lock().unwrap().push(signals.to_vec());
    }));

    // Two sources, opposite reads on the same token
    let bull = compressor.compress(&analysis_from("twitter", 0.8, 0.9));
    let bear = compressor.compress(&analysis_from("news-wire", -0.8, 0.9));
    let token_hash = bull.token_hash;
    aggregator.add_signal(bull);
    aggregator.add_signal(bear);

    assert!(aggregator.consensus_signal(token_hash).is_none());

    let captured = disagreements.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].len(), 2);
}
