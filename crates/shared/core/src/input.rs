//! LLMSignalInput - the rich producer record
//!
//! Variable-size analysis output as it arrives from upstream sentiment and
//! market-data pipelines. It exists only transiently, owned by the caller,
//! until the compressor quantizes it into a [`crate::CompactSignal`].
//! Decompression reconstructs a lossy best-effort version of this record
//! for audit and replay: aggregate scores survive, free text does not.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rich analysis output before compression.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LLMSignalInput {
    /// Producer-side identifier, for correlation in logs
    pub signal_id: String,
    /// Full contract address of the instrument
    pub token_address: String,
    pub token_symbol: String,

    /// Free-text sentiment summary (not recoverable after compression)
    pub sentiment_text: String,
    /// Sentiment in [-1.0, +1.0]
    pub sentiment_score: f64,
    /// Raw model confidence in [0.0, 1.0], pre-calibration
    pub confidence_score: f64,
    /// Model explanation (not recoverable after compression)
    pub reasoning: String,

    /// Named technical indicator values
    pub technical_indicators: Vec<(String, f64)>,

    /// Risk estimate in [0.0, 1.0]
    pub risk_score: f64,
    pub risk_factors: Vec<String>,

    /// Expected volatility in [0.0, 1.0]
    pub volatility_estimate: f64,
    pub liquidity_score: f64,
    pub momentum_score: f64,

    /// Named data sources that contributed to the analysis
    pub data_sources: Vec<String>,
    pub news_headlines: Vec<String>,
    pub social_mentions: Vec<String>,

    /// When the underlying observation was made (ns since epoch)
    pub source_timestamp_ns: u64,
    pub processing_start_ns: u64,
    pub processing_end_ns: u64,

    pub model_name: String,
    pub model_version: String,
    pub model_params: HashMap<String, String>,

    /// Urgent inputs get a shortened TTL and maximum priority
    pub is_urgent: bool,
}

impl LLMSignalInput {
    /// Create an input with the identifying fields set.
    pub fn new(
        signal_id: impl Into<String>,
        token_address: impl Into<String>,
        token_symbol: impl Into<String>,
    ) -> Self {
        Self {
            signal_id: signal_id.into(),
            token_address: token_address.into(),
            token_symbol: token_symbol.into(),
            ..Default::default()
        }
    }

    /// Builder: set sentiment score and confidence
    pub fn with_sentiment(mut self, sentiment_score: f64, confidence_score: f64) -> Self {
        self.sentiment_score = sentiment_score;
        self.confidence_score = confidence_score;
        self
    }

    /// Builder: set risk and volatility estimates
    pub fn with_risk(mut self, risk_score: f64, volatility_estimate: f64) -> Self {
        self.risk_score = risk_score;
        self.volatility_estimate = volatility_estimate;
        self
    }

    /// Builder: set the source observation timestamp
    pub fn with_source_timestamp(mut self, source_timestamp_ns: u64) -> Self {
        self.source_timestamp_ns = source_timestamp_ns;
        self
    }

    /// Builder: add a contributing data source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.data_sources.push(source.into());
        self
    }

    /// Builder: mark as urgent
    pub fn urgent(mut self) -> Self {
        self.is_urgent = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let input = LLMSignalInput::new("sig-1", "0xabc", "PEPE")
            .with_sentiment(0.6, 0.85)
            .with_risk(0.3, 0.4)
            .with_source("twitter")
            .with_source("dex-screener")
            .urgent();

        assert_eq!(input.token_symbol, "PEPE");
        assert_eq!(input.sentiment_score, 0.6);
        assert_eq!(input.data_sources.len(), 2);
        assert!(input.is_urgent);
    }
}
