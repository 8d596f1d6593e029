//! Market conditions policy (1005) - regime gating

use super::{POLICY_ID_MARKET_CONDITIONS, PolicyParams};
use crate::context::{MarketContext, OrderDetails, PortfolioState};
use crate::result::{PolicyResult, ViolationSeverity};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConditionsConfig {
    pub block_during_news_blackout: bool,
    pub block_during_circuit_breakers: bool,
    pub block_during_low_liquidity: bool,
    pub min_liquidity_score: Decimal,
    /// Volatility ceiling in percent (50 = 50%/h)
    pub max_volatility_threshold: Decimal,
    /// Urgent orders may bypass blackout/liquidity/volatility gates
    pub allow_emergency_orders: bool,
    pub restricted_symbols: Vec<String>,
}

impl Default for MarketConditionsConfig {
    fn default() -> Self {
        Self {
            block_during_news_blackout: true,
            block_during_circuit_breakers: true,
            block_during_low_liquidity: true,
            min_liquidity_score: dec!(0.3),
            max_volatility_threshold: dec!(50.0),
            allow_emergency_orders: true,
            restricted_symbols: Vec::new(),
        }
    }
}

/// Gates trading on market regime
///
/// Restricted symbols and active circuit breakers are never bypassed,
/// urgent or not: the first is a compliance decision, the second is the
/// venue telling everyone to stop.
pub struct MarketConditionsPolicy {
    config: MarketConditionsConfig,
}

impl MarketConditionsPolicy {
    pub fn new(config: MarketConditionsConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(
        &self,
        order: &OrderDetails,
        market: &MarketContext,
        _portfolio: &PortfolioState,
        result: &mut PolicyResult,
    ) -> bool {
        let urgent_bypass = order.is_urgent && self.config.allow_emergency_orders;

        if self.is_symbol_restricted(&order.symbol) {
            result.set_violation(
                POLICY_ID_MARKET_CONDITIONS,
                ViolationSeverity::Error,
                "symbol is on the restricted list",
            );
            return false;
        }

        if market.circuit_breaker_active && self.config.block_during_circuit_breakers {
            result.set_violation(
                POLICY_ID_MARKET_CONDITIONS,
                ViolationSeverity::Error,
                "circuit breaker active",
            );
            return false;
        }

        if !market.is_market_open {
            result.set_violation(
                POLICY_ID_MARKET_CONDITIONS,
                ViolationSeverity::Error,
                "market is closed",
            );
            return false;
        }

        if market.is_news_blackout_period
            && self.config.block_during_news_blackout
            && !urgent_bypass
        {
            result.set_violation(
                POLICY_ID_MARKET_CONDITIONS,
                ViolationSeverity::Error,
                "news blackout period",
            );
            return false;
        }

        let illiquid = market.is_low_liquidity_period
            || market.liquidity_score < self.config.min_liquidity_score;
        if illiquid && self.config.block_during_low_liquidity && !urgent_bypass {
            result.set_violation(
                POLICY_ID_MARKET_CONDITIONS,
                ViolationSeverity::Error,
                "liquidity below minimum",
            );
            return false;
        }

        let volatility_percent = market.volatility_1h * dec!(100);
        if (market.is_high_volatility_period
            || volatility_percent > self.config.max_volatility_threshold)
            && !urgent_bypass
        {
            // Elevated volatility is surfaced, not blocked
            result.set_violation(
                POLICY_ID_MARKET_CONDITIONS,
                ViolationSeverity::Warning,
                "volatility above threshold",
            );
            return false;
        }

        true
    }

    pub fn update_parameters(&mut self, params: &PolicyParams) {
        if let Some(value) = params.get("min_liquidity_score") {
            self.config.min_liquidity_score = *value;
        }
        if let Some(value) = params.get("max_volatility_threshold") {
            self.config.max_volatility_threshold = *value;
        }
    }

    pub fn parameters(&self) -> PolicyParams {
        PolicyParams::from([
            ("min_liquidity_score".to_string(), self.config.min_liquidity_score),
            (
                "max_volatility_threshold".to_string(),
                self.config.max_volatility_threshold,
            ),
        ])
    }

    fn is_symbol_restricted(&self, symbol: &str) -> bool {
        self.config
            .restricted_symbols
            .iter()
            .any(|restricted| restricted == symbol)
    }
}

impl Default for MarketConditionsPolicy {
    fn default() -> Self {
        Self::new(MarketConditionsConfig::default())
    }
}
