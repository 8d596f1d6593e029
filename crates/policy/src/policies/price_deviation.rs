//! Price deviation policy (1002) - fat finger protection

use super::{POLICY_ID_PRICE_DEVIATION, PolicyParams};
use crate::context::{MarketContext, OrderDetails, PortfolioState};
use crate::result::{PolicyResult, ViolationSeverity};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Which market price the deviation is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferencePrice {
    /// Last traded price
    Last,
    #[default]
    Vwap,
    /// Book midpoint (approximated by last trade in this context)
    Mid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceDeviationConfig {
    /// Max % deviation from the reference price
    pub max_deviation_percent: Decimal,
    /// Widens the threshold in volatile markets
    pub volatility_multiplier: Decimal,
    pub use_dynamic_thresholds: bool,
    pub reference_price_type: ReferencePrice,
}

impl Default for PriceDeviationConfig {
    fn default() -> Self {
        Self {
            max_deviation_percent: dec!(5.0),
            volatility_multiplier: dec!(3.0),
            use_dynamic_thresholds: true,
            reference_price_type: ReferencePrice::Vwap,
        }
    }
}

/// Prevents fat finger trades by limiting price deviation from reference
pub struct PriceDeviationPolicy {
    config: PriceDeviationConfig,
}

impl PriceDeviationPolicy {
    pub fn new(config: PriceDeviationConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(
        &self,
        order: &OrderDetails,
        market: &MarketContext,
        _portfolio: &PortfolioState,
        result: &mut PolicyResult,
    ) -> bool {
        // Market orders carry no price to check
        if order.price.is_zero() {
            return true;
        }

        let reference = self.reference_price(market);
        if reference <= Decimal::ZERO {
            // Cannot judge deviation without a reference; surface it
            // without blocking
            result.set_violation(
                POLICY_ID_PRICE_DEVIATION,
                ViolationSeverity::Warning,
                "no reference price available for deviation check",
            );
            return false;
        }

        let deviation_percent = ((order.price - reference) / reference * dec!(100)).abs();
        let max_deviation = self.max_deviation(market);

        if deviation_percent > max_deviation {
            result.set_violation(
                POLICY_ID_PRICE_DEVIATION,
                ViolationSeverity::Error,
                "order price deviates too far from reference price",
            );
            return false;
        }

        true
    }

    pub fn update_parameters(&mut self, params: &PolicyParams) {
        if let Some(value) = params.get("max_deviation_percent") {
            self.config.max_deviation_percent = *value;
        }
        if let Some(value) = params.get("volatility_multiplier") {
            self.config.volatility_multiplier = *value;
        }
    }

    pub fn parameters(&self) -> PolicyParams {
        PolicyParams::from([
            (
                "max_deviation_percent".to_string(),
                self.config.max_deviation_percent,
            ),
            (
                "volatility_multiplier".to_string(),
                self.config.volatility_multiplier,
            ),
        ])
    }

    fn reference_price(&self, market: &MarketContext) -> Decimal {
        match self.config.reference_price_type {
            ReferencePrice::Last => market.current_price,
            ReferencePrice::Vwap => market.reference_price,
            ReferencePrice::Mid => market.current_price,
        }
    }

    fn max_deviation(&self, market: &MarketContext) -> Decimal {
        let base = self.config.max_deviation_percent;
        if self.config.use_dynamic_thresholds {
            base * (Decimal::ONE + market.volatility_1h * self.config.volatility_multiplier)
        } else {
            base
        }
    }
}

impl Default for PriceDeviationPolicy {
    fn default() -> Self {
        Self::new(PriceDeviationConfig::default())
    }
}
