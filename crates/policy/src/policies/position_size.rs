//! Position size limit policy (1001)

use super::{POLICY_ID_POSITION_SIZE, PolicyParams};
use crate::context::{MarketContext, OrderDetails, PortfolioState};
use crate::result::{PolicyResult, ViolationSeverity};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionSizeConfig {
    /// Resulting position in one symbol, % of total capital
    pub max_position_percent: Decimal,
    /// Single order, % of total capital
    pub max_single_order_percent: Decimal,
    /// Notional exposure in one symbol, % of total capital
    pub max_symbol_exposure: Decimal,
    pub enforce_per_symbol_limits: bool,
}

impl Default for PositionSizeConfig {
    fn default() -> Self {
        Self {
            max_position_percent: dec!(10.0),
            max_single_order_percent: dec!(2.0),
            max_symbol_exposure: dec!(15.0),
            enforce_per_symbol_limits: true,
        }
    }
}

/// Enforces maximum order, position, and symbol exposure sizes
pub struct PositionSizePolicy {
    config: PositionSizeConfig,
}

impl PositionSizePolicy {
    pub fn new(config: PositionSizeConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(
        &self,
        order: &OrderDetails,
        market: &MarketContext,
        portfolio: &PortfolioState,
        result: &mut PolicyResult,
    ) -> bool {
        if portfolio.total_capital <= Decimal::ZERO {
            result.set_violation(
                POLICY_ID_POSITION_SIZE,
                ViolationSeverity::Error,
                "portfolio has no capital to size against",
            );
            return false;
        }

        // Market orders carry no price; value them at the market
        let price = if order.price.is_zero() {
            market.current_price
        } else {
            order.price
        };
        let order_value = (order.quantity * price).abs();
        let order_percent = order_value / portfolio.total_capital * dec!(100);

        if order_percent > self.config.max_single_order_percent {
            result.set_violation(
                POLICY_ID_POSITION_SIZE,
                ViolationSeverity::Error,
                "order size exceeds maximum allowed percentage",
            );
            return false;
        }

        // Resulting position after the fill
        let new_quantity = portfolio.position_for(&order.symbol) + order.quantity;
        let position_percent = (new_quantity * price).abs() / portfolio.total_capital * dec!(100);
        if position_percent > self.config.max_position_percent {
            result.set_violation(
                POLICY_ID_POSITION_SIZE,
                ViolationSeverity::Error,
                "resulting position would exceed maximum allowed",
            );
            return false;
        }

        if self.config.enforce_per_symbol_limits {
            let new_exposure = portfolio.exposure_for(&order.symbol) + order_value;
            let exposure_percent = new_exposure / portfolio.total_capital * dec!(100);
            if exposure_percent > self.config.max_symbol_exposure {
                result.set_violation(
                    POLICY_ID_POSITION_SIZE,
                    ViolationSeverity::Error,
                    "symbol exposure would exceed maximum allowed",
                );
                return false;
            }
        }

        true
    }

    pub fn update_parameters(&mut self, params: &PolicyParams) {
        if let Some(value) = params.get("max_position_percent") {
            self.config.max_position_percent = *value;
        }
        if let Some(value) = params.get("max_single_order_percent") {
            self.config.max_single_order_percent = *value;
        }
        if let Some(value) = params.get("max_symbol_exposure") {
            self.config.max_symbol_exposure = *value;
        }
    }

    pub fn parameters(&self) -> PolicyParams {
        PolicyParams::from([
            ("max_position_percent".to_string(), self.config.max_position_percent),
            (
                "max_single_order_percent".to_string(),
                self.config.max_single_order_percent,
            ),
            ("max_symbol_exposure".to_string(), self.config.max_symbol_exposure),
        ])
    }
}

impl Default for PositionSizePolicy {
    fn default() -> Self {
        Self::new(PositionSizeConfig::default())
    }
}
