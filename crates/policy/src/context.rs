//! Evaluation context types
//!
//! Read-only snapshots supplied by external collaborators for each policy
//! evaluation: the proposed order, the market it would trade into, and the
//! portfolio it would change. This engine never persists any of them.

use kestrel_core::CompactSignal;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderType {
    #[default]
    Market,
    Limit,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Immediate-or-cancel
    Ioc,
    /// Fill-or-kill
    Fok,
    /// Good-till-cancelled
    #[default]
    Gtc,
}

/// Order details for policy evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderDetails {
    pub symbol: String,
    /// Positive = buy, negative = sell
    pub quantity: Decimal,
    /// Zero for market orders
    pub price: Decimal,
    pub max_slippage_percent: Decimal,
    pub timestamp_ns: u64,

    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    /// Emergency/critical order; some gates may be bypassed for it
    pub is_urgent: bool,
    pub client_order_id: u32,

    /// Signal provenance, when the order came out of the signal pipeline
    pub originating_signal: Option<CompactSignal>,
    pub signal_confidence: f64,
    pub signal_source: String,
}

impl OrderDetails {
    pub fn new(symbol: impl Into<String>, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            price,
            order_type: if price.is_zero() {
                OrderType::Market
            } else {
                OrderType::Limit
            },
            ..Default::default()
        }
    }

    /// Builder: stamp the submission time
    pub fn at(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    /// Builder: mark as an emergency order
    pub fn urgent(mut self) -> Self {
        self.is_urgent = true;
        self
    }

    /// Builder: attach the originating signal
    pub fn from_signal(mut self, signal: CompactSignal, source: impl Into<String>) -> Self {
        self.signal_confidence = f64::from(signal.confidence) / 255.0;
        self.originating_signal = Some(signal);
        self.signal_source = source.into();
        self
    }

    /// Builder: set the client order id
    pub fn with_client_order_id(mut self, client_order_id: u32) -> Self {
        self.client_order_id = client_order_id;
        self
    }
}

/// Market context for policy evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketContext {
    pub symbol: String,
    pub current_price: Decimal,
    /// VWAP, last close, etc. - the fat-finger reference
    pub reference_price: Decimal,
    pub bid_ask_spread: Decimal,
    pub volume_24h: Decimal,
    /// 1-hour realized volatility as a fraction (0.05 = 5%)
    pub volatility_1h: Decimal,
    /// 0.0 - 1.0
    pub liquidity_score: Decimal,
    pub timestamp_ns: u64,

    // Market regime indicators
    pub is_market_open: bool,
    pub is_news_blackout_period: bool,
    pub is_high_volatility_period: bool,
    pub is_low_liquidity_period: bool,

    // Risk indicators
    pub var_estimate: Decimal,
    /// Beta-like correlation to the broad market
    pub correlation_to_market: Decimal,
    pub circuit_breaker_active: bool,
}

impl Default for MarketContext {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            current_price: Decimal::ZERO,
            reference_price: Decimal::ZERO,
            bid_ask_spread: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
            volatility_1h: Decimal::ZERO,
            liquidity_score: Decimal::ONE,
            timestamp_ns: 0,
            is_market_open: true,
            is_news_blackout_period: false,
            is_high_volatility_period: false,
            is_low_liquidity_period: false,
            var_estimate: Decimal::ZERO,
            correlation_to_market: Decimal::ZERO,
            circuit_breaker_active: false,
        }
    }
}

/// Portfolio state for risk calculations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioState {
    pub total_capital: Decimal,
    pub available_capital: Decimal,
    pub used_margin: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl_today: Decimal,

    /// symbol -> signed quantity
    pub positions: HashMap<String, Decimal>,
    /// symbol -> notional value
    pub exposures: HashMap<String, Decimal>,

    // Risk metrics
    pub portfolio_var: Decimal,
    pub beta_to_market: Decimal,
    /// Largest position as a percent of capital (0 - 100)
    pub concentration_risk: Decimal,
    pub leverage_ratio: Decimal,

    // Counters
    pub trades_today: u32,
    pub failed_trades_today: u32,
    pub last_trade_timestamp_ns: u64,
}

impl PortfolioState {
    pub fn with_capital(total_capital: Decimal) -> Self {
        Self {
            total_capital,
            available_capital: total_capital,
            ..Default::default()
        }
    }

    /// Signed position quantity for a symbol, zero when flat.
    pub fn position_for(&self, symbol: &str) -> Decimal {
        self.positions.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }

    /// Notional exposure for a symbol, zero when none.
    pub fn exposure_for(&self, symbol: &str) -> Decimal {
        self.exposures.get(symbol).copied().unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_type_inferred_from_price() {
        let market = OrderDetails::new("BTC-USD", dec!(1), Decimal::ZERO);
        assert_eq!(market.order_type, OrderType::Market);

        let limit = OrderDetails::new("BTC-USD", dec!(1), dec!(50_000));
        assert_eq!(limit.order_type, OrderType::Limit);
    }

    #[test]
    fn test_portfolio_lookups_default_to_zero() {
        let mut portfolio = PortfolioState::with_capital(dec!(100_000));
        portfolio.positions.insert("BTC-USD".to_string(), dec!(2));
        portfolio.exposures.insert("BTC-USD".to_string(), dec!(40_000));

        assert_eq!(portfolio.position_for("BTC-USD"), dec!(2));
        assert_eq!(portfolio.exposure_for("BTC-USD"), dec!(40_000));
        assert_eq!(portfolio.position_for("ETH-USD"), Decimal::ZERO);
        assert_eq!(portfolio.exposure_for("ETH-USD"), Decimal::ZERO);
    }

    #[test]
    fn test_order_signal_provenance() {
        let mut signal = kestrel_core::CompactSignal {
            confidence: 204,
            ..Default::default()
        };
        signal.refresh_checksum();

        let order = OrderDetails::new("PEPE", dec!(1000), dec!(0.001))
            .from_signal(signal, "aggregator");
        assert!((order.signal_confidence - 0.8).abs() < 1e-9);
        assert_eq!(order.signal_source, "aggregator");
    }
}
