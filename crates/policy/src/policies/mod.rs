//! The policy set
//!
//! A closed sum type over the five risk rules. Every policy is an
//! independent check with its own config, a stable numeric id for audit,
//! and a default severity; the engine runs them in registration order and
//! lets severity only escalate. The set is deliberately closed - an
//! exhaustive `match` means a new rule cannot be added without the
//! compiler walking every dispatch site.

mod market_conditions;
mod position_size;
mod price_deviation;
mod risk_limits;
mod trading_frequency;

pub use market_conditions::{MarketConditionsConfig, MarketConditionsPolicy};
pub use position_size::{PositionSizeConfig, PositionSizePolicy};
pub use price_deviation::{PriceDeviationConfig, PriceDeviationPolicy, ReferencePrice};
pub use risk_limits::{RiskLimitsConfig, RiskLimitsPolicy};
pub use trading_frequency::{TradingFrequencyConfig, TradingFrequencyPolicy};

use crate::context::{MarketContext, OrderDetails, PortfolioState};
use crate::result::{PolicyResult, ViolationSeverity};
use rust_decimal::Decimal;
use std::collections::HashMap;

pub const POLICY_ID_POSITION_SIZE: u32 = 1001;
pub const POLICY_ID_PRICE_DEVIATION: u32 = 1002;
pub const POLICY_ID_TRADING_FREQUENCY: u32 = 1003;
pub const POLICY_ID_RISK_LIMITS: u32 = 1004;
pub const POLICY_ID_MARKET_CONDITIONS: u32 = 1005;

/// Parameter map for hot-swapping a policy's configuration.
pub type PolicyParams = HashMap<String, Decimal>;

/// One of the five risk rules.
pub enum Policy {
    PositionSize(PositionSizePolicy),
    PriceDeviation(PriceDeviationPolicy),
    TradingFrequency(TradingFrequencyPolicy),
    RiskLimits(RiskLimitsPolicy),
    MarketConditions(MarketConditionsPolicy),
}

impl Policy {
    pub fn id(&self) -> u32 {
        match self {
            Policy::PositionSize(_) => POLICY_ID_POSITION_SIZE,
            Policy::PriceDeviation(_) => POLICY_ID_PRICE_DEVIATION,
            Policy::TradingFrequency(_) => POLICY_ID_TRADING_FREQUENCY,
            Policy::RiskLimits(_) => POLICY_ID_RISK_LIMITS,
            Policy::MarketConditions(_) => POLICY_ID_MARKET_CONDITIONS,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Policy::PositionSize(_) => "PositionSizePolicy",
            Policy::PriceDeviation(_) => "PriceDeviationPolicy",
            Policy::TradingFrequency(_) => "TradingFrequencyPolicy",
            Policy::RiskLimits(_) => "RiskLimitsPolicy",
            Policy::MarketConditions(_) => "MarketConditionsPolicy",
        }
    }

    pub fn default_severity(&self) -> ViolationSeverity {
        match self {
            Policy::PositionSize(_) => ViolationSeverity::Error,
            Policy::PriceDeviation(_) => ViolationSeverity::Error,
            Policy::TradingFrequency(_) => ViolationSeverity::Warning,
            Policy::RiskLimits(_) => ViolationSeverity::Critical,
            Policy::MarketConditions(_) => ViolationSeverity::Warning,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Policy::PositionSize(_) => "Enforces per-order, per-position, and per-symbol size limits",
            Policy::PriceDeviation(_) => "Blocks fat-finger prices far from the market reference",
            Policy::TradingFrequency(_) => "Rate-limits order flow globally and per symbol",
            Policy::RiskLimits(_) => "Enforces portfolio VaR, loss, leverage, and concentration limits",
            Policy::MarketConditions(_) => "Gates trading on market regime: blackouts, breakers, liquidity",
        }
    }

    /// Fast-path evaluation. Writes violations into `result` and returns
    /// whether the order passed this policy.
    pub fn evaluate(
        &self,
        order: &OrderDetails,
        market: &MarketContext,
        portfolio: &PortfolioState,
        result: &mut PolicyResult,
    ) -> bool {
        match self {
            Policy::PositionSize(policy) => policy.evaluate(order, market, portfolio, result),
            Policy::PriceDeviation(policy) => policy.evaluate(order, market, portfolio, result),
            Policy::TradingFrequency(policy) => policy.evaluate(order, market, portfolio, result),
            Policy::RiskLimits(policy) => policy.evaluate(order, market, portfolio, result),
            Policy::MarketConditions(policy) => policy.evaluate(order, market, portfolio, result),
        }
    }

    /// Hot-swap configuration values by name. Unknown keys are ignored.
    pub fn update_parameters(&mut self, params: &PolicyParams) {
        match self {
            Policy::PositionSize(policy) => policy.update_parameters(params),
            Policy::PriceDeviation(policy) => policy.update_parameters(params),
            Policy::TradingFrequency(policy) => policy.update_parameters(params),
            Policy::RiskLimits(policy) => policy.update_parameters(params),
            Policy::MarketConditions(policy) => policy.update_parameters(params),
        }
    }

    /// Current numeric configuration, keyed by parameter name.
    pub fn parameters(&self) -> PolicyParams {
        match self {
            Policy::PositionSize(policy) => policy.parameters(),
            Policy::PriceDeviation(policy) => policy.parameters(),
            Policy::TradingFrequency(policy) => policy.parameters(),
            Policy::RiskLimits(policy) => policy.parameters(),
            Policy::MarketConditions(policy) => policy.parameters(),
        }
    }
}
