//! Risk limits policy (1004) - portfolio-level hard limits

use super::{POLICY_ID_RISK_LIMITS, PolicyParams};
use crate::context::{MarketContext, OrderDetails, PortfolioState};
use crate::result::{PolicyResult, ViolationSeverity};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimitsConfig {
    /// Max portfolio VaR, % of total capital
    pub max_portfolio_var_percent: Decimal,
    /// Max realized daily loss, % of total capital
    pub max_daily_loss_percent: Decimal,
    pub max_leverage_ratio: Decimal,
    /// Max single-position concentration, % of total capital
    pub max_concentration_percent: Decimal,
    pub enforce_correlation_limits: bool,
    /// Beta ceiling when correlation limits are enforced
    pub max_beta_to_market: Decimal,
}

impl Default for RiskLimitsConfig {
    fn default() -> Self {
        Self {
            max_portfolio_var_percent: dec!(3.0),
            max_daily_loss_percent: dec!(5.0),
            max_leverage_ratio: dec!(3.0),
            max_concentration_percent: dec!(20.0),
            enforce_correlation_limits: true,
            max_beta_to_market: dec!(2.0),
        }
    }
}

/// Portfolio-level limits: VaR, daily loss, leverage, concentration
///
/// These are the limits whose breach means the whole book is in trouble,
/// not just this order - hence the CRITICAL default severity.
pub struct RiskLimitsPolicy {
    config: RiskLimitsConfig,
}

impl RiskLimitsPolicy {
    pub fn new(config: RiskLimitsConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(
        &self,
        order: &OrderDetails,
        market: &MarketContext,
        portfolio: &PortfolioState,
        result: &mut PolicyResult,
    ) -> bool {
        let capital = portfolio.total_capital;
        if capital <= Decimal::ZERO {
            result.set_violation(
                POLICY_ID_RISK_LIMITS,
                ViolationSeverity::Critical,
                "portfolio has no capital",
            );
            return false;
        }

        let var_percent = portfolio.portfolio_var / capital * dec!(100);
        if var_percent > self.config.max_portfolio_var_percent {
            result.set_violation(
                POLICY_ID_RISK_LIMITS,
                ViolationSeverity::Critical,
                "portfolio VaR exceeds limit",
            );
            return false;
        }

        let daily_pnl = portfolio.realized_pnl_today;
        if daily_pnl < Decimal::ZERO && -daily_pnl / capital * dec!(100) > self.config.max_daily_loss_percent
        {
            result.set_violation(
                POLICY_ID_RISK_LIMITS,
                ViolationSeverity::Critical,
                "daily loss limit breached",
            );
            return false;
        }

        if portfolio.leverage_ratio > self.config.max_leverage_ratio {
            result.set_violation(
                POLICY_ID_RISK_LIMITS,
                ViolationSeverity::Critical,
                "leverage exceeds limit",
            );
            return false;
        }

        // Concentration including this order's own impact
        let price = if order.price.is_zero() {
            market.current_price
        } else {
            order.price
        };
        let order_concentration =
            (portfolio.exposure_for(&order.symbol) + (order.quantity * price).abs()) / capital
                * dec!(100);
        let concentration = portfolio.concentration_risk.max(order_concentration);
        if concentration > self.config.max_concentration_percent {
            result.set_violation(
                POLICY_ID_RISK_LIMITS,
                ViolationSeverity::Critical,
                "position concentration exceeds limit",
            );
            return false;
        }

        if self.config.enforce_correlation_limits
            && portfolio.beta_to_market.abs() > self.config.max_beta_to_market
        {
            // Elevated market correlation is worth surfacing but is not
            // an order-blocking finding on its own
            result.set_violation(
                POLICY_ID_RISK_LIMITS,
                ViolationSeverity::Warning,
                "portfolio beta exceeds correlation limit",
            );
            return false;
        }

        true
    }

    pub fn update_parameters(&mut self, params: &PolicyParams) {
        if let Some(value) = params.get("max_portfolio_var_percent") {
            self.config.max_portfolio_var_percent = *value;
        }
        if let Some(value) = params.get("max_daily_loss_percent") {
            self.config.max_daily_loss_percent = *value;
        }
        if let Some(value) = params.get("max_leverage_ratio") {
            self.config.max_leverage_ratio = *value;
        }
        if let Some(value) = params.get("max_concentration_percent") {
            self.config.max_concentration_percent = *value;
        }
        if let Some(value) = params.get("max_beta_to_market") {
            self.config.max_beta_to_market = *value;
        }
    }

    pub fn parameters(&self) -> PolicyParams {
        PolicyParams::from([
            (
                "max_portfolio_var_percent".to_string(),
                self.config.max_portfolio_var_percent,
            ),
            (
                "max_daily_loss_percent".to_string(),
                self.config.max_daily_loss_percent,
            ),
            ("max_leverage_ratio".to_string(), self.config.max_leverage_ratio),
            (
                "max_concentration_percent".to_string(),
                self.config.max_concentration_percent,
            ),
            ("max_beta_to_market".to_string(), self.config.max_beta_to_market),
        ])
    }
}

impl Default for RiskLimitsPolicy {
    fn default() -> Self {
        Self::new(RiskLimitsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (OrderDetails, MarketContext, PortfolioState) {
        let order = OrderDetails::new("BTC-USD", dec!(0.2), dec!(50_000));
        let market = MarketContext {
            symbol: "BTC-USD".to_string(),
            current_price: dec!(50_000),
            reference_price: dec!(50_000),
            ..Default::default()
        };
        let portfolio = PortfolioState::with_capital(dec!(1_000_000));
        (order, market, portfolio)
    }

    #[test]
    fn test_healthy_portfolio_passes() {
        let (order, market, portfolio) = setup();
        let policy = RiskLimitsPolicy::default();
        let mut result = PolicyResult::clean();

        assert!(policy.evaluate(&order, &market, &portfolio, &mut result));
        assert!(result.allowed);
    }

    #[test]
    fn test_var_breach_is_critical() {
        let (order, market, mut portfolio) = setup();
        portfolio.portfolio_var = dec!(40_000); // 4% against a 3% limit

        let policy = RiskLimitsPolicy::default();
        let mut result = PolicyResult::clean();
        assert!(!policy.evaluate(&order, &market, &portfolio, &mut result));
        assert_eq!(result.severity, ViolationSeverity::Critical);
        assert!(result.is_critical());
        assert!(!result.allowed);
    }

    #[test]
    fn test_daily_loss_breach() {
        let (order, market, mut portfolio) = setup();
        portfolio.realized_pnl_today = dec!(-60_000); // 6% down, 5% limit

        let policy = RiskLimitsPolicy::default();
        let mut result = PolicyResult::clean();
        assert!(!policy.evaluate(&order, &market, &portfolio, &mut result));
        assert_eq!(result.severity, ViolationSeverity::Critical);
    }

    #[test]
    fn test_daily_profit_never_trips_loss_limit() {
        let (order, market, mut portfolio) = setup();
        portfolio.realized_pnl_today = dec!(100_000);

        let policy = RiskLimitsPolicy::default();
        let mut result = PolicyResult::clean();
        assert!(policy.evaluate(&order, &market, &portfolio, &mut result));
    }

    #[test]
    fn test_leverage_breach() {
        let (order, market, mut portfolio) = setup();
        portfolio.leverage_ratio = dec!(4.5);

        let policy = RiskLimitsPolicy::default();
        let mut result = PolicyResult::clean();
        assert!(!policy.evaluate(&order, &market, &portfolio, &mut result));
        assert_eq!(result.severity, ViolationSeverity::Critical);
    }

    #[test]
    fn test_order_impact_counts_toward_concentration() {
        let (_, market, mut portfolio) = setup();
        portfolio
            .exposures
            .insert("BTC-USD".to_string(), dec!(150_000));

        let policy = RiskLimitsPolicy::default();

        // 150k existing + 60k order = 21% against the 20% limit
        let order = OrderDetails::new("BTC-USD", dec!(1.2), dec!(50_000));
        let mut result = PolicyResult::clean();
        assert!(!policy.evaluate(&order, &market, &portfolio, &mut result));
        assert_eq!(result.severity, ViolationSeverity::Critical);
    }

    #[test]
    fn test_beta_breach_warns_but_allows() {
        let (order, market, mut portfolio) = setup();
        portfolio.beta_to_market = dec!(2.8);

        let policy = RiskLimitsPolicy::default();
        let mut result = PolicyResult::clean();
        assert!(!policy.evaluate(&order, &market, &portfolio, &mut result));
        assert!(result.allowed);
        assert_eq!(result.severity, ViolationSeverity::Warning);
    }
}
