//! Policy settings document
//!
//! JSON-shaped configuration for the whole policy set: engine options plus
//! one optional section per policy. Operations tooling edits this
//! document; the engine consumes the built policies. Omitted sections mean
//! the policy is not deployed.

use crate::engine::EngineConfig;
use crate::error::{Error, Result};
use crate::policies::{
    MarketConditionsConfig, MarketConditionsPolicy, Policy, PositionSizeConfig,
    PositionSizePolicy, PriceDeviationConfig, PriceDeviationPolicy, RiskLimitsConfig,
    RiskLimitsPolicy, TradingFrequencyConfig, TradingFrequencyPolicy,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    pub engine: EngineConfig,
    pub position_size: Option<PositionSizeConfig>,
    pub price_deviation: Option<PriceDeviationConfig>,
    pub trading_frequency: Option<TradingFrequencyConfig>,
    pub risk_limits: Option<RiskLimitsConfig>,
    pub market_conditions: Option<MarketConditionsConfig>,
}

impl Default for PolicySettings {
    /// Full standard deployment: every policy at its defaults.
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            position_size: Some(PositionSizeConfig::default()),
            price_deviation: Some(PriceDeviationConfig::default()),
            trading_frequency: Some(TradingFrequencyConfig::default()),
            risk_limits: Some(RiskLimitsConfig::default()),
            market_conditions: Some(MarketConditionsConfig::default()),
        }
    }
}

impl PolicySettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        Ok(settings)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Configuration sanity checks. Returns every problem found; an empty
    /// list means the document is deployable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.engine.max_evaluation_time_ns == 0 {
            problems.push("engine.max_evaluation_time_ns must be positive".to_string());
        }
        if self.engine.audit_capacity == 0 {
            problems.push("engine.audit_capacity must be positive".to_string());
        }

        if let Some(config) = &self.position_size {
            check_positive(&mut problems, "position_size.max_position_percent", config.max_position_percent);
            check_positive(
                &mut problems,
                "position_size.max_single_order_percent",
                config.max_single_order_percent,
            );
            check_positive(&mut problems, "position_size.max_symbol_exposure", config.max_symbol_exposure);
            if config.max_single_order_percent > config.max_position_percent {
                problems.push(
                    "position_size: max_single_order_percent exceeds max_position_percent"
                        .to_string(),
                );
            }
        }

        if let Some(config) = &self.price_deviation {
            check_positive(
                &mut problems,
                "price_deviation.max_deviation_percent",
                config.max_deviation_percent,
            );
            if config.volatility_multiplier < Decimal::ZERO {
                problems.push("price_deviation.volatility_multiplier must not be negative".to_string());
            }
        }

        if let Some(config) = &self.trading_frequency {
            if config.max_orders_per_second == 0 {
                problems.push("trading_frequency.max_orders_per_second must be positive".to_string());
            }
            if config.max_orders_per_minute < config.max_orders_per_second {
                problems.push(
                    "trading_frequency: per-minute limit below per-second limit".to_string(),
                );
            }
        }

        if let Some(config) = &self.risk_limits {
            check_positive(
                &mut problems,
                "risk_limits.max_portfolio_var_percent",
                config.max_portfolio_var_percent,
            );
            check_positive(&mut problems, "risk_limits.max_daily_loss_percent", config.max_daily_loss_percent);
            check_positive(&mut problems, "risk_limits.max_leverage_ratio", config.max_leverage_ratio);
        }

        if let Some(config) = &self.market_conditions {
            if config.min_liquidity_score < Decimal::ZERO || config.min_liquidity_score > Decimal::ONE {
                problems.push("market_conditions.min_liquidity_score must be in [0, 1]".to_string());
            }
        }

        problems
    }

    /// Build the configured policy set, in id order. Fails on an invalid
    /// document rather than deploying half a rule book.
    pub fn build_policies(&self) -> Result<Vec<Policy>> {
        let problems = self.validate();
        if !problems.is_empty() {
            return Err(Error::InvalidConfig(problems.join("; ")));
        }

        let mut policies = Vec::new();
        if let Some(config) = &self.position_size {
            policies.push(Policy::PositionSize(PositionSizePolicy::new(config.clone())));
        }
        if let Some(config) = &self.price_deviation {
            policies.push(Policy::PriceDeviation(PriceDeviationPolicy::new(config.clone())));
        }
        if let Some(config) = &self.trading_frequency {
            policies.push(Policy::TradingFrequency(TradingFrequencyPolicy::new(
                config.clone(),
            )));
        }
        if let Some(config) = &self.risk_limits {
            policies.push(Policy::RiskLimits(RiskLimitsPolicy::new(config.clone())));
        }
        if let Some(config) = &self.market_conditions {
            policies.push(Policy::MarketConditions(MarketConditionsPolicy::new(
                config.clone(),
            )));
        }
        Ok(policies)
    }
}

fn check_positive(problems: &mut Vec<String>, name: &str, value: Decimal) {
    if value <= Decimal::ZERO {
        problems.push(format!("{name} must be positive"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_settings_are_valid_and_complete() {
        let settings = PolicySettings::default();
        assert!(settings.validate().is_empty());

        let policies = settings.build_policies().expect("valid defaults");
        assert_eq!(policies.len(), 5);
        let ids: Vec<u32> = policies.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![1001, 1002, 1003, 1004, 1005]);
    }

    #[test]
    fn test_json_round_trip() {
        let mut settings = PolicySettings::default();
        if let Some(config) = settings.position_size.as_mut() {
            config.max_single_order_percent = dec!(1.5);
        }
        settings.market_conditions = None;

        let json = settings.to_json_string().expect("serializes");
        let restored = PolicySettings::from_json_str(&json).expect("parses");

        assert_eq!(
            restored.position_size.as_ref().unwrap().max_single_order_percent,
            dec!(1.5)
        );
        assert!(restored.market_conditions.is_none());
        assert_eq!(restored.engine.max_evaluation_time_ns, 100_000);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let settings = PolicySettings::from_json_str(
            r#"{
                "engine": { "max_evaluation_time_ns": 50000 },
                "position_size": { "max_single_order_percent": "1.0" }
            }"#,
        )
        .expect("parses");

        assert_eq!(settings.engine.max_evaluation_time_ns, 50_000);
        assert!(settings.engine.enable_early_termination);
        let position = settings.position_size.expect("present");
        assert_eq!(position.max_single_order_percent, dec!(1.0));
        assert_eq!(position.max_position_percent, dec!(10.0));
        // Sections not mentioned fall back to the default deployment
        assert!(settings.risk_limits.is_some());
    }

    #[test]
    fn test_validation_reports_every_problem() {
        let mut settings = PolicySettings::default();
        if let Some(config) = settings.position_size.as_mut() {
            config.max_single_order_percent = dec!(-1);
        }
        if let Some(config) = settings.trading_frequency.as_mut() {
            config.max_orders_per_second = 0;
        }

        let problems = settings.validate();
        assert!(problems.len() >= 2);
        assert!(settings.build_policies().is_err());
    }

    #[test]
    fn test_inverted_limits_are_rejected() {
        let mut settings = PolicySettings::default();
        if let Some(config) = settings.position_size.as_mut() {
            config.max_single_order_percent = dec!(50);
            config.max_position_percent = dec!(10);
        }

        let problems = settings.validate();
        assert!(
            problems
                .iter()
                .any(|p| p.contains("max_single_order_percent exceeds"))
        );
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(
            PolicySettings::from_json_str("{ not json"),
            Err(Error::InvalidConfig(_))
        ));
    }
}
