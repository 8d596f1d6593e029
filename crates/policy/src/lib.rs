//! Kestrel Policy Engine
//!
//! Hard-coded risk controls that sit between signal-driven order intent
//! and any execution venue. Models and strategies cannot override them:
//! every proposed order passes through the full bank of enabled policies
//! and the result is a severity-tagged admit/deny decision with audit
//! metadata.
//!
//! ```text
//! OrderDetails + MarketContext + PortfolioState
//!                      │
//!        ┌─────────────▼──────────────────────────┐
//!        │            Policy Engine               │
//!        │                                        │
//!        │  emergency stop? ──► reject CRITICAL   │
//!        │                                        │
//!        │  PositionSizePolicy      (1001)        │
//!        │  PriceDeviationPolicy    (1002)        │
//!        │  TradingFrequencyPolicy  (1003)        │
//!        │  RiskLimitsPolicy        (1004)        │
//!        │  MarketConditionsPolicy  (1005)        │
//!        │                                        │
//!        │  severity only escalates; CRITICAL     │
//!        │  may end the pass early; the time      │
//!        │  budget is checked after every policy  │
//!        └─────────────┬──────────────────────────┘
//!                      │
//!                PolicyResult ──► audit trail
//! ```
//!
//! Policy violations are routine, expected outcomes surfaced as data -
//! never errors. The one unconditional state is the emergency stop, which
//! rejects everything until an operator explicitly resets it.

pub mod context;
pub mod engine;
pub mod error;
pub mod policies;
pub mod result;
pub mod settings;

// Re-export main types
pub use context::{MarketContext, OrderDetails, OrderType, PortfolioState, TimeInForce};
pub use engine::{
    AuditEntry, EngineConfig, POLICY_ID_EMERGENCY, POLICY_ID_TIMEOUT, PolicyEngine,
    PolicyMetricsSnapshot, PolicyStats,
};
pub use error::{Error, Result};
pub use policies::{
    MarketConditionsConfig, MarketConditionsPolicy, POLICY_ID_MARKET_CONDITIONS,
    POLICY_ID_POSITION_SIZE, POLICY_ID_PRICE_DEVIATION, POLICY_ID_RISK_LIMITS,
    POLICY_ID_TRADING_FREQUENCY, Policy, PolicyParams, PositionSizeConfig, PositionSizePolicy,
    PriceDeviationConfig, PriceDeviationPolicy, ReferencePrice, RiskLimitsConfig,
    RiskLimitsPolicy, TradingFrequencyConfig, TradingFrequencyPolicy,
};
pub use result::{PolicyResult, ViolationSeverity};
pub use settings::PolicySettings;
