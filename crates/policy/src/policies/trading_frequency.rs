//! Trading frequency policy (1003) - order flow rate limiting

use super::{POLICY_ID_TRADING_FREQUENCY, PolicyParams};
use crate::context::{MarketContext, OrderDetails, PortfolioState};
use crate::result::{PolicyResult, ViolationSeverity};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingFrequencyConfig {
    pub max_orders_per_second: u32,
    pub max_orders_per_minute: u32,
    pub max_orders_per_symbol_per_minute: u32,
    pub max_daily_trades: u32,
    pub enforce_cooling_period: bool,
    /// Minimum spacing between consecutive orders
    pub min_time_between_orders_ns: u64,
}

impl Default for TradingFrequencyConfig {
    fn default() -> Self {
        Self {
            max_orders_per_second: 100,
            max_orders_per_minute: 1000,
            max_orders_per_symbol_per_minute: 50,
            max_daily_trades: 10_000,
            enforce_cooling_period: true,
            min_time_between_orders_ns: 1_000_000, // 1ms
        }
    }
}

/// Ring-buffered order counts over the last 60 seconds plus a daily total.
#[derive(Debug, Clone)]
struct RateTracker {
    second_buckets: [u32; 60],
    current_second: u64,
    current_day: u64,
    daily_count: u32,
    last_order_ns: u64,
}

impl Default for RateTracker {
    fn default() -> Self {
        Self {
            second_buckets: [0; 60],
            current_second: 0,
            current_day: 0,
            daily_count: 0,
            last_order_ns: 0,
        }
    }
}

impl RateTracker {
    /// Advance bucket cursors to `now_ns`, zeroing slots that rolled past.
    fn roll_to(&mut self, now_ns: u64) {
        let second = now_ns / 1_000_000_000;
        if second != self.current_second {
            let elapsed = second.saturating_sub(self.current_second).min(60);
            for offset in 1..=elapsed {
                let slot = (self.current_second + offset) % 60;
                self.second_buckets[slot as usize] = 0;
            }
            self.current_second = second;
        }

        let day = second / 86_400;
        if day != self.current_day {
            self.current_day = day;
            self.daily_count = 0;
        }
    }

    fn record(&mut self, now_ns: u64) {
        self.roll_to(now_ns);
        self.second_buckets[(self.current_second % 60) as usize] += 1;
        self.daily_count = self.daily_count.saturating_add(1);
        self.last_order_ns = now_ns;
    }

    fn orders_this_second(&self) -> u32 {
        self.second_buckets[(self.current_second % 60) as usize]
    }

    fn orders_last_minute(&self) -> u32 {
        self.second_buckets.iter().sum()
    }
}

#[derive(Debug, Default)]
struct FrequencyState {
    global: RateTracker,
    per_symbol: HashMap<String, RateTracker>,
}

/// Rate limiter over order submissions
///
/// The trackers are the one piece of policy state shared across
/// evaluations, so they live behind their own lock; everything else in
/// the policy set is read-only on the evaluation path. Every evaluated
/// order counts against the trackers, admitted or not - the limiter
/// bounds order *flow* toward the venue, and a rejected retry is still
/// flow.
pub struct TradingFrequencyPolicy {
    config: TradingFrequencyConfig,
    state: Mutex<FrequencyState>,
}

impl TradingFrequencyPolicy {
    pub fn new(config: TradingFrequencyConfig) -> Self {
        Self {
            config,
            state: Mutex::new(FrequencyState::default()),
        }
    }

    pub fn evaluate(
        &self,
        order: &OrderDetails,
        _market: &MarketContext,
        _portfolio: &PortfolioState,
        result: &mut PolicyResult,
    ) -> bool {
        let now_ns = order.timestamp_ns;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let FrequencyState { global, per_symbol } = &mut *state;

        global.roll_to(now_ns);
        let symbol_tracker = per_symbol.entry(order.symbol.clone()).or_default();
        symbol_tracker.roll_to(now_ns);

        let mut passed = true;
        if self.config.enforce_cooling_period
            && global.last_order_ns != 0
            && now_ns.saturating_sub(global.last_order_ns) < self.config.min_time_between_orders_ns
        {
            // Sub-millisecond repeats are machine error, not load
            result.set_violation(
                POLICY_ID_TRADING_FREQUENCY,
                ViolationSeverity::Error,
                "order submitted inside the cooling period",
            );
            passed = false;
        } else if global.orders_this_second() >= self.config.max_orders_per_second {
            result.set_violation(
                POLICY_ID_TRADING_FREQUENCY,
                ViolationSeverity::Warning,
                "per-second order rate limit reached",
            );
            passed = false;
        } else if global.orders_last_minute() >= self.config.max_orders_per_minute {
            result.set_violation(
                POLICY_ID_TRADING_FREQUENCY,
                ViolationSeverity::Warning,
                "per-minute order rate limit reached",
            );
            passed = false;
        } else if symbol_tracker.orders_last_minute()
            >= self.config.max_orders_per_symbol_per_minute
        {
            result.set_violation(
                POLICY_ID_TRADING_FREQUENCY,
                ViolationSeverity::Warning,
                "per-symbol order rate limit reached",
            );
            passed = false;
        } else if global.daily_count >= self.config.max_daily_trades {
            result.set_violation(
                POLICY_ID_TRADING_FREQUENCY,
                ViolationSeverity::Warning,
                "daily trade limit reached",
            );
            passed = false;
        }

        global.record(now_ns);
        symbol_tracker.record(now_ns);
        passed
    }

    pub fn update_parameters(&mut self, params: &PolicyParams) {
        if let Some(value) = params.get("max_orders_per_second") {
            self.config.max_orders_per_second = decimal_to_u32(*value);
        }
        if let Some(value) = params.get("max_orders_per_minute") {
            self.config.max_orders_per_minute = decimal_to_u32(*value);
        }
        if let Some(value) = params.get("max_orders_per_symbol_per_minute") {
            self.config.max_orders_per_symbol_per_minute = decimal_to_u32(*value);
        }
        if let Some(value) = params.get("max_daily_trades") {
            self.config.max_daily_trades = decimal_to_u32(*value);
        }
    }

    pub fn parameters(&self) -> PolicyParams {
        PolicyParams::from([
            (
                "max_orders_per_second".to_string(),
                Decimal::from(self.config.max_orders_per_second),
            ),
            (
                "max_orders_per_minute".to_string(),
                Decimal::from(self.config.max_orders_per_minute),
            ),
            (
                "max_orders_per_symbol_per_minute".to_string(),
                Decimal::from(self.config.max_orders_per_symbol_per_minute),
            ),
            (
                "max_daily_trades".to_string(),
                Decimal::from(self.config.max_daily_trades),
            ),
        ])
    }
}

impl Default for TradingFrequencyPolicy {
    fn default() -> Self {
        Self::new(TradingFrequencyConfig::default())
    }
}

fn decimal_to_u32(value: Decimal) -> u32 {
    value
        .max(Decimal::ZERO)
        .min(dec!(4_294_967_295))
        .trunc()
        .try_into()
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE_NS: u64 = 1_700_000_000_000_000_000;

    fn order_at(symbol: &str, now_ns: u64) -> OrderDetails {
        OrderDetails::new(symbol, dec!(1), dec!(100)).at(now_ns)
    }

    fn evaluate(policy: &TradingFrequencyPolicy, order: &OrderDetails) -> (bool, PolicyResult) {
        let mut result = PolicyResult::clean();
        let passed = policy.evaluate(
            order,
            &MarketContext::default(),
            &PortfolioState::default(),
            &mut result,
        );
        (passed, result)
    }

    #[test]
    fn test_spaced_orders_pass() {
        let policy = TradingFrequencyPolicy::default();
        for i in 0..10 {
            let order = order_at("BTC-USD", BASE_NS + i * 10_000_000); // 10ms apart
            let (passed, result) = evaluate(&policy, &order);
            assert!(passed);
            assert!(result.allowed);
        }
    }

    #[test]
    fn test_cooling_period_is_an_error() {
        let policy = TradingFrequencyPolicy::default();
        evaluate(&policy, &order_at("BTC-USD", BASE_NS));

        // 100us later: inside the 1ms cooling period
        let (passed, result) = evaluate(&policy, &order_at("BTC-USD", BASE_NS + 100_000));
        assert!(!passed);
        assert!(!result.allowed);
        assert_eq!(result.severity, ViolationSeverity::Error);
    }

    #[test]
    fn test_per_second_rate_limit_warns() {
        let policy = TradingFrequencyPolicy::new(TradingFrequencyConfig {
            max_orders_per_second: 5,
            enforce_cooling_period: false,
            ..Default::default()
        });

        for i in 0..5 {
            let (passed, _) = evaluate(&policy, &order_at("BTC-USD", BASE_NS + i * 2_000_000));
            assert!(passed, "order {i} under the limit");
        }
        let (passed, result) = evaluate(&policy, &order_at("BTC-USD", BASE_NS + 12_000_000));
        assert!(!passed);
        assert!(result.allowed, "rate limit is a warning, not a block");
        assert_eq!(result.severity, ViolationSeverity::Warning);

        // The next second opens a fresh bucket
        let (passed, _) = evaluate(&policy, &order_at("BTC-USD", BASE_NS + 1_100_000_000));
        assert!(passed);
    }

    #[test]
    fn test_per_symbol_limit_is_independent() {
        let policy = TradingFrequencyPolicy::new(TradingFrequencyConfig {
            max_orders_per_symbol_per_minute: 2,
            max_orders_per_second: 1000,
            enforce_cooling_period: false,
            ..Default::default()
        });

        for i in 0..2 {
            let (passed, _) = evaluate(&policy, &order_at("BTC-USD", BASE_NS + i * 5_000_000));
            assert!(passed);
        }
        // Third BTC order in the minute trips the symbol limit
        let (passed, _) = evaluate(&policy, &order_at("BTC-USD", BASE_NS + 15_000_000));
        assert!(!passed);
        // A different symbol is unaffected
        let (passed, _) = evaluate(&policy, &order_at("ETH-USD", BASE_NS + 20_000_000));
        assert!(passed);
    }

    #[test]
    fn test_minute_window_rolls_over() {
        let policy = TradingFrequencyPolicy::new(TradingFrequencyConfig {
            max_orders_per_symbol_per_minute: 1,
            enforce_cooling_period: false,
            ..Default::default()
        });

        let (passed, _) = evaluate(&policy, &order_at("BTC-USD", BASE_NS));
        assert!(passed);
        let (passed, _) = evaluate(&policy, &order_at("BTC-USD", BASE_NS + 5_000_000_000));
        assert!(!passed);

        // 61 seconds later the window has rolled past the first orders
        let (passed, _) = evaluate(&policy, &order_at("BTC-USD", BASE_NS + 61_000_000_000));
        assert!(passed);
    }

    #[test]
    fn test_daily_limit() {
        let policy = TradingFrequencyPolicy::new(TradingFrequencyConfig {
            max_daily_trades: 3,
            enforce_cooling_period: false,
            ..Default::default()
        });

        // Space orders a minute apart so only the daily cap binds
        for i in 0..3 {
            let (passed, _) = evaluate(&policy, &order_at("BTC-USD", BASE_NS + i * 61_000_000_000));
            assert!(passed);
        }
        let (passed, result) =
            evaluate(&policy, &order_at("BTC-USD", BASE_NS + 4 * 61_000_000_000));
        assert!(!passed);
        assert_eq!(result.severity, ViolationSeverity::Warning);
    }
}
