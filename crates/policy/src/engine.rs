//! Policy evaluation engine
//!
//! Runs every enabled policy against a proposed order, in registration
//! order, under a ~100 microsecond budget. Severity only escalates across
//! policies; a CRITICAL finding may end the pass early; the budget is
//! checked cooperatively after each policy (a timeout never aborts an
//! in-flight policy call, it stops further ones).
//!
//! State machine: NORMAL <-> EMERGENCY_STOPPED. While stopped, every
//! evaluation is rejected at CRITICAL severity without running policies
//! (fail-closed). The only way back is `reset_emergency_stop` - an
//! explicit operator action, never a timer.

use crate::context::{MarketContext, OrderDetails, PortfolioState};
use crate::error::{Error, Result};
use crate::policies::{Policy, PolicyParams};
use crate::result::{PolicyResult, ViolationSeverity};
use kestrel_clock::Clock;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Pseudo-policy id used when the emergency stop rejects an order.
pub const POLICY_ID_EMERGENCY: u32 = 0;

/// Pseudo-policy id used when the evaluation time budget is breached.
pub const POLICY_ID_TIMEOUT: u32 = 9000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stop evaluating once a CRITICAL violation is recorded. A latency
    /// optimization only: any CRITICAL result is already terminal.
    pub enable_early_termination: bool,
    /// Evaluation time budget (default 100us)
    pub max_evaluation_time_ns: u64,
    /// Bounded audit trail length
    pub audit_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_early_termination: true,
            max_evaluation_time_ns: 100_000,
            audit_capacity: 10_000,
        }
    }
}

/// One audit record per evaluation, pass or fail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp_ns: u64,
    pub order_id: u32,
    pub symbol: String,
    pub result: PolicyResult,
    /// Policy ids actually run, in evaluation order
    pub evaluated_policies: Vec<u32>,
}

/// Engine counters. All atomic; read through [`PolicyEngine::metrics`].
#[derive(Debug, Default)]
struct PolicyMetrics {
    evaluations_total: AtomicU64,
    evaluations_passed: AtomicU64,
    evaluations_failed: AtomicU64,
    avg_evaluation_time_ns: AtomicU64,
    max_evaluation_time_ns: AtomicU64,
    timeout_count: AtomicU64,
    emergency_stops: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyMetricsSnapshot {
    pub evaluations_total: u64,
    pub evaluations_passed: u64,
    pub evaluations_failed: u64,
    pub avg_evaluation_time_ns: u64,
    pub max_evaluation_time_ns: u64,
    pub timeout_count: u64,
    pub emergency_stops: u64,
}

/// Per-policy counters, kept inside the registration slot so the hot path
/// only ever takes the policies read lock.
#[derive(Debug, Default)]
struct SlotStats {
    evaluations: AtomicU64,
    violations: AtomicU64,
    total_time_ns: AtomicU64,
    max_severity: AtomicU8,
}

/// Per-policy statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyStats {
    pub evaluations: u64,
    pub violations: u64,
    pub avg_time_ns: u64,
    pub max_severity: ViolationSeverity,
}

struct PolicySlot {
    policy: Policy,
    enabled: bool,
    stats: SlotStats,
}

/// Ultra-fast policy evaluation engine
pub struct PolicyEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    /// Registration order is evaluation order - it breaks severity ties
    policies: RwLock<Vec<PolicySlot>>,
    emergency_stopped: AtomicBool,
    audit_enabled: AtomicBool,
    audit_trail: Mutex<VecDeque<AuditEntry>>,
    metrics: PolicyMetrics,
}

impl PolicyEngine {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            policies: RwLock::new(Vec::new()),
            emergency_stopped: AtomicBool::new(false),
            audit_enabled: AtomicBool::new(false),
            audit_trail: Mutex::new(VecDeque::new()),
            metrics: PolicyMetrics::default(),
        }
    }

    /// Engine pre-loaded with all five standard policies at their default
    /// configurations, in id order.
    pub fn with_default_policies(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let engine = Self::new(config, clock);
        engine.add_policy(Policy::PositionSize(Default::default()));
        engine.add_policy(Policy::PriceDeviation(Default::default()));
        engine.add_policy(Policy::TradingFrequency(Default::default()));
        engine.add_policy(Policy::RiskLimits(Default::default()));
        engine.add_policy(Policy::MarketConditions(Default::default()));
        engine
    }

    /// Register a policy. A policy with the same id is replaced in place,
    /// keeping its position in the evaluation order.
    pub fn add_policy(&self, policy: Policy) {
        let mut slots = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        info!("[POLICY] registered {} ({})", policy.name(), policy.id());
        match slots.iter_mut().find(|slot| slot.policy.id() == policy.id()) {
            Some(slot) => {
                slot.policy = policy;
                slot.enabled = true;
            }
            None => slots.push(PolicySlot {
                policy,
                enabled: true,
                stats: SlotStats::default(),
            }),
        }
    }

    pub fn remove_policy(&self, policy_id: u32) -> Result<()> {
        let mut slots = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|slot| slot.policy.id() != policy_id);
        if slots.len() == before {
            return Err(Error::UnknownPolicy { policy_id });
        }
        info!("[POLICY] removed policy {policy_id}");
        Ok(())
    }

    pub fn enable_policy(&self, policy_id: u32, enabled: bool) -> Result<()> {
        let mut slots = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        match slots.iter_mut().find(|slot| slot.policy.id() == policy_id) {
            Some(slot) => {
                slot.enabled = enabled;
                Ok(())
            }
            None => Err(Error::UnknownPolicy { policy_id }),
        }
    }

    /// Hot-swap one policy's configuration without reconstructing the
    /// engine. In-flight evaluations finish against the old values.
    pub fn update_policy_parameters(&self, policy_id: u32, params: &PolicyParams) -> Result<()> {
        let mut slots = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        match slots.iter_mut().find(|slot| slot.policy.id() == policy_id) {
            Some(slot) => {
                slot.policy.update_parameters(params);
                info!("[POLICY] parameters updated for policy {policy_id}");
                Ok(())
            }
            None => Err(Error::UnknownPolicy { policy_id }),
        }
    }

    /// Evaluate one order against every enabled policy.
    pub fn evaluate_order(
        &self,
        order: &OrderDetails,
        market: &MarketContext,
        portfolio: &PortfolioState,
    ) -> PolicyResult {
        let start_ns = self.clock.now_ns();
        let mut result = PolicyResult::clean();
        let mut evaluated: Vec<u32> = Vec::new();

        if self.emergency_stopped.load(Ordering::SeqCst) {
            result.set_violation(
                POLICY_ID_EMERGENCY,
                ViolationSeverity::Critical,
                "emergency stop active",
            );
            return self.finish(order, result, evaluated, start_ns);
        }

        let slots = self.policies.read().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.iter().filter(|slot| slot.enabled) {
            let policy_start_ns = self.clock.now_ns();
            let severity_before = result.severity;
            result.evaluated_policy_count += 1;
            evaluated.push(slot.policy.id());

            let passed = slot.policy.evaluate(order, market, portfolio, &mut result);
            slot.stats.record(
                &slot.policy,
                passed,
                severity_before,
                result.severity,
                self.clock.now_ns().saturating_sub(policy_start_ns),
            );

            if self.config.enable_early_termination
                && result.severity >= ViolationSeverity::Critical
            {
                break;
            }

            let elapsed_ns = self.clock.now_ns().saturating_sub(start_ns);
            if elapsed_ns > self.config.max_evaluation_time_ns {
                self.metrics.timeout_count.fetch_add(1, Ordering::Relaxed);
                result.set_violation(
                    POLICY_ID_TIMEOUT,
                    ViolationSeverity::Warning,
                    "evaluation time budget exceeded",
                );
                warn!(
                    "[POLICY] evaluation budget exceeded after {} of {} policies ({elapsed_ns}ns)",
                    evaluated.len(),
                    slots.len()
                );
                break;
            }
        }
        drop(slots);

        self.finish(order, result, evaluated, start_ns)
    }

    /// Evaluate a batch of orders against one market/portfolio snapshot.
    ///
    /// The shared snapshot is intentional: every order in the batch is
    /// judged against the same point-in-time view, so results are
    /// comparable across the batch. Results are in input order.
    pub fn evaluate_orders(
        &self,
        orders: &[OrderDetails],
        market: &MarketContext,
        portfolio: &PortfolioState,
    ) -> Vec<PolicyResult> {
        orders
            .iter()
            .map(|order| self.evaluate_order(order, market, portfolio))
            .collect()
    }

    /// Reject everything until an operator resets. Fail-closed.
    pub fn emergency_stop_all(&self) {
        self.emergency_stopped.store(true, Ordering::SeqCst);
        self.metrics.emergency_stops.fetch_add(1, Ordering::Relaxed);
        error!("[POLICY] EMERGENCY STOP ACTIVATED - rejecting all orders");
    }

    /// Explicit operator action; the only transition back to NORMAL.
    pub fn reset_emergency_stop(&self) {
        self.emergency_stopped.store(false, Ordering::SeqCst);
        info!("[POLICY] emergency stop reset by operator");
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.emergency_stopped.load(Ordering::SeqCst)
    }

    pub fn enable_audit_logging(&self, enabled: bool) {
        self.audit_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Audit entries at or after `since_timestamp_ns`, oldest first.
    pub fn get_audit_trail(&self, since_timestamp_ns: u64) -> Vec<AuditEntry> {
        self.audit_trail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.timestamp_ns >= since_timestamp_ns)
            .cloned()
            .collect()
    }

    pub fn clear_audit_trail(&self) {
        self.audit_trail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn metrics(&self) -> PolicyMetricsSnapshot {
        PolicyMetricsSnapshot {
            evaluations_total: self.metrics.evaluations_total.load(Ordering::Relaxed),
            evaluations_passed: self.metrics.evaluations_passed.load(Ordering::Relaxed),
            evaluations_failed: self.metrics.evaluations_failed.load(Ordering::Relaxed),
            avg_evaluation_time_ns: self.metrics.avg_evaluation_time_ns.load(Ordering::Relaxed),
            max_evaluation_time_ns: self.metrics.max_evaluation_time_ns.load(Ordering::Relaxed),
            timeout_count: self.metrics.timeout_count.load(Ordering::Relaxed),
            emergency_stops: self.metrics.emergency_stops.load(Ordering::Relaxed),
        }
    }

    pub fn reset_metrics(&self) {
        self.metrics.evaluations_total.store(0, Ordering::Relaxed);
        self.metrics.evaluations_passed.store(0, Ordering::Relaxed);
        self.metrics.evaluations_failed.store(0, Ordering::Relaxed);
        self.metrics.avg_evaluation_time_ns.store(0, Ordering::Relaxed);
        self.metrics.max_evaluation_time_ns.store(0, Ordering::Relaxed);
        self.metrics.timeout_count.store(0, Ordering::Relaxed);
        self.metrics.emergency_stops.store(0, Ordering::Relaxed);
    }

    /// Per-policy statistics keyed by policy id.
    pub fn policy_statistics(&self) -> HashMap<u32, PolicyStats> {
        let slots = self.policies.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .iter()
            .map(|slot| (slot.policy.id(), slot.stats.snapshot()))
            .collect()
    }

    pub fn policy_count(&self) -> usize {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn finish(
        &self,
        order: &OrderDetails,
        mut result: PolicyResult,
        evaluated: Vec<u32>,
        start_ns: u64,
    ) -> PolicyResult {
        result.evaluation_time_ns = self.clock.now_ns().saturating_sub(start_ns);
        result.seal();

        self.metrics.evaluations_total.fetch_add(1, Ordering::Relaxed);
        if result.allowed {
            self.metrics.evaluations_passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.evaluations_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.record_evaluation_time(result.evaluation_time_ns);

        if self.audit_enabled.load(Ordering::SeqCst) {
            let mut trail = self
                .audit_trail
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            trail.push_back(AuditEntry {
                timestamp_ns: start_ns,
                order_id: order.client_order_id,
                symbol: order.symbol.clone(),
                result: result.clone(),
                evaluated_policies: evaluated,
            });
            while trail.len() > self.config.audit_capacity {
                trail.pop_front();
            }
        }

        result
    }

    fn record_evaluation_time(&self, elapsed_ns: u64) {
        // Moving average over the last ~64 evaluations
        let current = self.metrics.avg_evaluation_time_ns.load(Ordering::Relaxed);
        let updated = (current * 63 + elapsed_ns) / 64;
        self.metrics
            .avg_evaluation_time_ns
            .store(updated, Ordering::Relaxed);

        let mut current_max = self.metrics.max_evaluation_time_ns.load(Ordering::Relaxed);
        while elapsed_ns > current_max {
            match self.metrics.max_evaluation_time_ns.compare_exchange_weak(
                current_max,
                elapsed_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current_max = observed,
            }
        }
    }
}

impl SlotStats {
    fn record(
        &self,
        policy: &Policy,
        passed: bool,
        severity_before: ViolationSeverity,
        severity_after: ViolationSeverity,
        elapsed_ns: u64,
    ) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        self.total_time_ns.fetch_add(elapsed_ns, Ordering::Relaxed);
        if !passed {
            self.violations.fetch_add(1, Ordering::Relaxed);
            // When this policy raised the running severity, that raise is
            // its contribution; otherwise fall back to its default level
            let contributed = if severity_after > severity_before {
                severity_after
            } else {
                policy.default_severity()
            };
            self.max_severity
                .fetch_max(contributed as u8, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> PolicyStats {
        let evaluations = self.evaluations.load(Ordering::Relaxed);
        let total_time_ns = self.total_time_ns.load(Ordering::Relaxed);
        PolicyStats {
            evaluations,
            violations: self.violations.load(Ordering::Relaxed),
            avg_time_ns: if evaluations == 0 {
                0
            } else {
                total_time_ns / evaluations
            },
            max_severity: ViolationSeverity::from_u8(self.max_severity.load(Ordering::Relaxed))
                .unwrap_or(ViolationSeverity::Info),
        }
    }
}
