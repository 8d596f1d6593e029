//! Policy evaluation result
//!
//! One fixed small record per evaluation. Severity only ever escalates as
//! violations accumulate - `set_violation` never downgrades - and the
//! admit decision is derived from it: an order proceeds iff the final
//! severity stays below `Error`.

use serde::{Deserialize, Serialize};

/// Longest violation reason kept on a result, in bytes.
pub const MAX_REASON_LEN: usize = 64;

/// Policy violation severity levels, ordered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum ViolationSeverity {
    /// Informational, allow execution
    #[default]
    Info = 0,
    /// Warning, log but allow
    Warning = 1,
    /// Error, block execution
    Error = 2,
    /// Critical, emergency-grade block
    Critical = 3,
}

impl ViolationSeverity {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Info),
            1 => Some(Self::Warning),
            2 => Some(Self::Error),
            3 => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Fast policy evaluation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyResult {
    /// Can the order proceed?
    pub allowed: bool,
    /// Highest violation severity seen
    pub severity: ViolationSeverity,
    /// Number of violations recorded
    pub violated_policy_count: u16,
    /// First policy to reach the highest severity seen
    pub primary_violation_id: u32,
    /// Human-readable reason, truncated to [`MAX_REASON_LEN`] bytes
    pub violation_reason: String,
    /// Time taken to evaluate
    pub evaluation_time_ns: u64,
    /// Total policies checked
    pub evaluated_policy_count: u32,
    /// Integrity check over the other fields; see [`Self::seal`]
    pub checksum: u32,
}

impl Default for PolicyResult {
    fn default() -> Self {
        Self::clean()
    }
}

impl PolicyResult {
    /// A passing result with no violations.
    pub fn clean() -> Self {
        Self {
            allowed: true,
            severity: ViolationSeverity::Info,
            violated_policy_count: 0,
            primary_violation_id: 0,
            violation_reason: String::new(),
            evaluation_time_ns: 0,
            evaluated_policy_count: 0,
            checksum: 0,
        }
    }

    /// Record a violation. Severity only rises; the first policy to reach
    /// the highest severity seen keeps `primary_violation_id` (ties break
    /// in evaluation order). `allowed` is re-derived every call.
    pub fn set_violation(&mut self, policy_id: u32, severity: ViolationSeverity, reason: &str) {
        if severity > self.severity {
            self.severity = severity;
            self.primary_violation_id = policy_id;
            self.violation_reason = truncate_reason(reason);
        }
        self.violated_policy_count = self.violated_policy_count.saturating_add(1);
        self.allowed = self.severity < ViolationSeverity::Error;
    }

    pub fn is_critical(&self) -> bool {
        self.severity == ViolationSeverity::Critical
    }

    pub fn requires_escalation(&self) -> bool {
        self.severity >= ViolationSeverity::Error
    }

    /// Checksum over every field except `checksum` itself.
    pub fn compute_checksum(&self) -> u32 {
        let mut bytes = Vec::with_capacity(32 + self.violation_reason.len());
        bytes.push(u8::from(self.allowed));
        bytes.push(self.severity as u8);
        bytes.extend_from_slice(&self.violated_policy_count.to_le_bytes());
        bytes.extend_from_slice(&self.primary_violation_id.to_le_bytes());
        bytes.extend_from_slice(&(self.violation_reason.len() as u32).to_le_bytes());
        bytes.extend_from_slice(self.violation_reason.as_bytes());
        bytes.extend_from_slice(&self.evaluation_time_ns.to_le_bytes());
        bytes.extend_from_slice(&self.evaluated_policy_count.to_le_bytes());
        crc32fast::hash(&bytes)
    }

    /// Stamp the checksum. Called once by the engine after the last field
    /// write.
    pub fn seal(&mut self) {
        self.checksum = self.compute_checksum();
    }

    pub fn verify_integrity(&self) -> bool {
        self.checksum == self.compute_checksum()
    }
}

fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_REASON_LEN {
        return reason.to_string();
    }
    let mut end = MAX_REASON_LEN;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(ViolationSeverity::Info < ViolationSeverity::Warning);
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn test_clean_result_allows() {
        let result = PolicyResult::clean();
        assert!(result.allowed);
        assert_eq!(result.severity, ViolationSeverity::Info);
        assert_eq!(result.violated_policy_count, 0);
    }

    #[test]
    fn test_warning_does_not_block() {
        let mut result = PolicyResult::clean();
        result.set_violation(1003, ViolationSeverity::Warning, "rate elevated");

        assert!(result.allowed);
        assert_eq!(result.severity, ViolationSeverity::Warning);
        assert_eq!(result.primary_violation_id, 1003);
        assert_eq!(result.violated_policy_count, 1);
    }

    #[test]
    fn test_error_blocks_and_severity_never_downgrades() {
        let mut result = PolicyResult::clean();
        result.set_violation(1001, ViolationSeverity::Error, "order too large");
        assert!(!result.allowed);

        // A later warning must not soften the decision or steal primacy
        result.set_violation(1003, ViolationSeverity::Warning, "rate elevated");
        assert!(!result.allowed);
        assert_eq!(result.severity, ViolationSeverity::Error);
        assert_eq!(result.primary_violation_id, 1001);
        assert_eq!(result.violation_reason, "order too large");
        assert_eq!(result.violated_policy_count, 2);
    }

    #[test]
    fn test_first_policy_at_highest_severity_keeps_primacy() {
        let mut result = PolicyResult::clean();
        result.set_violation(1001, ViolationSeverity::Error, "first");
        result.set_violation(1004, ViolationSeverity::Error, "second at same level");

        assert_eq!(result.primary_violation_id, 1001);
        assert_eq!(result.violation_reason, "first");

        // A strictly higher severity does take over
        result.set_violation(1004, ViolationSeverity::Critical, "portfolio breach");
        assert_eq!(result.primary_violation_id, 1004);
        assert_eq!(result.violation_reason, "portfolio breach");
    }

    #[test]
    fn test_reason_is_bounded() {
        let mut result = PolicyResult::clean();
        let long_reason = "x".repeat(500);
        result.set_violation(1001, ViolationSeverity::Error, &long_reason);
        assert_eq!(result.violation_reason.len(), MAX_REASON_LEN);
    }

    #[test]
    fn test_seal_and_tamper_detection() {
        let mut result = PolicyResult::clean();
        result.set_violation(1001, ViolationSeverity::Error, "order too large");
        result.evaluation_time_ns = 4_200;
        result.seal();
        assert!(result.verify_integrity());

        result.allowed = true; // forged admit
        assert!(!result.verify_integrity());
    }
}
