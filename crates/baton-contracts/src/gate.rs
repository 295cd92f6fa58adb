//! Gate decisions at governance boundaries.
//!
//! A failing gate is not an error. It is a `GateResult` with
//! `decision = Fail`, returned to the caller and persisted like any other.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::HandoffId;

/// Boundary name used when the handoff manager checks producer output.
pub const OUTPUT_VALIDATION_BOUNDARY: &str = "output-validation";

/// Policy id stamped on results produced by output validation.
pub const OUTPUT_VALIDATION_POLICY: &str = "expected-output";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Pass,
    Fail,
    Blocked,
}

impl GateDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            GateDecision::Pass => "pass",
            GateDecision::Fail => "fail",
            GateDecision::Blocked => "blocked",
        }
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered severity. `Ord` follows declaration order, `Info` lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pass/fail/blocked governance decision at one boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    /// The contract this decision is about.
    pub handoff_id: HandoffId,
    /// Where the gate sits, e.g. `"output-validation"` or `"pre-merge"`.
    pub boundary: String,
    pub policy_id: String,
    pub policy_version: String,
    pub decision: GateDecision,
    pub severity: Severity,
    /// Policy-defined follow-up, e.g. `"escalate_to_owner"`, `"retry"`, `"none"`.
    pub next_action: String,
    /// The rule that decided a non-pass result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

impl GateResult {
    pub fn is_pass(&self) -> bool {
        self.decision == GateDecision::Pass
    }
}
