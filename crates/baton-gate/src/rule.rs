//! Gate rule types and the policy file schema.
//!
//! Every rule is evaluated; the highest-severity failure decides the result.
//!
//! ```toml
//! id = "triage-completion"
//! version = "1"
//! pass_action = "close_incident"
//!
//! [[rules]]
//! id = "confident-diagnosis"
//! kind = "min_confidence"
//! attribute = "output.confidence"
//! min = 0.7
//! severity = "high"
//! next_action = "escalate_to_owner"
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use baton_contracts::{
    error::{BatonError, BatonResult},
    gate::{GateDecision, Severity},
    handoff::HandoffStatus,
    record::AttrValue,
};

fn default_confidence_attribute() -> String {
    "output.confidence".to_string()
}

fn default_evidence_attribute() -> String {
    "evidence.types".to_string()
}

/// What a rule checks. Selected by the `kind` key in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCheck {
    /// A numeric attribute must be at least `min`.
    MinConfidence {
        #[serde(default = "default_confidence_attribute")]
        attribute: String,
        min: f64,
    },
    /// A list attribute must contain every listed evidence type.
    RequiredEvidence {
        #[serde(default = "default_evidence_attribute")]
        attribute: String,
        types: Vec<String>,
    },
    RequiredAttribute { attribute: String },
    /// The handoff must be in one of `statuses`.
    StatusIn { statuses: Vec<HandoffStatus> },
    /// At most `max` delivery attempts were used.
    MaxAttempts { max: u32 },
    AttributeEquals { attribute: String, value: AttrValue },
}

impl RuleCheck {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleCheck::MinConfidence { .. } => "min_confidence",
            RuleCheck::RequiredEvidence { .. } => "required_evidence",
            RuleCheck::RequiredAttribute { .. } => "required_attribute",
            RuleCheck::StatusIn { .. } => "status_in",
            RuleCheck::MaxAttempts { .. } => "max_attempts",
            RuleCheck::AttributeEquals { .. } => "attribute_equals",
        }
    }
}

/// The decision a failing rule produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDecision {
    #[default]
    Fail,
    Blocked,
}

impl From<RuleDecision> for GateDecision {
    fn from(d: RuleDecision) -> Self {
        match d {
            RuleDecision::Fail => GateDecision::Fail,
            RuleDecision::Blocked => GateDecision::Blocked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateRule {
    /// Stable identifier, reported as `failed_rule`.
    pub id: String,

    #[serde(default)]
    pub description: String,

    #[serde(flatten)]
    pub check: RuleCheck,

    pub severity: Severity,

    #[serde(default)]
    pub decision: RuleDecision,

    /// Follow-up when this rule decides the result.
    pub next_action: String,
}

fn default_pass_action() -> String {
    "none".to_string()
}

/// The top-level structure deserialized from a TOML gate policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub id: String,
    pub version: String,

    /// `next_action` when every rule passes.
    #[serde(default = "default_pass_action")]
    pub pass_action: String,

    /// Declaration order breaks severity ties.
    #[serde(default)]
    pub rules: Vec<GateRule>,
}

impl GatePolicy {
    /// Reject duplicate rule ids and out-of-range thresholds.
    pub fn validate(&self) -> BatonResult<()> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(BatonError::Config {
                    reason: format!("policy '{}' declares rule '{}' twice", self.id, rule.id),
                });
            }
            if let RuleCheck::MinConfidence { min, .. } = &rule.check {
                if !(0.0..=1.0).contains(min) {
                    return Err(BatonError::Config {
                        reason: format!(
                            "rule '{}': min_confidence {} is outside [0, 1]",
                            rule.id, min
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
