//! Gate evaluation.
//!
//! Evaluation algorithm:
//!
//! 1. Evaluate every rule in declaration order against the subject.
//! 2. Among failing rules, pick the highest severity; ties go to the rule
//!    declared first.
//! 3. That rule sets `decision`, `severity`, `next_action` and `failed_rule`.
//! 4. If every rule passes the result is `pass` with severity `info` and the
//!    policy's `pass_action`.
//!
//! Evaluation reads nothing but its inputs. `evaluated_at` is the time of
//! the subject's last transition, so the same subject always yields the same
//! `GateResult`.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use baton_contracts::{
    error::{BatonError, BatonResult},
    gate::{GateDecision, GateResult, Severity},
    ids::RecordId,
    record::{keys, AttrValue, Attributes},
};
use baton_core::{manager::gate_attributes, traits::RecordSink, HandoffSnapshot};

use crate::rule::{GatePolicy, GateRule, RuleCheck};

/// What a gate is evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct GateSubject {
    pub snapshot: HandoffSnapshot,
    /// Flat facts about the outcome, e.g. `output.confidence`, `evidence.types`.
    pub attributes: Attributes,
}

impl GateSubject {
    pub fn new(snapshot: HandoffSnapshot) -> Self {
        Self {
            snapshot,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The subject's attribute, falling back to the handoff's own fields.
    fn attribute(&self, key: &str) -> Option<AttrValue> {
        if let Some(v) = self.attributes.get(key) {
            return Some(v.clone());
        }
        let contract = &self.snapshot.contract;
        match key {
            keys::HANDOFF_ID => Some(contract.id.to_string().into()),
            keys::HANDOFF_STATUS => Some(contract.status.as_str().into()),
            keys::HANDOFF_FROM_AGENT => Some(contract.from_agent.to_string().into()),
            keys::HANDOFF_TO_AGENT => Some(contract.to_agent.to_string().into()),
            keys::HANDOFF_CAPABILITY_ID => Some(contract.capability_id.to_string().into()),
            keys::HANDOFF_CORRELATION_ID => Some(contract.correlation_id.to_string().into()),
            keys::HANDOFF_ATTEMPT => Some(self.snapshot.attempt.into()),
            _ => None,
        }
    }

    fn evaluated_at(&self) -> DateTime<Utc> {
        self.snapshot
            .history
            .last()
            .map_or(self.snapshot.contract.created_at, |t| t.at)
    }
}

/// Evaluates one `GatePolicy`.
///
/// ```rust,ignore
/// let gate = GateEvaluator::from_file(Path::new("policies/triage.toml"))?;
/// let result = gate.evaluate("pre-close", &subject);
/// ```
#[derive(Debug, Clone)]
pub struct GateEvaluator {
    policy: GatePolicy,
}

impl GateEvaluator {
    pub fn new(policy: GatePolicy) -> BatonResult<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    /// Returns `Config` if the TOML is malformed or the policy is invalid.
    pub fn from_toml_str(s: &str) -> BatonResult<Self> {
        let policy: GatePolicy = toml::from_str(s).map_err(|e| BatonError::Config {
            reason: format!("failed to parse gate policy TOML: {}", e),
        })?;
        Self::new(policy)
    }

    pub fn from_file(path: &Path) -> BatonResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BatonError::Config {
            reason: format!("failed to read gate policy '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Evaluate the policy at `boundary`.
    pub fn evaluate(&self, boundary: &str, subject: &GateSubject) -> GateResult {
        let handoff_id = subject.snapshot.contract.id;
        debug!(
            handoff_id = %handoff_id,
            boundary,
            policy_id = %self.policy.id,
            rules = self.policy.rules.len(),
            "evaluating gate"
        );

        let mut decisive: Option<(&GateRule, String)> = None;
        for rule in &self.policy.rules {
            let Some(reason) = check(rule, subject) else {
                continue;
            };
            debug!(rule_id = %rule.id, severity = %rule.severity, %reason, "gate rule failed");
            let outranks = decisive
                .as_ref()
                .map_or(true, |(current, _)| rule.severity > current.severity);
            if outranks {
                decisive = Some((rule, reason));
            }
        }

        let result = match decisive {
            None => GateResult {
                handoff_id,
                boundary: boundary.to_string(),
                policy_id: self.policy.id.clone(),
                policy_version: self.policy.version.clone(),
                decision: GateDecision::Pass,
                severity: Severity::Info,
                next_action: self.policy.pass_action.clone(),
                failed_rule: None,
                reason: None,
                evaluated_at: subject.evaluated_at(),
            },
            Some((rule, reason)) => GateResult {
                handoff_id,
                boundary: boundary.to_string(),
                policy_id: self.policy.id.clone(),
                policy_version: self.policy.version.clone(),
                decision: rule.decision.into(),
                severity: rule.severity,
                next_action: rule.next_action.clone(),
                failed_rule: Some(rule.id.clone()),
                reason: Some(reason),
                evaluated_at: subject.evaluated_at(),
            },
        };

        if result.is_pass() {
            info!(handoff_id = %handoff_id, boundary, policy_id = %self.policy.id, "gate passed");
        } else {
            warn!(
                handoff_id = %handoff_id,
                boundary,
                policy_id = %self.policy.id,
                decision = %result.decision,
                failed_rule = result.failed_rule.as_deref().unwrap_or_default(),
                "gate did not pass"
            );
        }
        result
    }

    /// Evaluate and persist the result as a `gate` record parented to the
    /// handoff's root record.
    pub fn evaluate_and_record(
        &self,
        boundary: &str,
        subject: &GateSubject,
        sink: &dyn RecordSink,
    ) -> BatonResult<(GateResult, RecordId)> {
        let result = self.evaluate(boundary, subject);
        let record_id = sink.emit(
            keys::KIND_GATE,
            gate_attributes(&result),
            Some(subject.snapshot.record_id),
        )?;
        Ok((result, record_id))
    }
}

/// `None` if the rule passes, otherwise why it failed.
fn check(rule: &GateRule, subject: &GateSubject) -> Option<String> {
    match &rule.check {
        RuleCheck::MinConfidence { attribute, min } => {
            match subject.attribute(attribute).and_then(|v| v.as_f64()) {
                None => Some(format!("'{attribute}' is missing or not numeric")),
                Some(actual) if actual < *min => {
                    Some(format!("'{attribute}' is {actual}, below the minimum {min}"))
                }
                Some(_) => None,
            }
        }

        RuleCheck::RequiredEvidence { attribute, types } => {
            let present = subject
                .attribute(attribute)
                .map(|v| v.index_terms())
                .unwrap_or_default();
            let missing: Vec<&str> = types
                .iter()
                .filter(|t| !present.contains(t))
                .map(String::as_str)
                .collect();
            if missing.is_empty() {
                None
            } else {
                Some(format!("missing evidence of type {}", missing.join(", ")))
            }
        }

        RuleCheck::RequiredAttribute { attribute } => match subject.attribute(attribute) {
            None => Some(format!("required attribute '{attribute}' is absent")),
            Some(_) => None,
        },

        RuleCheck::StatusIn { statuses } => {
            let status = subject.snapshot.contract.status;
            if statuses.contains(&status) {
                None
            } else {
                Some(format!("handoff status {status} is not an allowed status"))
            }
        }

        RuleCheck::MaxAttempts { max } => {
            let attempt = subject.snapshot.attempt;
            if attempt > *max {
                Some(format!("{attempt} delivery attempts exceed the limit of {max}"))
            } else {
                None
            }
        }

        RuleCheck::AttributeEquals { attribute, value } => match subject.attribute(attribute) {
            None => Some(format!("attribute '{attribute}' is absent")),
            Some(actual) if values_equal(&actual, value) => None,
            Some(actual) => Some(format!("attribute '{attribute}' is '{actual}', expected '{value}'")),
        },
    }
}

/// Numbers compare numerically across `Int`/`Float`; everything else by value.
fn values_equal(a: &AttrValue, b: &AttrValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}
