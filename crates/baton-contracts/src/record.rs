//! The persisted form of every entity: a flat, attribute-bearing record.
//!
//! Attribute keys follow `<entity>.<field>`. The keys the runtime itself
//! emits are collected in [`keys`] so producers and consumers agree on them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RecordId;

/// A single attribute value. Lists hold strings only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used by range comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(i) => Some(*i as f64),
            AttrValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The string forms this value should be indexed and matched under.
    /// Scalars yield one entry, lists yield one per element.
    pub fn index_terms(&self) -> Vec<String> {
        match self {
            AttrValue::List(items) => items.clone(),
            other => vec![other.to_string()],
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(x) => write!(f, "{x}"),
            AttrValue::Str(s) => f.write_str(s),
            AttrValue::List(items) => write!(f, "[{}]", items.join(",")),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<u32> for AttrValue {
    fn from(i: u32) -> Self {
        AttrValue::Int(i64::from(i))
    }
}

impl From<f64> for AttrValue {
    fn from(x: f64) -> Self {
        AttrValue::Float(x)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(items: Vec<String>) -> Self {
        AttrValue::List(items)
    }
}

/// Flat key → value map. Ordered so hashing and serialization are stable.
pub type Attributes = BTreeMap<String, AttrValue>;

/// A sub-lifecycle event appended to an existing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attributes: Attributes,
}

/// An immutable unit of persisted history.
///
/// `attributes` never change after the record is written. `events` may only
/// grow. `prev_hash`/`this_hash` chain every record to its predecessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: RecordId,
    /// Position in the store, starting at 0.
    pub sequence: u64,
    pub kind: String,
    pub attributes: Attributes,
    #[serde(default)]
    pub events: Vec<RecordEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<RecordId>,
    pub timestamp: DateTime<Utc>,
    pub prev_hash: String,
    pub this_hash: String,
}

impl Record {
    /// Look up an attribute, including the `record.*` pseudo-fields.
    pub fn attribute(&self, key: &str) -> Option<AttrValue> {
        match key {
            keys::RECORD_ID => Some(AttrValue::Str(self.record_id.to_string())),
            keys::RECORD_KIND => Some(AttrValue::Str(self.kind.clone())),
            keys::RECORD_PARENT_ID => self
                .parent_id
                .map(|p| AttrValue::Str(p.to_string())),
            _ => self.attributes.get(key).cloned(),
        }
    }
}

/// Half-open time window `[start, end)`. Missing bounds are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at < e)
    }
}

/// Attribute keys and record kinds emitted by the runtime.
pub mod keys {
    pub const RECORD_ID: &str = "record.id";
    pub const RECORD_KIND: &str = "record.kind";
    pub const RECORD_PARENT_ID: &str = "record.parent_id";

    pub const KIND_HANDOFF: &str = "handoff";
    pub const KIND_TRANSITION: &str = "handoff.transition";
    pub const KIND_GATE: &str = "gate";
    pub const KIND_INSIGHT: &str = "insight";
    pub const KIND_CAPABILITY: &str = "capability";

    pub const HANDOFF_ID: &str = "handoff.id";
    pub const HANDOFF_STATUS: &str = "handoff.status";
    pub const HANDOFF_FROM_STATUS: &str = "handoff.from_status";
    pub const HANDOFF_FROM_AGENT: &str = "handoff.from_agent";
    pub const HANDOFF_TO_AGENT: &str = "handoff.to_agent";
    pub const HANDOFF_CAPABILITY_ID: &str = "handoff.capability_id";
    pub const HANDOFF_CORRELATION_ID: &str = "handoff.correlation_id";
    pub const HANDOFF_ATTEMPT: &str = "handoff.attempt";
    pub const HANDOFF_SCHEMA_VERSION: &str = "handoff.schema_version";
    pub const HANDOFF_NOTE: &str = "handoff.note";
    /// Full JSON snapshot of a contract, written on its terminal transition.
    pub const HANDOFF_CONTRACT: &str = "handoff.contract";

    pub const GATE_HANDOFF_ID: &str = "gate.handoff_id";
    pub const GATE_BOUNDARY: &str = "gate.boundary";
    pub const GATE_POLICY_ID: &str = "gate.policy_id";
    pub const GATE_POLICY_VERSION: &str = "gate.policy_version";
    pub const GATE_DECISION: &str = "gate.decision";
    pub const GATE_SEVERITY: &str = "gate.severity";
    pub const GATE_NEXT_ACTION: &str = "gate.next_action";
    pub const GATE_FAILED_RULE: &str = "gate.failed_rule";
    pub const GATE_REASON: &str = "gate.reason";

    pub const CAPABILITY_ID: &str = "capability.id";
    pub const CAPABILITY_TRIGGERS: &str = "capability.triggers";
    pub const CAPABILITY_CATEGORY: &str = "capability.category";
    pub const CAPABILITY_MATURITY: &str = "capability.maturity";
    pub const CAPABILITY_CONFIDENCE: &str = "capability.confidence";
    pub const CAPABILITY_MANIFEST_VERSION: &str = "capability.manifest_version";
    /// Outgoing relations as `kind:target` strings.
    pub const CAPABILITY_RELATIONS: &str = "capability.relations";

    pub const INSIGHT_ID: &str = "insight.id";
    pub const INSIGHT_TYPE: &str = "insight.type";
    pub const INSIGHT_SUMMARY: &str = "insight.summary";
    pub const INSIGHT_CONFIDENCE: &str = "insight.confidence";
    pub const INSIGHT_EVIDENCE: &str = "insight.evidence";
    pub const INSIGHT_RECORDED_AT: &str = "insight.recorded_at";
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn time_range_is_half_open() {
        let now = Utc::now();
        let range = TimeRange::between(now, now + Duration::seconds(10));
        assert!(range.contains(now));
        assert!(range.contains(now + Duration::seconds(9)));
        assert!(!range.contains(now + Duration::seconds(10)));
        assert!(!range.contains(now - Duration::seconds(1)));
        assert!(TimeRange::all().contains(now));
    }

    #[test]
    fn untagged_attr_values_keep_their_type() {
        let mut attrs = Attributes::new();
        attrs.insert("a".into(), AttrValue::Int(3));
        attrs.insert("b".into(), AttrValue::Float(0.5));
        attrs.insert("c".into(), AttrValue::Str("x".into()));
        attrs.insert("d".into(), AttrValue::List(vec!["p".into(), "q".into()]));
        attrs.insert("e".into(), AttrValue::Bool(true));

        let json = serde_json::to_string(&attrs).unwrap();
        let back: Attributes = serde_json::from_str(&json).unwrap();
        assert_eq!(attrs, back);
    }
}
