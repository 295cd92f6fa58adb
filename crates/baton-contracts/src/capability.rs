//! Discoverable units of agent-invokable functionality.
//!
//! Triggers come in two shapes in authored manifests: a bare phrase, or a
//! phrase tagged with the context it applies in. `Trigger` models both as one
//! sum type; `#[serde(untagged)]` accepts either form in the same list.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{BatonError, BatonResult},
    ids::CapabilityId,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Trigger {
    Plain(String),
    Tagged {
        phrase: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
}

impl Trigger {
    pub fn phrase(&self) -> &str {
        match self {
            Trigger::Plain(p) => p,
            Trigger::Tagged { phrase, .. } => phrase,
        }
    }

    pub fn context(&self) -> Option<&str> {
        match self {
            Trigger::Plain(_) => None,
            Trigger::Tagged { context, .. } => context.as_deref(),
        }
    }

    pub fn is_tagged(&self) -> bool {
        matches!(self, Trigger::Tagged { .. })
    }
}

/// Maturity of a capability. Only ever moves forward, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Maturity {
    Planned,
    Experimental,
    Beta,
    Stable,
    Deprecated,
}

impl Maturity {
    pub fn as_str(self) -> &'static str {
        match self {
            Maturity::Planned => "planned",
            Maturity::Experimental => "experimental",
            Maturity::Beta => "beta",
            Maturity::Stable => "stable",
            Maturity::Deprecated => "deprecated",
        }
    }
}

impl fmt::Display for Maturity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_confidence() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub capability_id: CapabilityId,
    #[serde(default)]
    pub description: String,
    pub triggers: Vec<Trigger>,
    pub category: String,
    pub maturity: Maturity,
    /// How reliably this capability delivers, in `[0, 1]`. Used for ranking.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl Capability {
    pub fn new(
        capability_id: impl Into<String>,
        category: impl Into<String>,
        maturity: Maturity,
    ) -> Self {
        Self {
            capability_id: CapabilityId::new(capability_id),
            description: String::new(),
            triggers: Vec::new(),
            category: category.into(),
            maturity,
            confidence: 1.0,
        }
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = crate::insight::clamp_confidence(confidence);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Move maturity forward. Staying put or moving backwards fails.
    pub fn advance_maturity(&mut self, next: Maturity) -> BatonResult<()> {
        if next <= self.maturity {
            return Err(BatonError::MaturityRegression {
                capability_id: self.capability_id.0.clone(),
                from: self.maturity,
                to: next,
            });
        }
        self.maturity = next;
        Ok(())
    }
}

/// The kind of a non-capability catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Pattern,
    AntiPattern,
}

/// A pattern or anti-pattern a capability can relate to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEntry {
    pub id: String,
    pub kind: PatternKind,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// The source applies the target pattern.
    Implements,
    /// The source replaces or guards against the target anti-pattern.
    Avoids,
    /// The source builds on the target capability.
    DependsOn,
    RelatedTo,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::Implements => "implements",
            RelationKind::Avoids => "avoids",
            RelationKind::DependsOn => "depends_on",
            RelationKind::RelatedTo => "related_to",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed edge between two catalog entries, referenced by id only.
///
/// Edges are authored in one direction; the reverse direction is derived by
/// the catalog that loads them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub from: String,
    pub kind: RelationKind,
    pub to: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maturity_only_moves_forward() {
        let mut cap = Capability::new("refactor.regex", "refactoring", Maturity::Beta);
        cap.advance_maturity(Maturity::Stable).unwrap();
        assert_eq!(cap.maturity, Maturity::Stable);

        let err = cap.advance_maturity(Maturity::Experimental).unwrap_err();
        assert!(matches!(err, BatonError::MaturityRegression { .. }));
        assert!(cap.advance_maturity(Maturity::Stable).is_err());
        assert_eq!(cap.maturity, Maturity::Stable);
    }

    #[test]
    fn mixed_trigger_list_deserializes() {
        let json = r#"[
            "parse llm output",
            {"phrase": "replace regex parsing of LLM output", "context": "refactoring"},
            {"phrase": "structured output"}
        ]"#;
        let triggers: Vec<Trigger> = serde_json::from_str(json).unwrap();
        assert_eq!(triggers.len(), 3);
        assert!(!triggers[0].is_tagged());
        assert_eq!(triggers[1].context(), Some("refactoring"));
        assert!(triggers[2].is_tagged());
        assert_eq!(triggers[2].context(), None);
    }
}
