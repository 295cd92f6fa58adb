//! Recorded observations, decisions, and lessons.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{BatonError, BatonResult},
    ids::InsightId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    Observation,
    Decision,
    Lesson,
}

impl InsightType {
    pub fn as_str(self) -> &'static str {
        match self {
            InsightType::Observation => "observation",
            InsightType::Decision => "decision",
            InsightType::Lesson => "lesson",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "observation" => Some(InsightType::Observation),
            "decision" => Some(InsightType::Decision),
            "lesson" => Some(InsightType::Lesson),
            _ => None,
        }
    }
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an evidence reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Record,
    Handoff,
    Trace,
    Artifact,
    Url,
}

impl EvidenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceKind::Record => "record",
            EvidenceKind::Handoff => "handoff",
            EvidenceKind::Trace => "trace",
            EvidenceKind::Artifact => "artifact",
            EvidenceKind::Url => "url",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "record" => Some(EvidenceKind::Record),
            "handoff" => Some(EvidenceKind::Handoff),
            "trace" => Some(EvidenceKind::Trace),
            "artifact" => Some(EvidenceKind::Artifact),
            "url" => Some(EvidenceKind::Url),
            _ => None,
        }
    }
}

/// A typed pointer supporting an insight. Renders as `kind:reference`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub kind: EvidenceKind,
    pub reference: String,
}

impl EvidenceRef {
    pub fn new(kind: EvidenceKind, reference: impl Into<String>) -> BatonResult<Self> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(BatonError::SchemaValidation {
                reason: format!("{} evidence reference is empty", kind.as_str()),
            });
        }
        Ok(Self { kind, reference })
    }

    /// Parse `"record:<id>"`, `"url:https://…"` and so on.
    pub fn parse(s: &str) -> BatonResult<Self> {
        let (kind, reference) = s.split_once(':').ok_or_else(|| BatonError::SchemaValidation {
            reason: format!("evidence '{s}' is not of the form kind:reference"),
        })?;
        let kind = EvidenceKind::parse(kind).ok_or_else(|| BatonError::SchemaValidation {
            reason: format!("evidence '{s}' has unknown reference type '{kind}'"),
        })?;
        Self::new(kind, reference)
    }
}

impl fmt::Display for EvidenceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.reference)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: InsightId,
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    pub summary: String,
    #[serde(deserialize_with = "deserialize_confidence")]
    confidence: f64,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
    pub recorded_at: DateTime<Utc>,
}

impl Insight {
    /// Build an insight; `confidence` is clamped to `[0, 1]` (NaN becomes 0).
    pub fn new(insight_type: InsightType, summary: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: InsightId::new(),
            insight_type,
            summary: summary.into(),
            confidence: clamp_confidence(confidence),
            evidence: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    pub fn with_evidence(mut self, evidence: EvidenceRef) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// Clamp to `[0, 1]`, mapping NaN to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn deserialize_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    f64::deserialize(deserializer).map(clamp_confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(Insight::new(InsightType::Lesson, "x", 1.7).confidence(), 1.0);
        assert_eq!(Insight::new(InsightType::Lesson, "x", -0.2).confidence(), 0.0);
        assert_eq!(Insight::new(InsightType::Lesson, "x", f64::NAN).confidence(), 0.0);
        assert_eq!(Insight::new(InsightType::Lesson, "x", 0.4).confidence(), 0.4);
    }

    #[test]
    fn evidence_parse_requires_known_type() {
        let ev = EvidenceRef::parse("trace:abc123").unwrap();
        assert_eq!(ev.kind, EvidenceKind::Trace);
        assert_eq!(ev.to_string(), "trace:abc123");

        assert!(EvidenceRef::parse("rumor:abc").is_err());
        assert!(EvidenceRef::parse("no-colon").is_err());
        assert!(EvidenceRef::parse("record:").is_err());
    }
}
