//! Typed units of exchange between agents.
//!
//! A `Part` is one typed piece of content, a `Message` is an ordered,
//! non-empty list of parts, and an `Artifact` is a named bundle of parts an
//! agent produced. Parts are immutable: once built they expose their fields
//! read-only, and a `Message` never hands out mutable access to its parts.
//!
//! Deserialization enforces the same rules as the constructors against the
//! built-in kinds. Content carrying custom kinds is decoded through
//! `PartTypeTable::decode_message` or `PartTypeTable::decode_artifact`.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{BatonError, BatonResult},
    ids::AgentId,
};

/// The kind tag of a part.
///
/// The four built-in kinds are always available. `Custom` kinds must be
/// registered in a `PartTypeTable` before a part of that kind can be built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PartKind {
    Text,
    Json,
    TraceRef,
    Code,
    Custom(String),
}

impl PartKind {
    pub fn as_str(&self) -> &str {
        match self {
            PartKind::Text => "text",
            PartKind::Json => "json",
            PartKind::TraceRef => "trace_ref",
            PartKind::Code => "code",
            PartKind::Custom(name) => name,
        }
    }
}

impl From<String> for PartKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "text" => PartKind::Text,
            "json" => PartKind::Json,
            "trace_ref" => PartKind::TraceRef,
            "code" => PartKind::Code,
            _ => PartKind::Custom(s),
        }
    }
}

impl From<&str> for PartKind {
    fn from(s: &str) -> Self {
        PartKind::from(s.to_string())
    }
}

impl From<PartKind> for String {
    fn from(kind: PartKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload shape a part kind requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    Text,
    Json,
    TraceRef,
}

/// The body of a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PartPayload {
    Text { text: String },
    Json { value: Value },
    TraceRef { trace_id: String, span_id: Option<String> },
}

impl PartPayload {
    pub fn shape(&self) -> PayloadShape {
        match self {
            PartPayload::Text { .. } => PayloadShape::Text,
            PartPayload::Json { .. } => PayloadShape::Json,
            PartPayload::TraceRef { .. } => PayloadShape::TraceRef,
        }
    }
}

/// Maps part kinds to the payload shape they carry.
///
/// Built-in kinds are pre-registered; domain adapters register their own
/// kinds with `register` at startup.
#[derive(Debug, Clone)]
pub struct PartTypeTable {
    shapes: HashMap<String, PayloadShape>,
}

impl PartTypeTable {
    pub fn new() -> Self {
        let mut shapes = HashMap::new();
        shapes.insert("text".to_string(), PayloadShape::Text);
        shapes.insert("json".to_string(), PayloadShape::Json);
        shapes.insert("trace_ref".to_string(), PayloadShape::TraceRef);
        shapes.insert("code".to_string(), PayloadShape::Text);
        Self { shapes }
    }

    /// Register a custom kind. Re-registering a name replaces its shape.
    pub fn register(&mut self, name: impl Into<String>, shape: PayloadShape) {
        self.shapes.insert(name.into(), shape);
    }

    pub fn shape_of(&self, kind: &PartKind) -> Option<PayloadShape> {
        self.shapes.get(kind.as_str()).copied()
    }

    /// Build a part, checking the kind is registered and the payload matches.
    pub fn part(&self, kind: impl Into<PartKind>, payload: PartPayload) -> BatonResult<Part> {
        let kind = kind.into();
        self.check(&kind, &payload)?;
        Ok(Part {
            kind,
            payload,
            encoding: None,
        })
    }

    /// Decode a message, accepting any kind registered in this table.
    pub fn decode_message(&self, value: Value) -> BatonResult<Message> {
        let raw: RawMessage = serde_json::from_value(value).map_err(malformed("message"))?;
        raw.resolve(self)
    }

    /// Decode an artifact, accepting any kind registered in this table.
    pub fn decode_artifact(&self, value: Value) -> BatonResult<Artifact> {
        let raw: RawArtifact = serde_json::from_value(value).map_err(malformed("artifact"))?;
        raw.resolve(self)
    }

    fn check(&self, kind: &PartKind, payload: &PartPayload) -> BatonResult<()> {
        let expected = self
            .shape_of(kind)
            .ok_or_else(|| BatonError::UnknownPartKind {
                kind: kind.to_string(),
            })?;
        if payload.shape() != expected {
            return Err(BatonError::SchemaValidation {
                reason: format!(
                    "part kind '{}' requires a {:?} payload, got {:?}",
                    kind,
                    expected,
                    payload.shape()
                ),
            });
        }
        Ok(())
    }

    fn resolve_parts(&self, parts: Vec<RawPart>) -> BatonResult<Vec<Part>> {
        if parts.is_empty() {
            return Err(BatonError::EmptyMessage);
        }
        parts.into_iter().map(|p| p.resolve(self)).collect()
    }
}

fn malformed(what: &'static str) -> impl Fn(serde_json::Error) -> BatonError {
    move |e| BatonError::SchemaValidation {
        reason: format!("malformed {what}: {e}"),
    }
}

impl Default for PartTypeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// One typed content unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPart")]
pub struct Part {
    kind: PartKind,
    payload: PartPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: PartKind::Text,
            payload: PartPayload::Text { text: text.into() },
            encoding: None,
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            kind: PartKind::Json,
            payload: PartPayload::Json { value },
            encoding: None,
        }
    }

    pub fn code(source: impl Into<String>) -> Self {
        Self {
            kind: PartKind::Code,
            payload: PartPayload::Text {
                text: source.into(),
            },
            encoding: None,
        }
    }

    pub fn trace_ref(trace_id: impl Into<String>, span_id: Option<String>) -> Self {
        Self {
            kind: PartKind::TraceRef,
            payload: PartPayload::TraceRef {
                trace_id: trace_id.into(),
                span_id,
            },
            encoding: None,
        }
    }

    /// Returns a copy of this part with `encoding` set (e.g. `"base64"`).
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn kind(&self) -> &PartKind {
        &self.kind
    }

    pub fn payload(&self) -> &PartPayload {
        &self.payload
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Plain-text rendering used for line/token limits and marker checks.
    pub fn render(&self) -> String {
        match &self.payload {
            PartPayload::Text { text } => text.clone(),
            PartPayload::Json { value } => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            PartPayload::TraceRef { trace_id, span_id } => match span_id {
                Some(span) => format!("trace:{trace_id}/{span}"),
                None => format!("trace:{trace_id}"),
            },
        }
    }
}

/// An ordered, non-empty collection of parts sent by one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMessage")]
pub struct Message {
    parts: Vec<Part>,
    pub sender: AgentId,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message. Fails with `EmptyMessage` when `parts` is empty.
    pub fn new(sender: AgentId, parts: Vec<Part>) -> BatonResult<Self> {
        if parts.is_empty() {
            return Err(BatonError::EmptyMessage);
        }
        Ok(Self {
            parts,
            sender,
            timestamp: Utc::now(),
        })
    }

    /// A message with a single text part.
    pub fn text(sender: AgentId, text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
            sender,
            timestamp: Utc::now(),
        }
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// All parts rendered as text, joined by newlines, in insertion order.
    pub fn rendered(&self) -> String {
        self.parts
            .iter()
            .map(Part::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Iterate over the JSON values carried by `json` parts.
    pub fn json_values(&self) -> impl Iterator<Item = &Value> {
        self.parts.iter().filter_map(|p| match &p.payload {
            PartPayload::Json { value } => Some(value),
            _ => None,
        })
    }
}

/// A named bundle of parts produced by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawArtifact")]
pub struct Artifact {
    pub artifact_id: String,
    pub name: String,
    parts: Vec<Part>,
    pub produced_by: AgentId,
}

impl Artifact {
    pub fn new(
        artifact_id: impl Into<String>,
        name: impl Into<String>,
        produced_by: AgentId,
        parts: Vec<Part>,
    ) -> BatonResult<Self> {
        if parts.is_empty() {
            return Err(BatonError::EmptyMessage);
        }
        Ok(Self {
            artifact_id: artifact_id.into(),
            name: name.into(),
            parts,
            produced_by,
        })
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }
}

// ── Wire forms ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawPart {
    kind: PartKind,
    payload: PartPayload,
    #[serde(default)]
    encoding: Option<String>,
}

impl RawPart {
    fn resolve(self, table: &PartTypeTable) -> BatonResult<Part> {
        table.check(&self.kind, &self.payload)?;
        Ok(Part {
            kind: self.kind,
            payload: self.payload,
            encoding: self.encoding,
        })
    }
}

impl TryFrom<RawPart> for Part {
    type Error = BatonError;

    fn try_from(raw: RawPart) -> BatonResult<Self> {
        raw.resolve(&PartTypeTable::new())
    }
}

#[derive(Deserialize)]
struct RawMessage {
    parts: Vec<RawPart>,
    sender: AgentId,
    timestamp: DateTime<Utc>,
}

impl RawMessage {
    fn resolve(self, table: &PartTypeTable) -> BatonResult<Message> {
        Ok(Message {
            parts: table.resolve_parts(self.parts)?,
            sender: self.sender,
            timestamp: self.timestamp,
        })
    }
}

impl TryFrom<RawMessage> for Message {
    type Error = BatonError;

    fn try_from(raw: RawMessage) -> BatonResult<Self> {
        raw.resolve(&PartTypeTable::new())
    }
}

#[derive(Deserialize)]
struct RawArtifact {
    artifact_id: String,
    name: String,
    parts: Vec<RawPart>,
    produced_by: AgentId,
}

impl RawArtifact {
    fn resolve(self, table: &PartTypeTable) -> BatonResult<Artifact> {
        Ok(Artifact {
            artifact_id: self.artifact_id,
            name: self.name,
            parts: table.resolve_parts(self.parts)?,
            produced_by: self.produced_by,
        })
    }
}

impl TryFrom<RawArtifact> for Artifact {
    type Error = BatonError;

    fn try_from(raw: RawArtifact) -> BatonResult<Self> {
        raw.resolve(&PartTypeTable::new())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_custom_kind_is_rejected() {
        let table = PartTypeTable::new();
        let err = table
            .part("diagram", PartPayload::Text { text: "a -> b".into() })
            .unwrap_err();
        assert!(matches!(err, BatonError::UnknownPartKind { kind } if kind == "diagram"));
    }

    #[test]
    fn registered_custom_kind_is_accepted() {
        let mut table = PartTypeTable::new();
        table.register("diagram", PayloadShape::Text);
        let part = table
            .part("diagram", PartPayload::Text { text: "a -> b".into() })
            .unwrap();
        assert_eq!(part.kind(), &PartKind::Custom("diagram".into()));
    }

    #[test]
    fn payload_shape_must_match_kind() {
        let table = PartTypeTable::new();
        let err = table
            .part(PartKind::Json, PartPayload::Text { text: "{}".into() })
            .unwrap_err();
        assert!(matches!(err, BatonError::SchemaValidation { .. }));
    }

    #[test]
    fn empty_message_is_rejected() {
        let err = Message::new(AgentId::new("a"), vec![]).unwrap_err();
        assert!(matches!(err, BatonError::EmptyMessage));
    }

    #[test]
    fn message_preserves_part_order() {
        let msg = Message::new(
            AgentId::new("a"),
            vec![Part::text("first"), Part::json(json!({"n": 2})), Part::text("third")],
        )
        .unwrap();
        let rendered = msg.rendered();
        let first = rendered.find("first").unwrap();
        let third = rendered.find("third").unwrap();
        assert!(first < third);
        assert_eq!(msg.json_values().count(), 1);
    }

    #[test]
    fn part_kind_serializes_as_plain_string() {
        let json = serde_json::to_string(&PartKind::TraceRef).unwrap();
        assert_eq!(json, "\"trace_ref\"");
        let custom: PartKind = serde_json::from_str("\"diagram\"").unwrap();
        assert_eq!(custom, PartKind::Custom("diagram".into()));
    }

    // ── Deserialization ──────────────────────────────────────────────────────

    fn message_json(parts: Value) -> Value {
        json!({
            "parts": parts,
            "sender": "diagnosis-agent",
            "timestamp": "2026-01-01T00:00:00Z",
        })
    }

    #[test]
    fn deserialized_message_round_trips() {
        let msg = Message::new(
            AgentId::new("a"),
            vec![Part::text("hi"), Part::trace_ref("t-1", Some("s-2".into())).with_encoding("utf-8")],
        )
        .unwrap();
        let back: Message = serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn deserializing_an_empty_message_fails() {
        let err = serde_json::from_value::<Message>(message_json(json!([]))).unwrap_err();
        assert!(err.to_string().contains("at least one part"));

        let artifact = json!({
            "artifact_id": "a-1",
            "name": "report",
            "parts": [],
            "produced_by": "diagnosis-agent",
        });
        assert!(serde_json::from_value::<Artifact>(artifact).is_err());
    }

    #[test]
    fn deserializing_a_mismatched_payload_fails() {
        let part = json!({"kind": "json", "payload": {"shape": "text", "text": "{}"}});
        let err = serde_json::from_value::<Part>(part.clone()).unwrap_err();
        assert!(err.to_string().contains("requires a Json payload"));
        assert!(serde_json::from_value::<Message>(message_json(json!([part]))).is_err());
    }

    #[test]
    fn custom_kinds_decode_only_through_a_table_that_knows_them() {
        let parts = json!([{"kind": "diagram", "payload": {"shape": "text", "text": "a -> b"}}]);
        let err = serde_json::from_value::<Message>(message_json(parts.clone())).unwrap_err();
        assert!(err.to_string().contains("diagram"));

        let mut table = PartTypeTable::new();
        assert!(matches!(
            table.decode_message(message_json(parts.clone())),
            Err(BatonError::UnknownPartKind { .. })
        ));
        table.register("diagram", PayloadShape::Text);
        let msg = table.decode_message(message_json(parts)).unwrap();
        assert_eq!(msg.parts()[0].kind(), &PartKind::Custom("diagram".into()));

        assert!(matches!(
            table.decode_message(message_json(json!([]))),
            Err(BatonError::EmptyMessage)
        ));
        assert!(matches!(
            table.decode_artifact(json!({"name": "x"})),
            Err(BatonError::SchemaValidation { .. })
        ));
    }
}
