//! Handoff contracts and their lifecycle states.
//!
//! The allowed edges between `HandoffStatus` values live here, next to the
//! type, so every crate that reasons about lifecycles shares one graph.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    content::Message,
    expected::ExpectedOutput,
    gate::GateResult,
    ids::{AgentId, CapabilityId, CorrelationId, HandoffId},
};

/// Lifecycle state of a handoff.
///
/// ```text
/// CREATED → SENT → RECEIVED → {ACCEPTED, REJECTED, INPUT_REQUIRED} → COMPLETED
///            │        │            INPUT_REQUIRED → RECEIVED (retry)
///            └────────┴→ TIMEOUT → SENT (retry) | DEAD_LETTER
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandoffStatus {
    Created,
    Sent,
    Received,
    InputRequired,
    Accepted,
    Rejected,
    Completed,
    Timeout,
    DeadLetter,
    Cancelled,
}

impl HandoffStatus {
    pub const ALL: [HandoffStatus; 10] = [
        HandoffStatus::Created,
        HandoffStatus::Sent,
        HandoffStatus::Received,
        HandoffStatus::InputRequired,
        HandoffStatus::Accepted,
        HandoffStatus::Rejected,
        HandoffStatus::Completed,
        HandoffStatus::Timeout,
        HandoffStatus::DeadLetter,
        HandoffStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HandoffStatus::Created => "CREATED",
            HandoffStatus::Sent => "SENT",
            HandoffStatus::Received => "RECEIVED",
            HandoffStatus::InputRequired => "INPUT_REQUIRED",
            HandoffStatus::Accepted => "ACCEPTED",
            HandoffStatus::Rejected => "REJECTED",
            HandoffStatus::Completed => "COMPLETED",
            HandoffStatus::Timeout => "TIMEOUT",
            HandoffStatus::DeadLetter => "DEAD_LETTER",
            HandoffStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            HandoffStatus::Completed
                | HandoffStatus::DeadLetter
                | HandoffStatus::Rejected
                | HandoffStatus::Cancelled
        )
    }

    /// True for the edges that move a contract back to an earlier state to
    /// retry: `TIMEOUT → SENT` and `INPUT_REQUIRED → RECEIVED`.
    pub fn is_retry_edge(self, next: HandoffStatus) -> bool {
        matches!(
            (self, next),
            (HandoffStatus::Timeout, HandoffStatus::Sent)
                | (HandoffStatus::InputRequired, HandoffStatus::Received)
        )
    }

    /// Whether `self → next` is an edge of the lifecycle graph.
    pub fn can_transition_to(self, next: HandoffStatus) -> bool {
        use HandoffStatus::*;
        matches!(
            (self, next),
            (Created, Sent)
                | (Created, Cancelled)
                | (Sent, Received)
                | (Sent, Timeout)
                | (Sent, Cancelled)
                | (Received, Accepted)
                | (Received, Rejected)
                | (Received, InputRequired)
                | (Received, Timeout)
                | (Received, DeadLetter)
                | (InputRequired, Received)
                | (Accepted, Completed)
                | (Accepted, DeadLetter)
                | (Timeout, Sent)
                | (Timeout, DeadLetter)
        )
    }

    /// Position in the forward order of the graph. Every non-retry edge
    /// strictly increases the rank.
    pub fn rank(self) -> u8 {
        match self {
            HandoffStatus::Created => 0,
            HandoffStatus::Sent => 1,
            HandoffStatus::Received => 2,
            HandoffStatus::InputRequired | HandoffStatus::Timeout => 3,
            HandoffStatus::Accepted | HandoffStatus::Rejected => 4,
            HandoffStatus::Completed | HandoffStatus::Cancelled => 5,
            HandoffStatus::DeadLetter => 6,
        }
    }

    /// True if this state still waits on another agent (timeout sweep target).
    pub fn is_awaiting_peer(self) -> bool {
        matches!(self, HandoffStatus::Sent | HandoffStatus::Received)
    }
}

impl fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed delegation request from one agent to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffContract {
    pub id: HandoffId,
    /// Version of the registered contract schema this contract conforms to.
    pub schema_version: Version,
    pub from_agent: AgentId,
    pub to_agent: AgentId,
    pub capability_id: CapabilityId,
    pub expected_output: ExpectedOutput,
    pub status: HandoffStatus,
    pub created_at: DateTime<Utc>,
    pub correlation_id: CorrelationId,
    /// The delegated request itself.
    pub request: Message,
    /// Documented extension point; keys not covered by the schema go here.
    #[serde(default)]
    pub extensions: BTreeMap<String, Value>,
}

impl HandoffContract {
    /// The schema version contracts are stamped with when none is given.
    pub const DEFAULT_SCHEMA_VERSION: (u64, u64, u64) = (1, 0, 0);

    /// Build a fresh contract in `CREATED` state.
    pub fn new(
        from_agent: AgentId,
        to_agent: AgentId,
        capability_id: CapabilityId,
        expected_output: ExpectedOutput,
        request: Message,
    ) -> Self {
        let (major, minor, patch) = Self::DEFAULT_SCHEMA_VERSION;
        Self {
            id: HandoffId::new(),
            schema_version: Version::new(major, minor, patch),
            from_agent,
            to_agent,
            capability_id,
            expected_output,
            status: HandoffStatus::Created,
            created_at: Utc::now(),
            correlation_id: CorrelationId::generate(),
            request,
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_schema_version(mut self, version: Version) -> Self {
        self.schema_version = version;
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }
}

/// One observed lifecycle step of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: HandoffStatus,
    pub to: HandoffStatus,
    pub at: DateTime<Utc>,
    /// Delivery attempt the contract was on when the step happened (1-based).
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Everything a caller needs to diagnose a dead-lettered contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterReport {
    pub handoff_id: HandoffId,
    pub reason: String,
    /// Full transition history, oldest first, ending in `DEAD_LETTER`.
    pub history: Vec<Transition>,
    /// The gate decision that triggered the dead-letter, when there was one.
    pub gate: Option<GateResult>,
}
