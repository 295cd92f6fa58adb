//! Error types for the BATON runtime.
//!
//! All fallible operations return `BatonResult<T>`. Gate failures are not
//! errors: they are `GateResult` values with `decision = Fail`.

use thiserror::Error;

use crate::{
    capability::Maturity,
    handoff::{DeadLetterReport, HandoffStatus},
    ids::HandoffId,
};

/// The unified error type for the BATON runtime.
#[derive(Debug, Error)]
pub enum BatonError {
    /// A contract, schema, part, or output is malformed. The caller may
    /// correct the input and retry.
    #[error("schema validation error: {reason}")]
    SchemaValidation { reason: String },

    /// A part was built with a kind missing from the part type table.
    #[error("unknown part kind '{kind}'")]
    UnknownPartKind { kind: String },

    #[error("message must contain at least one part")]
    EmptyMessage,

    /// The requested edge is not part of the lifecycle graph. Never retried.
    #[error("invalid transition for handoff {handoff_id}: {from} -> {to}")]
    InvalidTransition {
        handoff_id: HandoffId,
        from: HandoffStatus,
        to: HandoffStatus,
    },

    /// The contract is waiting out a timeout; it will be re-sent automatically.
    #[error("handoff {handoff_id} timed out on attempt {attempt}")]
    Timeout { handoff_id: HandoffId, attempt: u32 },

    /// The contract reached `DEAD_LETTER`. Carries the full history.
    #[error("handoff {} dead-lettered: {}", .report.handoff_id, .report.reason)]
    DeadLetter { report: Box<DeadLetterReport> },

    #[error("cancellation not allowed for handoff {handoff_id} in status {status}")]
    CancellationNotAllowed {
        handoff_id: HandoffId,
        status: HandoffStatus,
    },

    /// A query expression was malformed. Nothing was executed.
    #[error("query error at position {position}: {reason}")]
    Query { reason: String, position: usize },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// The knowledge store could not persist a record or event.
    #[error("store write failed: {reason}")]
    StoreWrite { reason: String },

    #[error("maturity of capability '{capability_id}' cannot move from {from} to {to}")]
    MaturityRegression {
        capability_id: String,
        from: Maturity,
        to: Maturity,
    },

    #[error("duplicate capability '{capability_id}' in manifest version {version}")]
    DuplicateCapability { capability_id: String, version: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Convenience alias used throughout the BATON crates.
pub type BatonResult<T> = Result<T, BatonError>;
