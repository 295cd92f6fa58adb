//! Trait seams of the handoff runtime.
//!
//! The manager owns contracts but delegates everything it does not decide
//! itself:
//!
//! - `ContractValidator`: schema check before a contract is sent
//! - `OutputValidator`: checks producer output against `ExpectedOutput`
//! - `RecordSink`: the append-only knowledge store
//!
//! Implementations live in sibling crates (`baton-registry`, `baton-verify`,
//! `baton-store`) and are injected at construction.

use baton_contracts::{
    content::Message,
    error::BatonResult,
    expected::{ExpectedOutput, ValidationReport},
    handoff::HandoffContract,
    ids::RecordId,
    record::Attributes,
};

/// Validates a contract against the schema version it is stamped with.
pub trait ContractValidator: Send + Sync {
    /// Return `Err(SchemaValidation)` describing every problem found.
    fn validate(&self, contract: &HandoffContract) -> BatonResult<()>;
}

/// Checks a producer's output against the contract it answers.
///
/// Implementations must not mutate anything. A failing output is a report
/// with `passed = false`, not an error; `Err` is reserved for the validator
/// itself being unable to run.
pub trait OutputValidator: Send + Sync {
    fn validate(&self, output: &Message, expected: &ExpectedOutput) -> BatonResult<ValidationReport>;
}

/// A record waiting to be appended through `RecordSink::emit_all`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub kind: String,
    pub attributes: Attributes,
    pub parent_id: Option<RecordId>,
}

impl PendingRecord {
    pub fn new(kind: impl Into<String>, attributes: Attributes, parent_id: Option<RecordId>) -> Self {
        Self {
            kind: kind.into(),
            attributes,
            parent_id,
        }
    }
}

/// The write side of the knowledge store.
///
/// Every record written here is immutable. Events may be appended to an
/// existing record but never rewritten.
pub trait RecordSink: Send + Sync {
    /// Append a new record and return its id.
    ///
    /// Fails with `StoreWrite` if `parent_id` does not name an existing record.
    fn emit(
        &self,
        kind: &str,
        attributes: Attributes,
        parent_id: Option<RecordId>,
    ) -> BatonResult<RecordId>;

    /// Append several records as one unit, returning their ids in order.
    ///
    /// The default emits them one at a time. The knowledge store overrides
    /// it so that either every record is appended or none is.
    fn emit_all(&self, records: Vec<PendingRecord>) -> BatonResult<Vec<RecordId>> {
        records
            .into_iter()
            .map(|r| self.emit(&r.kind, r.attributes, r.parent_id))
            .collect()
    }

    /// Append an event to an existing record.
    fn append_event(&self, record_id: RecordId, name: &str, attributes: Attributes)
        -> BatonResult<()>;
}
