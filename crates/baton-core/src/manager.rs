//! The handoff manager: the lifecycle state machine for delegation contracts.
//!
//! The manager owns every active contract and is the only code that changes a
//! contract's status. Each transition follows the same order:
//!
//!   lock contract → check edge (CAS on status) → emit record → commit → broadcast
//!
//! A record is always emitted before the in-memory state changes. If the
//! store rejects the write, the contract keeps its previous status and the
//! caller gets the store error, so no transition is ever half-applied. A
//! terminal transition that carries a gate result is emitted together with
//! its gate record through `RecordSink::emit_all`.
//!
//! Locking is per contract. The id → slot map is locked only to look up or
//! insert a slot and is never held while a transition runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use baton_contracts::{
    content::Message,
    error::{BatonError, BatonResult},
    gate::{
        GateDecision, GateResult, Severity, OUTPUT_VALIDATION_BOUNDARY, OUTPUT_VALIDATION_POLICY,
    },
    handoff::{DeadLetterReport, HandoffContract, HandoffStatus, Transition},
    ids::{HandoffId, RecordId},
    record::{keys, AttrValue, Attributes},
};

use crate::{
    clock::MonotonicClock,
    config::ManagerConfig,
    traits::{ContractValidator, OutputValidator, PendingRecord, RecordSink},
};

/// Broadcast to subscribers after every committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub handoff_id: HandoffId,
    pub from: HandoffStatus,
    pub to: HandoffStatus,
    pub attempt: u32,
    pub at: DateTime<Utc>,
}

/// A read-only copy of a contract and its lifecycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffSnapshot {
    pub contract: HandoffContract,
    pub history: Vec<Transition>,
    /// Current delivery attempt (0 before the first send).
    pub attempt: u32,
    /// How many times the contract re-entered `RECEIVED` after clarification.
    pub clarifications: u32,
    /// The output the producer submitted, if any.
    pub output: Option<Message>,
    /// The root `handoff` record in the knowledge store.
    pub record_id: RecordId,
    /// Wall-clock time of the last committed transition (or creation).
    pub updated_at: DateTime<Utc>,
}

/// What a timeout sweep did to one contract.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepOutcome {
    /// The contract timed out and will be re-sent after `retry_in`.
    TimedOut {
        handoff_id: HandoffId,
        attempt: u32,
        retry_in: Duration,
    },
    /// A timed-out contract was re-sent.
    Resent { handoff_id: HandoffId, attempt: u32 },
    /// The contract exhausted its attempts and was dead-lettered.
    DeadLettered { report: Box<DeadLetterReport> },
    /// Sweeping this contract failed. It keeps its last committed status and
    /// the next sweep picks it up again.
    Failed { handoff_id: HandoffId, reason: String },
}

struct Slot {
    contract: HandoffContract,
    history: Vec<Transition>,
    attempt: u32,
    clarifications: u32,
    /// Monotonic instant after which a `SENT`/`RECEIVED` contract times out.
    deadline: Option<Duration>,
    /// Monotonic instant after which a `TIMEOUT` contract is re-sent.
    retry_at: Option<Duration>,
    output: Option<Message>,
    record_id: RecordId,
    updated_at: DateTime<Utc>,
}

impl Slot {
    fn snapshot(&self) -> HandoffSnapshot {
        HandoffSnapshot {
            contract: self.contract.clone(),
            history: self.history.clone(),
            attempt: self.attempt,
            clarifications: self.clarifications,
            output: self.output.clone(),
            record_id: self.record_id,
            updated_at: self.updated_at,
        }
    }

    fn dead_letter_report(&self, reason: impl Into<String>, gate: Option<GateResult>) -> DeadLetterReport {
        DeadLetterReport {
            handoff_id: self.contract.id,
            reason: reason.into(),
            history: self.history.clone(),
            gate,
        }
    }
}

/// Drives handoff contracts through their lifecycle.
///
/// Safe to share across threads (`Arc<HandoffManager>`). Operations on
/// different contracts never contend; operations on the same contract are
/// serialized by that contract's mutex.
pub struct HandoffManager {
    config: ManagerConfig,
    registry: Box<dyn ContractValidator>,
    validator: Box<dyn OutputValidator>,
    sink: Arc<dyn RecordSink>,
    clock: Arc<dyn MonotonicClock>,
    slots: RwLock<HashMap<HandoffId, Arc<Mutex<Slot>>>>,
    events: broadcast::Sender<TransitionEvent>,
}

impl HandoffManager {
    /// Create a manager with the given collaborators.
    ///
    /// Fails with `Config` if `config` does not validate.
    pub fn new(
        config: ManagerConfig,
        registry: Box<dyn ContractValidator>,
        validator: Box<dyn OutputValidator>,
        sink: Arc<dyn RecordSink>,
        clock: Arc<dyn MonotonicClock>,
    ) -> BatonResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        Ok(Self {
            config,
            registry,
            validator,
            sink,
            clock,
            slots: RwLock::new(HashMap::new()),
            events,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Receive every committed transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.events.subscribe()
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Register a new contract in `CREATED` and emit its root `handoff` record.
    pub fn create(&self, contract: HandoffContract) -> BatonResult<HandoffId> {
        self.create_with_parent(contract, None)
    }

    /// Like `create`, but parents the handoff record under `parent`
    /// (e.g. the record of the handoff this one is a subtask of).
    pub fn create_with_parent(
        &self,
        contract: HandoffContract,
        parent: Option<RecordId>,
    ) -> BatonResult<HandoffId> {
        if contract.status != HandoffStatus::Created {
            return Err(BatonError::SchemaValidation {
                reason: format!(
                    "new contracts must be in CREATED, got {}",
                    contract.status
                ),
            });
        }

        let id = contract.id;
        let mut slots = self.slots.write().map_err(|_| lock_poisoned("handoff map"))?;
        if slots.contains_key(&id) {
            return Err(BatonError::SchemaValidation {
                reason: format!("handoff {id} is already registered"),
            });
        }

        let mut attrs = contract_attributes(&contract);
        attrs.insert(keys::HANDOFF_STATUS.into(), contract.status.as_str().into());
        let record_id = self.sink.emit(keys::KIND_HANDOFF, attrs, parent)?;

        info!(
            handoff_id = %id,
            from_agent = %contract.from_agent,
            to_agent = %contract.to_agent,
            capability_id = %contract.capability_id,
            "handoff created"
        );

        let updated_at = contract.created_at;
        slots.insert(
            id,
            Arc::new(Mutex::new(Slot {
                contract,
                history: Vec::new(),
                attempt: 0,
                clarifications: 0,
                deadline: None,
                retry_at: None,
                output: None,
                record_id,
                updated_at,
            })),
        );
        Ok(id)
    }

    // ── Sender-side transitions ──────────────────────────────────────────────

    /// `CREATED → SENT`. The contract must pass schema validation first; on
    /// failure it stays in `CREATED` and the caller may correct and resend.
    pub fn send(&self, id: HandoffId) -> BatonResult<Transition> {
        let slot = self.slot(id)?;
        let mut slot = lock(&slot)?;
        expect_status(&slot, &[HandoffStatus::Created], HandoffStatus::Sent)?;

        if let Err(e) = self.registry.validate(&slot.contract) {
            warn!(handoff_id = %id, error = %e, "contract failed schema validation, not sent");
            return Err(e);
        }

        let attempt = slot.attempt.max(1);
        slot.attempt = attempt;
        let transition = self.apply(&mut slot, HandoffStatus::Sent, None, Attributes::new())?;
        slot.deadline = Some(self.clock.now() + self.config.ack_timeout());
        Ok(transition)
    }

    /// Cancel a contract that has not been received yet.
    ///
    /// Only `CREATED` and `SENT` contracts can be cancelled; any other status
    /// fails with `CancellationNotAllowed`.
    pub fn cancel(&self, id: HandoffId, reason: impl Into<String>) -> BatonResult<Transition> {
        let slot = self.slot(id)?;
        let mut slot = lock(&slot)?;
        let status = slot.contract.status;
        if !matches!(status, HandoffStatus::Created | HandoffStatus::Sent) {
            return Err(BatonError::CancellationNotAllowed {
                handoff_id: id,
                status,
            });
        }
        let transition =
            self.apply(&mut slot, HandoffStatus::Cancelled, Some(reason.into()), Attributes::new())?;
        slot.deadline = None;
        Ok(transition)
    }

    /// `INPUT_REQUIRED → RECEIVED` once the requester answers.
    pub fn supply_clarification(&self, id: HandoffId, answer: Message) -> BatonResult<Transition> {
        let slot = self.slot(id)?;
        let mut slot = lock(&slot)?;
        expect_status(&slot, &[HandoffStatus::InputRequired], HandoffStatus::Received)?;

        let mut extra = Attributes::new();
        extra.insert("handoff.clarification".into(), answer.rendered().into());
        let transition = self.apply(&mut slot, HandoffStatus::Received, None, extra)?;
        slot.clarifications += 1;
        slot.deadline = Some(self.clock.now() + self.config.decision_timeout());
        Ok(transition)
    }

    // ── Receiver-side transitions ────────────────────────────────────────────

    /// `SENT → RECEIVED`. A late acknowledgment for a contract waiting out a
    /// timeout fails with `Timeout`; the contract will be re-sent.
    pub fn acknowledge(&self, id: HandoffId) -> BatonResult<Transition> {
        let slot = self.slot(id)?;
        let mut slot = lock(&slot)?;
        if slot.contract.status == HandoffStatus::Timeout {
            return Err(BatonError::Timeout {
                handoff_id: id,
                attempt: slot.attempt,
            });
        }
        expect_status(&slot, &[HandoffStatus::Sent], HandoffStatus::Received)?;

        let transition = self.apply(&mut slot, HandoffStatus::Received, None, Attributes::new())?;
        slot.deadline = Some(self.clock.now() + self.config.decision_timeout());
        Ok(transition)
    }

    /// `RECEIVED → INPUT_REQUIRED`.
    ///
    /// Once the contract has re-entered `RECEIVED` `max_clarifications` times,
    /// another request forces it to `DEAD_LETTER` and returns `DeadLetter`.
    pub fn request_input(&self, id: HandoffId, question: impl Into<String>) -> BatonResult<Transition> {
        let slot = self.slot(id)?;
        let mut slot = lock(&slot)?;
        expect_status(&slot, &[HandoffStatus::Received], HandoffStatus::InputRequired)?;

        if slot.clarifications >= self.config.max_clarifications {
            let reason = format!(
                "clarification retries exhausted after {} rounds",
                slot.clarifications
            );
            self.apply(&mut slot, HandoffStatus::DeadLetter, Some(reason.clone()), Attributes::new())?;
            slot.deadline = None;
            warn!(handoff_id = %id, %reason, "handoff dead-lettered");
            return Err(BatonError::DeadLetter {
                report: Box::new(slot.dead_letter_report(reason, None)),
            });
        }

        let transition =
            self.apply(&mut slot, HandoffStatus::InputRequired, Some(question.into()), Attributes::new())?;
        slot.deadline = None;
        Ok(transition)
    }

    /// `RECEIVED → ACCEPTED`.
    pub fn accept(&self, id: HandoffId) -> BatonResult<Transition> {
        let slot = self.slot(id)?;
        let mut slot = lock(&slot)?;
        expect_status(&slot, &[HandoffStatus::Received], HandoffStatus::Accepted)?;
        let transition = self.apply(&mut slot, HandoffStatus::Accepted, None, Attributes::new())?;
        slot.deadline = None;
        Ok(transition)
    }

    /// `RECEIVED → REJECTED`. Terminal.
    pub fn reject(&self, id: HandoffId, reason: impl Into<String>) -> BatonResult<Transition> {
        let slot = self.slot(id)?;
        let mut slot = lock(&slot)?;
        expect_status(&slot, &[HandoffStatus::Received], HandoffStatus::Rejected)?;
        let transition =
            self.apply(&mut slot, HandoffStatus::Rejected, Some(reason.into()), Attributes::new())?;
        slot.deadline = None;
        Ok(transition)
    }

    /// Submit the producer's output for an `ACCEPTED` contract.
    ///
    /// # Outcomes
    ///
    /// - Output satisfies `ExpectedOutput` → `COMPLETED`; returns the passing
    ///   `GateResult` for the `output-validation` boundary.
    /// - Output fails validation → a failing `GateResult` is recorded, the
    ///   contract is forced to `DEAD_LETTER`, and `DeadLetter` is returned
    ///   carrying the history and that gate result.
    ///
    /// Either way exactly one gate record is emitted, parented to the
    /// handoff's root record, in the same batch as the terminal transition.
    /// If the store rejects the batch the contract stays `ACCEPTED` with no
    /// output recorded. The `handoff.output_submitted` event is appended
    /// after the commit; a failure there is logged and does not undo it.
    pub fn submit_output(&self, id: HandoffId, output: Message) -> BatonResult<GateResult> {
        let slot = self.slot(id)?;
        let mut slot = lock(&slot)?;
        expect_status(&slot, &[HandoffStatus::Accepted], HandoffStatus::Completed)?;

        let report = self
            .validator
            .validate(&output, &slot.contract.expected_output)?;
        let summary = (!report.passed).then(|| report.summary());
        let (to, note) = match &summary {
            None => (HandoffStatus::Completed, None),
            Some(summary) => (
                HandoffStatus::DeadLetter,
                Some(format!("output validation failed: {summary}")),
            ),
        };

        let (transition, attrs) = self.prepare(&slot, to, note, Attributes::new())?;
        let gate = GateResult {
            handoff_id: id,
            boundary: OUTPUT_VALIDATION_BOUNDARY.to_string(),
            policy_id: OUTPUT_VALIDATION_POLICY.to_string(),
            policy_version: slot.contract.schema_version.to_string(),
            decision: if report.passed { GateDecision::Pass } else { GateDecision::Fail },
            severity: if report.passed { Severity::Info } else { Severity::High },
            next_action: if report.passed { "none" } else { "retry" }.to_string(),
            failed_rule: report.failures.first().map(|f| f.check.clone()),
            reason: summary.clone(),
            evaluated_at: transition.at,
        };
        self.sink.emit_all(vec![
            PendingRecord::new(keys::KIND_TRANSITION, attrs, Some(slot.record_id)),
            PendingRecord::new(keys::KIND_GATE, gate_attributes(&gate), Some(slot.record_id)),
        ])?;
        self.commit(&mut slot, transition);
        slot.deadline = None;

        let mut event_attrs = Attributes::new();
        event_attrs.insert("output.sender".into(), output.sender.to_string().into());
        event_attrs.insert("output.parts".into(), AttrValue::Int(output.parts().len() as i64));
        event_attrs.insert("output.passed".into(), report.passed.into());
        slot.output = Some(output);
        if let Err(e) = self
            .sink
            .append_event(slot.record_id, "handoff.output_submitted", event_attrs)
        {
            warn!(handoff_id = %id, error = %e, "failed to append output event");
        }

        let Some(summary) = summary else {
            info!(handoff_id = %id, "handoff completed");
            return Ok(gate);
        };
        warn!(handoff_id = %id, failures = %summary, "output validation failed, handoff dead-lettered");
        Err(BatonError::DeadLetter {
            report: Box::new(slot.dead_letter_report(
                format!("output validation failed: {summary}"),
                Some(gate),
            )),
        })
    }

    // ── Timeout handling ─────────────────────────────────────────────────────

    /// Check every in-flight contract for an expired deadline or a due retry.
    ///
    /// Safe to call from several threads at once: each contract is inspected
    /// under its own mutex, so a deadline fires exactly one `TIMEOUT` no
    /// matter how many sweeps race on it.
    pub fn sweep_timeouts(&self) -> BatonResult<Vec<SweepOutcome>> {
        let slots: Vec<Arc<Mutex<Slot>>> = {
            let map = self.slots.read().map_err(|_| lock_poisoned("handoff map"))?;
            map.values().cloned().collect()
        };

        let mut outcomes = Vec::new();
        for slot in slots {
            let mut slot = lock(&slot)?;
            match self.sweep_one(&mut slot) {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(e) => {
                    let handoff_id = slot.contract.id;
                    warn!(handoff_id = %handoff_id, status = %slot.contract.status, error = %e, "timeout sweep failed");
                    outcomes.push(SweepOutcome::Failed {
                        handoff_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(outcomes)
    }

    fn sweep_one(&self, slot: &mut Slot) -> BatonResult<Option<SweepOutcome>> {
        let now = self.clock.now();
        let id = slot.contract.id;
        let status = slot.contract.status;

        if status.is_awaiting_peer() && slot.deadline.is_some_and(|d| now >= d) {
            let attempt = slot.attempt;
            self.apply(slot, HandoffStatus::Timeout, None, Attributes::new())?;
            slot.deadline = None;

            if attempt >= self.config.max_attempts {
                slot.retry_at = None;
                return self.dead_letter_exhausted(slot).map(Some);
            }

            let retry_in = self.config.backoff(attempt.saturating_sub(1));
            slot.retry_at = Some(now + retry_in);
            info!(handoff_id = %id, attempt, retry_in_ms = retry_in.as_millis() as u64, "handoff timed out");
            return Ok(Some(SweepOutcome::TimedOut {
                handoff_id: id,
                attempt,
                retry_in,
            }));
        }

        // A timed-out contract with no attempts left whose dead-letter
        // record was not written yet.
        if status == HandoffStatus::Timeout && slot.attempt >= self.config.max_attempts {
            return self.dead_letter_exhausted(slot).map(Some);
        }

        if status == HandoffStatus::Timeout && slot.retry_at.is_some_and(|r| now >= r) {
            let previous = slot.attempt;
            slot.attempt = previous + 1;
            if let Err(e) = self.apply(slot, HandoffStatus::Sent, Some("retry".to_string()), Attributes::new()) {
                slot.attempt = previous;
                return Err(e);
            }
            slot.retry_at = None;
            slot.deadline = Some(now + self.config.ack_timeout());
            debug!(handoff_id = %id, attempt = slot.attempt, "handoff re-sent");
            return Ok(Some(SweepOutcome::Resent {
                handoff_id: id,
                attempt: slot.attempt,
            }));
        }

        Ok(None)
    }

    fn dead_letter_exhausted(&self, slot: &mut Slot) -> BatonResult<SweepOutcome> {
        let attempt = slot.attempt;
        let reason = format!("delivery attempts exhausted after {attempt} attempts");
        self.apply(slot, HandoffStatus::DeadLetter, Some(reason.clone()), Attributes::new())?;
        slot.retry_at = None;
        warn!(handoff_id = %slot.contract.id, attempt, "handoff dead-lettered after timeouts");
        Ok(SweepOutcome::DeadLettered {
            report: Box::new(slot.dead_letter_report(reason, None)),
        })
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn status(&self, id: HandoffId) -> BatonResult<HandoffStatus> {
        let slot = self.slot(id)?;
        let slot = lock(&slot)?;
        Ok(slot.contract.status)
    }

    pub fn snapshot(&self, id: HandoffId) -> BatonResult<HandoffSnapshot> {
        let slot = self.slot(id)?;
        let slot = lock(&slot)?;
        Ok(slot.snapshot())
    }

    pub fn history(&self, id: HandoffId) -> BatonResult<Vec<Transition>> {
        let slot = self.slot(id)?;
        let slot = lock(&slot)?;
        Ok(slot.history.clone())
    }

    /// The root `handoff` record of a contract.
    pub fn record_id(&self, id: HandoffId) -> BatonResult<RecordId> {
        let slot = self.slot(id)?;
        let slot = lock(&slot)?;
        Ok(slot.record_id)
    }

    /// Ids of all contracts not yet in a terminal state.
    pub fn in_flight(&self) -> BatonResult<Vec<HandoffId>> {
        let slots: Vec<Arc<Mutex<Slot>>> = {
            let map = self.slots.read().map_err(|_| lock_poisoned("handoff map"))?;
            map.values().cloned().collect()
        };
        let mut ids = Vec::new();
        for slot in slots {
            let slot = lock(&slot)?;
            if !slot.contract.status.is_terminal() {
                ids.push(slot.contract.id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn slot(&self, id: HandoffId) -> BatonResult<Arc<Mutex<Slot>>> {
        let map = self.slots.read().map_err(|_| lock_poisoned("handoff map"))?;
        map.get(&id).cloned().ok_or_else(|| BatonError::NotFound {
            entity: "handoff",
            id: id.to_string(),
        })
    }

    /// Apply one edge: check it, emit the transition record, then commit.
    fn apply(
        &self,
        slot: &mut Slot,
        to: HandoffStatus,
        note: Option<String>,
        extra: Attributes,
    ) -> BatonResult<Transition> {
        let (transition, attrs) = self.prepare(slot, to, note, extra)?;
        self.sink
            .emit(keys::KIND_TRANSITION, attrs, Some(slot.record_id))?;
        Ok(self.commit(slot, transition))
    }

    /// Check an edge and build its transition and record attributes without
    /// touching the slot.
    fn prepare(
        &self,
        slot: &Slot,
        to: HandoffStatus,
        note: Option<String>,
        extra: Attributes,
    ) -> BatonResult<(Transition, Attributes)> {
        let from = slot.contract.status;
        let id = slot.contract.id;
        if !from.can_transition_to(to) {
            return Err(BatonError::InvalidTransition {
                handoff_id: id,
                from,
                to,
            });
        }

        let transition = Transition {
            from,
            to,
            at: Utc::now(),
            attempt: slot.attempt,
            note,
        };

        let mut attrs = extra;
        attrs.insert(keys::HANDOFF_ID.into(), id.to_string().into());
        attrs.insert(keys::HANDOFF_STATUS.into(), to.as_str().into());
        attrs.insert(keys::HANDOFF_FROM_STATUS.into(), from.as_str().into());
        attrs.insert(keys::HANDOFF_ATTEMPT.into(), transition.attempt.into());
        attrs.insert(
            keys::HANDOFF_CORRELATION_ID.into(),
            slot.contract.correlation_id.to_string().into(),
        );
        if let Some(note) = &transition.note {
            attrs.insert(keys::HANDOFF_NOTE.into(), note.clone().into());
        }
        if to.is_terminal() {
            let mut terminal = slot.contract.clone();
            terminal.status = to;
            let json = serde_json::to_string(&terminal).map_err(|e| BatonError::StoreWrite {
                reason: format!("failed to serialize terminal contract: {e}"),
            })?;
            attrs.insert(keys::HANDOFF_CONTRACT.into(), json.into());
        }
        Ok((transition, attrs))
    }

    /// Commit a transition whose record is already in the store.
    fn commit(&self, slot: &mut Slot, transition: Transition) -> Transition {
        let id = slot.contract.id;
        slot.contract.status = transition.to;
        slot.updated_at = transition.at;
        slot.history.push(transition.clone());

        debug!(
            handoff_id = %id,
            from = %transition.from,
            to = %transition.to,
            attempt = transition.attempt,
            "handoff transition committed"
        );

        // No subscribers is not an error.
        let _ = self.events.send(TransitionEvent {
            handoff_id: id,
            from: transition.from,
            to: transition.to,
            attempt: transition.attempt,
            at: transition.at,
        });

        transition
    }
}

/// Static attributes of a contract, written on its root record.
fn contract_attributes(contract: &HandoffContract) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(keys::HANDOFF_ID.into(), contract.id.to_string().into());
    attrs.insert(keys::HANDOFF_FROM_AGENT.into(), contract.from_agent.to_string().into());
    attrs.insert(keys::HANDOFF_TO_AGENT.into(), contract.to_agent.to_string().into());
    attrs.insert(
        keys::HANDOFF_CAPABILITY_ID.into(),
        contract.capability_id.to_string().into(),
    );
    attrs.insert(
        keys::HANDOFF_CORRELATION_ID.into(),
        contract.correlation_id.to_string().into(),
    );
    attrs.insert(
        keys::HANDOFF_SCHEMA_VERSION.into(),
        contract.schema_version.to_string().into(),
    );
    attrs
}

/// The attribute form of a gate result, shared with the gate evaluator.
pub fn gate_attributes(gate: &GateResult) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(keys::GATE_HANDOFF_ID.into(), gate.handoff_id.to_string().into());
    attrs.insert(keys::GATE_BOUNDARY.into(), gate.boundary.clone().into());
    attrs.insert(keys::GATE_POLICY_ID.into(), gate.policy_id.clone().into());
    attrs.insert(keys::GATE_POLICY_VERSION.into(), gate.policy_version.clone().into());
    attrs.insert(keys::GATE_DECISION.into(), gate.decision.as_str().into());
    attrs.insert(keys::GATE_SEVERITY.into(), gate.severity.as_str().into());
    attrs.insert(keys::GATE_NEXT_ACTION.into(), gate.next_action.clone().into());
    if let Some(rule) = &gate.failed_rule {
        attrs.insert(keys::GATE_FAILED_RULE.into(), rule.clone().into());
    }
    if let Some(reason) = &gate.reason {
        attrs.insert(keys::GATE_REASON.into(), reason.clone().into());
    }
    attrs
}

fn expect_status(slot: &Slot, allowed: &[HandoffStatus], to: HandoffStatus) -> BatonResult<()> {
    let from = slot.contract.status;
    if allowed.contains(&from) {
        Ok(())
    } else {
        Err(BatonError::InvalidTransition {
            handoff_id: slot.contract.id,
            from,
            to,
        })
    }
}

fn lock(slot: &Mutex<Slot>) -> BatonResult<MutexGuard<'_, Slot>> {
    slot.lock().map_err(|_| lock_poisoned("handoff slot"))
}

fn lock_poisoned(what: &str) -> BatonError {
    BatonError::StoreWrite {
        reason: format!("{what} lock poisoned"),
    }
}
