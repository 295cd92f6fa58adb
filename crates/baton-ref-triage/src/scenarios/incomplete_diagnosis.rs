//! Scenario A: Incomplete Diagnosis
//!
//! The diagnosis agent accepts the handoff but replies without a `severity`.
//! Output validation fails, the contract is dead-lettered, and a failing
//! gate record lands under the handoff in the knowledge store.
//!
//! Pipeline walk-through for the demo run:
//!   1. Contract requires `root_cause` and `severity`
//!   2. CREATED → SENT → RECEIVED → ACCEPTED
//!   3. Producer submits an analysis missing `severity`
//!   4. Validation fails → ACCEPTED → DEAD_LETTER, gate decision `fail`
//!   5. The failing gate is found again through a hierarchy query

use baton_contracts::{
    error::{BatonError, BatonResult},
    gate::GateResult,
    handoff::{DeadLetterReport, HandoffStatus},
    ids::HandoffId,
    record::{Record, TimeRange},
};

use crate::{
    mock_data::{incident, partial_diagnosis, INCIDENTS},
    runtime::TriageRuntime,
};

#[derive(Debug)]
pub struct Outcome {
    pub handoff_id: HandoffId,
    pub final_status: HandoffStatus,
    /// `None` only if the incomplete output was wrongly accepted.
    pub dead_letter: Option<DeadLetterReport>,
    /// The completion gate, when the output was accepted instead.
    pub accepted_gate: Option<GateResult>,
    /// Failing gate records found under the handoff's root record.
    pub failing_gates: Vec<Record>,
}

pub fn run(rt: &TriageRuntime) -> BatonResult<Outcome> {
    let inc = incident("INC-2041").unwrap_or(&INCIDENTS[0]);
    let contract = rt.diagnosis_contract(inc)?;
    let id = rt.deliver(contract)?;

    let output = rt.diagnosis_output(partial_diagnosis(inc))?;
    let (dead_letter, accepted_gate) = match rt.manager.submit_output(id, output) {
        Ok(gate) => (None, Some(gate)),
        Err(BatonError::DeadLetter { report }) => (Some(*report), None),
        Err(other) => return Err(other),
    };

    let root = rt.manager.record_id(id)?;
    let failing_gates = rt.store.query(
        &format!(r#"record.kind = "gate" && gate.decision = "fail" && descendant-of("{root}")"#),
        TimeRange::all(),
    )?;

    Ok(Outcome {
        handoff_id: id,
        final_status: rt.manager.status(id)?,
        dead_letter,
        accepted_gate,
        failing_gates,
    })
}

/// Run Scenario A and print each step.
pub fn run_scenario() -> BatonResult<()> {
    println!("=== Scenario A: Incomplete Diagnosis ===");
    println!();

    let rt = TriageRuntime::new()?;
    let outcome = run(&rt)?;

    println!("  Handoff:        {}", outcome.handoff_id);
    println!("  Required:       root_cause, severity");
    println!("  Submitted:      root_cause only");
    println!();

    match &outcome.dead_letter {
        Some(report) => {
            println!("  Result:         DEAD_LETTER ({})", report.reason);
            if let Some(gate) = &report.gate {
                println!(
                    "  Gate:           {} / {} (rule: {}, next: {})",
                    gate.decision,
                    gate.severity,
                    gate.failed_rule.as_deref().unwrap_or("-"),
                    gate.next_action
                );
            }
            println!("  History:");
            for step in &report.history {
                println!("    {} -> {} (attempt {})", step.from, step.to, step.attempt);
            }
        }
        None => println!("  Result:         output was accepted (status {})", outcome.final_status),
    }

    println!();
    println!("  Failing gate records under the handoff: {}", outcome.failing_gates.len());
    println!(
        "  Store integrity: {}",
        if rt.store.verify_integrity()? { "VERIFIED" } else { "FAILED" }
    );
    println!();
    println!("  Scenario A complete.");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use baton_contracts::{gate::GateDecision, record::keys};

    use super::*;

    #[test]
    fn missing_severity_dead_letters_with_failing_gate() {
        let rt = TriageRuntime::new().unwrap();
        let outcome = run(&rt).unwrap();

        assert_eq!(outcome.final_status, HandoffStatus::DeadLetter);
        assert!(outcome.accepted_gate.is_none());

        let report = outcome.dead_letter.unwrap();
        let path: Vec<_> = report.history.iter().map(|t| t.to).collect();
        assert_eq!(
            path,
            vec![
                HandoffStatus::Sent,
                HandoffStatus::Received,
                HandoffStatus::Accepted,
                HandoffStatus::DeadLetter,
            ]
        );
        let gate = report.gate.unwrap();
        assert_eq!(gate.decision, GateDecision::Fail);
        assert_eq!(gate.failed_rule.as_deref(), Some("required-field"));
        assert!(gate.reason.unwrap().contains("severity"));

        assert_eq!(outcome.failing_gates.len(), 1);
        assert_eq!(
            outcome.failing_gates[0].attribute(keys::GATE_HANDOFF_ID),
            Some(outcome.handoff_id.to_string().into())
        );
    }

    #[test]
    fn terminal_record_carries_the_contract() {
        let rt = TriageRuntime::new().unwrap();
        let outcome = run(&rt).unwrap();
        let found = rt
            .store
            .query(
                &format!(
                    r#"handoff.id = "{}" && handoff.status = "DEAD_LETTER""#,
                    outcome.handoff_id
                ),
                TimeRange::all(),
            )
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].attribute(keys::HANDOFF_CONTRACT).is_some());
        assert!(rt.store.verify_integrity().unwrap());
    }
}
