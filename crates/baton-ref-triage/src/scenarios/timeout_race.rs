//! Scenario C: Timeout Race
//!
//! The diagnosis agent never acknowledges. Two sweepers notice the expired
//! deadline at the same instant, and only one of them may fire the
//! `TIMEOUT`. The contract is then retried with backoff until its attempts
//! run out and it is dead-lettered.
//!
//! Timeline with the bundled config (ack 5s, 3 attempts, backoff 0.5s→4s):
//!   t=0      SENT (attempt 1)
//!   t=5s     two concurrent sweeps → one TIMEOUT
//!   …        re-send, time out, re-send, time out
//!   end      TIMEOUT (attempt 3) → DEAD_LETTER

use std::sync::Barrier;
use std::thread;

use baton_contracts::{
    error::BatonResult,
    handoff::{DeadLetterReport, HandoffStatus},
    ids::HandoffId,
    record::TimeRange,
};
use baton_core::{SweepOutcome, TransitionEvent};
use tracing::debug;

use crate::{mock_data::INCIDENTS, runtime::TriageRuntime};

#[derive(Debug)]
pub struct Outcome {
    pub handoff_id: HandoffId,
    /// Outcomes of the two racing sweeps, combined.
    pub race: Vec<SweepOutcome>,
    /// Every sweep outcome after the race, in order.
    pub retries: Vec<SweepOutcome>,
    pub dead_letter: Option<DeadLetterReport>,
    /// `TIMEOUT` transition records in the store.
    pub timeout_records: usize,
    /// Transition events seen by a subscriber.
    pub events: Vec<TransitionEvent>,
}

impl Outcome {
    pub fn timed_out(&self) -> usize {
        self.race
            .iter()
            .chain(&self.retries)
            .filter(|o| matches!(o, SweepOutcome::TimedOut { .. }))
            .count()
    }
}

pub fn run(rt: &TriageRuntime) -> BatonResult<Outcome> {
    let mut events_rx = rt.manager.subscribe();
    let contract = rt.diagnosis_contract(&INCIDENTS[1])?;
    let id = rt.manager.create(contract)?;
    rt.manager.send(id)?;

    let config = rt.manager.config().clone();
    rt.clock.advance(config.ack_timeout());

    // ── The race ─────────────────────────────────────────────────────────────
    let barrier = Barrier::new(2);
    let race = thread::scope(|s| {
        let sweepers: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    rt.manager.sweep_timeouts()
                })
            })
            .collect();
        sweepers
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect::<BatonResult<Vec<_>>>()
    })?
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    // ── Retries until dead-lettered ──────────────────────────────────────────
    // One step always covers both the longest backoff and a full ack window.
    let step = config.ack_timeout() + config.backoff(u32::MAX);
    let mut retries = Vec::new();
    let mut dead_letter = None;
    for _ in 0..config.max_attempts * 2 {
        if rt.manager.status(id)? == HandoffStatus::DeadLetter {
            break;
        }
        rt.clock.advance(step);
        for outcome in rt.manager.sweep_timeouts()? {
            debug!(?outcome, "sweep");
            if let SweepOutcome::DeadLettered { report } = &outcome {
                dead_letter = Some(report.as_ref().clone());
            }
            retries.push(outcome);
        }
    }

    let timeout_records = rt
        .store
        .query(
            &format!(r#"handoff.id = "{id}" && handoff.status = "TIMEOUT""#),
            TimeRange::all(),
        )?
        .len();

    let mut events = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        events.push(event);
    }

    Ok(Outcome {
        handoff_id: id,
        race,
        retries,
        dead_letter,
        timeout_records,
        events,
    })
}

/// Run Scenario C and print each step.
pub fn run_scenario() -> BatonResult<()> {
    println!("=== Scenario C: Timeout Race ===");
    println!();

    let rt = TriageRuntime::new()?;
    let outcome = run(&rt)?;

    println!("  Handoff:   {}", outcome.handoff_id);
    println!("  Two sweepers raced on the expired deadline:");
    for o in &outcome.race {
        println!("    {o:?}");
    }
    println!();
    println!("  Retry sweeps:");
    for o in &outcome.retries {
        match o {
            SweepOutcome::TimedOut { attempt, retry_in, .. } => {
                println!("    attempt {attempt} timed out, retry in {}ms", retry_in.as_millis());
            }
            SweepOutcome::Resent { attempt, .. } => println!("    re-sent as attempt {attempt}"),
            SweepOutcome::DeadLettered { report } => {
                println!("    dead-lettered: {}", report.reason);
            }
            SweepOutcome::Failed { reason, .. } => println!("    sweep failed: {reason}"),
        }
    }
    println!();
    println!("  TIMEOUT records in store: {}", outcome.timeout_records);
    println!("  Transition events seen:   {}", outcome.events.len());
    println!("  Scenario C complete.");
    println!();
    Ok(())
}
