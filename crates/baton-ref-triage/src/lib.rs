//! # baton-ref-triage
//!
//! Incident-triage reference runtime for the BATON handoff protocol.
//!
//! A triage agent delegates root cause analysis to a diagnosis agent over
//! handoff contracts. Every step lands in one knowledge store:
//!
//! 1. **Incomplete Diagnosis**: output missing a required field is
//!    dead-lettered with a failing gate.
//! 2. **Capability Lookup**: trigger-based discovery over a published
//!    capability catalog.
//! 3. **Timeout Race**: concurrent timeout sweeps, retry with backoff,
//!    dead-letter on exhaustion.
//! 4. **Incident Pipeline**: clarification, output validation, a policy
//!    gate before close, and a recorded insight.
//!
//! All incident data is hardcoded and fictional. Time is simulated.

pub mod mock_data;
pub mod runtime;
pub mod scenarios;

pub use runtime::TriageRuntime;
