//! Triage reference scenarios.
//!
//! Each scenario builds its own `TriageRuntime`, drives real BATON
//! components with mock incident data, and returns an `Outcome` that the
//! tests assert on. `run_scenario` prints the same run for the demo CLI.

pub mod capability_lookup;
pub mod incident_pipeline;
pub mod incomplete_diagnosis;
pub mod timeout_race;
