//! # baton-gate
//!
//! Governance gates at handoff boundaries.
//!
//! A `GatePolicy` is an ordered list of rules loaded from TOML. The
//! `GateEvaluator` checks a `GateSubject` (a handoff snapshot plus flat
//! attributes) against every rule and returns a `GateResult`. A failing gate
//! is a value, never an error.

pub mod engine;
pub mod rule;

pub use engine::{GateEvaluator, GateSubject};
pub use rule::{GatePolicy, GateRule, RuleCheck, RuleDecision};
