//! # baton-verify
//!
//! Output validation at the producer-submission boundary.
//!
//! `ExpectedOutputVerifier` implements `baton_core::traits::OutputValidator`
//! and is what the handoff manager runs when a producer submits its output.

pub mod engine;

pub use engine::ExpectedOutputVerifier;
