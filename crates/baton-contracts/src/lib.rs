//! # baton-contracts
//!
//! Shared types, attribute schema, and error taxonomy for the BATON runtime.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate beyond the invariants each type enforces on construction.

pub mod capability;
pub mod content;
pub mod error;
pub mod expected;
pub mod gate;
pub mod handoff;
pub mod ids;
pub mod insight;
pub mod record;
