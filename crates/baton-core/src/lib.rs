//! # baton-core
//!
//! The handoff lifecycle runtime for BATON agents.
//!
//! This crate provides:
//! - The trust-boundary traits (`ContractValidator`, `OutputValidator`, `RecordSink`)
//! - The `HandoffManager` that drives contracts through their lifecycle
//! - `ManagerConfig` and the monotonic clocks used for timeout detection
//!
//! ## Usage
//!
//! ```rust,ignore
//! use baton_core::{HandoffManager, ManagerConfig, clock::SystemClock};
//! ```

pub mod clock;
pub mod config;
pub mod manager;
pub mod traits;

pub use config::ManagerConfig;
pub use manager::{HandoffManager, HandoffSnapshot, SweepOutcome, TransitionEvent};
