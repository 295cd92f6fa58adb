//! # baton-store
//!
//! The knowledge store: an append-only, SHA-256 chained arena of records
//! with an inverted attribute index and a small trace-query language.
//!
//! ```text
//! record.kind = "gate" && gate.decision = "fail" && descendant-of("<root id>")
//! ```
//!
//! `KnowledgeStore` implements `baton_core::traits::RecordSink`, so the
//! handoff manager and gate evaluator write into it directly.

pub mod chain;
mod eval;
pub mod index;
pub mod lexer;
pub mod parser;
pub mod store;

pub use chain::{hash_record, verify_chain, GENESIS_HASH};
pub use parser::Query;
pub use store::{KnowledgeStore, StoreSnapshot};
