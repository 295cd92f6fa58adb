//! # baton-registry
//!
//! Versioned handoff contract schemas.
//!
//! A `ContractSchema` lists the top-level fields a contract may carry. The
//! `ContractRegistry` keys schemas by semantic version, compiles each into a
//! JSON Schema document at registration time, and validates contracts
//! against the version they are stamped with. It implements
//! `baton_core::traits::ContractValidator`, so the handoff manager can refuse
//! to send a malformed contract.

pub mod registry;
pub mod schema;

pub use registry::ContractRegistry;
pub use schema::{ContractSchema, FieldSpec, FieldType};
