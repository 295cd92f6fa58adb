//! # baton-discovery
//!
//! Capability discovery and insight retrieval.
//!
//! - `CapabilityManifest`: authored catalog, loaded from TOML or JSON
//! - `Catalog`: arena of capabilities and patterns, trigger ranking
//! - `publish`: writes the catalog into the knowledge store
//! - `InsightQuerier`: records insights and reads them back by filter

pub mod catalog;
pub mod manifest;
pub mod publish;
pub mod query;
pub mod trigger;

pub use catalog::{Catalog, ContextMatch, DiscoveryMatch, MatchKind, Node};
pub use manifest::CapabilityManifest;
pub use publish::{publish, published};
pub use query::{insight_from_record, quote, InsightFilter, InsightQuerier};
pub use trigger::{normalize, NormalizedTrigger};
