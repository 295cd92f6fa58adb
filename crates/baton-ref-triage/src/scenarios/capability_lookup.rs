//! Scenario B: Capability Lookup
//!
//! Before delegating a refactor, the triage agent asks which capability
//! fits "replace regex parsing" in a refactoring context. The catalog is
//! published into the knowledge store first, so the lookup can also be
//! answered from records.
//!
//! Expected ranking:
//!   1. refactor.structured-output  (tagged trigger, context matched)
//!   2. parse.regex-extract         (plain trigger)
//!   parse.auto-grammar is filtered out by the 0.5 confidence floor.

use baton_contracts::{
    error::BatonResult,
    record::{keys, Record},
};
use baton_discovery::{publish, published, DiscoveryMatch};

use crate::runtime::TriageRuntime;

pub const QUERY: &str = "replace regex parsing";
pub const CONTEXT: &str = "refactoring";
pub const MIN_CONFIDENCE: f64 = 0.5;

#[derive(Debug)]
pub struct Outcome {
    pub matches: Vec<DiscoveryMatch>,
    /// Capability records published for the catalog version.
    pub published: usize,
    /// Published records in the `refactoring` category.
    pub refactoring: Vec<Record>,
    /// `(kind, target)` relations of the top match.
    pub top_relations: Vec<(String, String)>,
}

pub fn run(rt: &TriageRuntime) -> BatonResult<Outcome> {
    let ids = publish(&rt.catalog, rt.store.as_ref(), None)?;
    let matches = rt.catalog.discover(QUERY, Some(CONTEXT), MIN_CONFIDENCE);

    let top_relations = matches
        .first()
        .map(|m| {
            rt.catalog
                .relations_from(&m.capability_id.0)
                .into_iter()
                .map(|(kind, to)| (kind.to_string(), to.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Ok(Outcome {
        matches,
        published: ids.len(),
        refactoring: published(&rt.store, rt.catalog.version(), Some(CONTEXT))?,
        top_relations,
    })
}

/// Run Scenario B and print each step.
pub fn run_scenario() -> BatonResult<()> {
    println!("=== Scenario B: Capability Lookup ===");
    println!();

    let rt = TriageRuntime::new()?;
    let outcome = run(&rt)?;

    println!(
        "  Catalog {} published: {} capability records",
        rt.catalog.version(),
        outcome.published
    );
    println!("  Query:   \"{QUERY}\" (context: {CONTEXT}, min confidence {MIN_CONFIDENCE})");
    println!();
    for (rank, m) in outcome.matches.iter().enumerate() {
        println!(
            "  {}. {:<28} confidence {:.2}  {:?}/{:?}  via \"{}\"",
            rank + 1,
            m.capability_id,
            m.confidence,
            m.match_kind,
            m.context_match,
            m.trigger
        );
    }
    if let Some(top) = outcome.matches.first() {
        println!();
        println!("  Relations of {}:", top.capability_id);
        for (kind, to) in &outcome.top_relations {
            println!("    {kind} -> {to}");
        }
    }
    println!();
    println!("  Refactoring capabilities in the store:");
    for record in &outcome.refactoring {
        if let Some(id) = record.attribute(keys::CAPABILITY_ID) {
            println!("    {id}");
        }
    }
    println!();
    println!("  Scenario B complete.");
    println!();
    Ok(())
}
