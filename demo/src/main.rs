//! BATON Incident-Triage Reference Runtime: Demo CLI
//!
//! Runs one or all of the triage scenarios. Each scenario wires the real
//! handoff manager, validators, gate evaluator and knowledge store together
//! with mock incident data.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- incomplete-diagnosis
//!   cargo run -p demo -- capability-lookup
//!   cargo run -p demo -- timeout-race
//!   cargo run -p demo -- pipeline --flush records.jsonl

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use baton_contracts::error::BatonResult;
use baton_ref_triage::scenarios::{
    capability_lookup, incident_pipeline, incomplete_diagnosis, timeout_race,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// BATON: agent handoff protocol demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "BATON incident-triage reference runtime demo",
    long_about = "Runs BATON triage scenarios showing handoff contracts, output validation,\n\
                  policy gates, capability discovery and the knowledge store."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll {
        /// Write the pipeline's knowledge store to this file as JSON lines.
        #[arg(long)]
        flush: Option<PathBuf>,
    },
    /// Scenario A: output missing a required field is dead-lettered.
    IncompleteDiagnosis,
    /// Scenario B: capability discovery over a published catalog.
    CapabilityLookup,
    /// Scenario C: racing timeout sweeps, retries, dead-letter.
    TimeoutRace,
    /// Full pipeline: clarification, validation, pre-close gate, insight.
    Pipeline {
        /// Write the knowledge store to this file as JSON lines.
        #[arg(long)]
        flush: Option<PathBuf>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll { flush } => run_all(flush),
        Command::IncompleteDiagnosis => incomplete_diagnosis::run_scenario(),
        Command::CapabilityLookup => capability_lookup::run_scenario(),
        Command::TimeoutRace => timeout_race::run_scenario(),
        Command::Pipeline { flush } => incident_pipeline::run_scenario(flush.as_deref()),
    };

    match result {
        Ok(()) => println!("All selected scenarios completed successfully."),
        Err(e) => {
            eprintln!("Demo error: {e}");
            std::process::exit(1);
        }
    }
}

// ── Scenario dispatch ─────────────────────────────────────────────────────────

fn run_all(flush: Option<PathBuf>) -> BatonResult<()> {
    incomplete_diagnosis::run_scenario()?;
    capability_lookup::run_scenario()?;
    timeout_race::run_scenario()?;
    incident_pipeline::run_scenario(flush.as_deref())?;
    debug!("all scenarios finished");
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("BATON: Agent Handoff Protocol");
    println!("Incident-Triage Reference Demo");
    println!("==============================");
    println!();
    println!("Every handoff step:");
    println!("  [1] Contract validated against its versioned schema before SENT");
    println!("  [2] Receiver drives RECEIVED → ACCEPTED (or asks for input, or rejects)");
    println!("  [3] Output checked against the contract's ExpectedOutput");
    println!("  [4] Policy gate evaluated at the boundary, result recorded");
    println!("  [5] Each transition appended to the hash-chained knowledge store");
    println!();
}
