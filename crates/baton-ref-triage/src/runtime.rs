//! Wires the BATON components into one triage runtime.
//!
//! The store is created once and handed to every component that writes
//! records. Time comes from a `ManualClock` so timeout behaviour is
//! reproducible run to run.

use std::sync::Arc;

use baton_contracts::{
    content::{Message, Part},
    error::BatonResult,
    expected::ExpectedOutput,
    handoff::HandoffContract,
    ids::{AgentId, CapabilityId, CorrelationId, HandoffId},
};
use baton_core::{
    clock::{ManualClock, MonotonicClock},
    traits::RecordSink,
    HandoffManager, ManagerConfig,
};
use baton_discovery::{Catalog, InsightQuerier};
use baton_gate::GateEvaluator;
use baton_registry::ContractRegistry;
use baton_store::KnowledgeStore;
use baton_verify::ExpectedOutputVerifier;

use crate::mock_data::{root_cause_schema, Incident};

pub const MANAGER_CONFIG: &str = include_str!("../config/manager.toml");
pub const TRIAGE_POLICY: &str = include_str!("../policies/triage.toml");
pub const CAPABILITY_MANIFEST: &str = include_str!("../manifests/capabilities.toml");

pub const TRIAGE_AGENT: &str = "triage-agent";
pub const DIAGNOSIS_AGENT: &str = "diagnosis-agent";
pub const ROOT_CAUSE_ANALYSIS: &str = "root_cause_analysis";
/// Marker the diagnosis agent ends a finished analysis with.
pub const COMPLETION_MARKER: &str = "ANALYSIS COMPLETE";
/// Boundary at which the triage policy is evaluated.
pub const PRE_CLOSE_BOUNDARY: &str = "pre-close";

pub struct TriageRuntime {
    pub store: Arc<KnowledgeStore>,
    pub clock: Arc<ManualClock>,
    pub manager: HandoffManager,
    pub gate: GateEvaluator,
    pub catalog: Catalog,
    pub insights: InsightQuerier,
}

impl TriageRuntime {
    pub fn new() -> BatonResult<Self> {
        Self::with_config(ManagerConfig::from_toml_str(MANAGER_CONFIG)?)
    }

    pub fn with_config(config: ManagerConfig) -> BatonResult<Self> {
        let store = Arc::new(KnowledgeStore::new());
        let clock = Arc::new(ManualClock::new());

        let registry = ContractRegistry::with_builtin()?;
        let mut verifier = ExpectedOutputVerifier::new();
        verifier.register_output_schema(ROOT_CAUSE_ANALYSIS, &root_cause_schema())?;

        let sink: Arc<dyn RecordSink> = store.clone();
        let time: Arc<dyn MonotonicClock> = clock.clone();
        let manager = HandoffManager::new(config, Box::new(registry), Box::new(verifier), sink, time)?;

        Ok(Self {
            insights: InsightQuerier::new(Arc::clone(&store)),
            store,
            clock,
            manager,
            gate: GateEvaluator::from_toml_str(TRIAGE_POLICY)?,
            catalog: Catalog::from_toml_str(CAPABILITY_MANIFEST)?,
        })
    }

    /// The contract the triage agent sends the diagnosis agent for `incident`.
    pub fn diagnosis_contract(&self, incident: &Incident) -> BatonResult<HandoffContract> {
        let expected = ExpectedOutput::typed(ROOT_CAUSE_ANALYSIS, ["root_cause", "severity"])?
            .with_max_lines(40)
            .with_marker(COMPLETION_MARKER);
        let request = Message::new(
            AgentId::new(TRIAGE_AGENT),
            vec![
                Part::text(format!("{} on {}: {}", incident.id, incident.service, incident.symptom)),
                Part::trace_ref(incident.trace_id, None),
            ],
        )?;

        Ok(HandoffContract::new(
            AgentId::new(TRIAGE_AGENT),
            AgentId::new(DIAGNOSIS_AGENT),
            CapabilityId::new("diagnose.root-cause"),
            expected,
            request,
        )
        .with_correlation_id(CorrelationId(incident.id.to_string())))
    }

    /// Register, send, acknowledge, and accept a contract.
    pub fn deliver(&self, contract: HandoffContract) -> BatonResult<HandoffId> {
        let id = self.manager.create(contract)?;
        self.manager.send(id)?;
        self.manager.acknowledge(id)?;
        self.manager.accept(id)?;
        Ok(id)
    }

    /// The diagnosis agent's reply: the analysis as JSON plus the marker line.
    pub fn diagnosis_output(&self, payload: serde_json::Value) -> BatonResult<Message> {
        Message::new(
            AgentId::new(DIAGNOSIS_AGENT),
            vec![Part::json(payload), Part::text(COMPLETION_MARKER)],
        )
    }
}

#[cfg(test)]
mod tests {
    use baton_contracts::handoff::HandoffStatus;

    use super::*;
    use crate::mock_data::INCIDENTS;

    #[test]
    fn embedded_configuration_loads() {
        let rt = TriageRuntime::new().unwrap();
        assert_eq!(rt.manager.config().max_attempts, 3);
        assert_eq!(rt.gate.policy().id, "triage-completion");
        assert_eq!(rt.catalog.version(), "2026.10");
        assert!(rt.store.is_empty().unwrap());
    }

    #[test]
    fn deliver_reaches_accepted_with_one_record_per_step() {
        let rt = TriageRuntime::new().unwrap();
        let contract = rt.diagnosis_contract(&INCIDENTS[0]).unwrap();
        let id = rt.deliver(contract).unwrap();

        assert_eq!(rt.manager.status(id).unwrap(), HandoffStatus::Accepted);
        // Root record plus SENT, RECEIVED, ACCEPTED transitions.
        assert_eq!(rt.store.len().unwrap(), 4);
        let root = rt.manager.record_id(id).unwrap();
        assert_eq!(rt.store.children(root).unwrap().len(), 3);
    }
}
