//! Simulated incident data for the triage reference runtime.
//!
//! Everything here is hardcoded and fictional. It stands in for the paging
//! system, the tracing backend, and the diagnosis agent's model calls.

use serde_json::{json, Value};

/// An open incident as the triage agent first sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incident {
    pub id: &'static str,
    pub service: &'static str,
    pub symptom: &'static str,
    pub trace_id: &'static str,
}

// ── Incident feed (mock) ─────────────────────────────────────────────────────

pub const INCIDENTS: [Incident; 3] = [
    Incident {
        id: "INC-2041",
        service: "checkout-api",
        symptom: "p99 latency rose from 180ms to 2.4s after the 14:05 deploy",
        trace_id: "4bf92f3577b34da6a3ce929d0e0e4736",
    },
    Incident {
        id: "INC-2042",
        service: "ledger-writer",
        symptom: "intermittent 503s from the ledger write path",
        trace_id: "00f067aa0ba902b7e1c1a2b3c4d5e6f7",
    },
    Incident {
        id: "INC-2043",
        service: "search-indexer",
        symptom: "index lag growing by ~40s per minute",
        trace_id: "c0ffee00deadbeef0123456789abcdef",
    },
];

pub fn incident(id: &str) -> Option<&'static Incident> {
    INCIDENTS.iter().find(|i| i.id == id)
}

// ── Diagnosis agent (mock) ───────────────────────────────────────────────────

/// A complete root cause analysis.
///
/// - INC-2041 → connection pool exhaustion, confidence 0.86, with trace evidence
/// - INC-2042 → suspected disk pressure, confidence 0.55
/// - anything else → inconclusive, confidence 0.2
pub fn diagnosis(incident: &Incident) -> Value {
    let (root_cause, severity, confidence, evidence) = match incident.id {
        "INC-2041" => (
            "deploy 812 lowered the checkout-api DB pool from 50 to 5 connections",
            "sev2",
            0.86,
            vec!["trace", "metric"],
        ),
        "INC-2042" => (
            "disk pressure on ledger-db-3 is stalling fsync",
            "sev3",
            0.55,
            vec!["metric"],
        ),
        _ => ("no single cause identified", "sev4", 0.2, vec![]),
    };
    json!({
        "incident": incident.id,
        "service": incident.service,
        "root_cause": root_cause,
        "severity": severity,
        "confidence": confidence,
        "evidence": evidence,
        "trace_id": incident.trace_id,
    })
}

/// The same analysis with `severity` dropped, as a truncated model reply
/// would produce.
pub fn partial_diagnosis(incident: &Incident) -> Value {
    let mut value = diagnosis(incident);
    if let Some(map) = value.as_object_mut() {
        map.remove("severity");
    }
    value
}

/// JSON Schema every `root_cause_analysis` payload must satisfy.
pub fn root_cause_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "root_cause": { "type": "string", "minLength": 1 },
            "severity": { "enum": ["sev1", "sev2", "sev3", "sev4"] },
            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
            "evidence": { "type": "array", "items": { "type": "string" } }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incidents_are_found_by_id() {
        assert_eq!(incident("INC-2042").unwrap().service, "ledger-writer");
        assert!(incident("INC-9999").is_none());
    }

    #[test]
    fn partial_diagnosis_only_drops_severity() {
        let inc = incident("INC-2041").unwrap();
        let full = diagnosis(inc);
        let partial = partial_diagnosis(inc);
        assert_eq!(full["severity"], "sev2");
        assert!(partial.get("severity").is_none());
        assert_eq!(partial["root_cause"], full["root_cause"]);
    }
}
