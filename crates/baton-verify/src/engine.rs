//! Checks a producer's output against the contract's `ExpectedOutput`.
//!
//! Checks run in a fixed order and every failure is collected, so the gate
//! reason lists the whole failure set at once:
//!
//! 1. **Required fields**: each dotted path must resolve to a non-null value
//!    in some `json` part, or appear as a `field: value` line in the text.
//! 2. **Size**: rendered line count against `max_lines`, whitespace-separated
//!    word count against `max_tokens`.
//! 3. **Completeness markers**: each marker must occur as a substring of
//!    the rendered output. Markers written `re:<pattern>` are regexes.
//! 4. **Output schema**: if a JSON Schema is registered for the declared
//!    output type, every `json` part must satisfy it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use baton_contracts::{
    content::Message,
    error::{BatonError, BatonResult},
    expected::{ExpectedOutput, ValidationFailure, ValidationReport},
};
use baton_core::traits::OutputValidator;

const REGEX_PREFIX: &str = "re:";

/// The output verifier used at the `output-validation` boundary.
pub struct ExpectedOutputVerifier {
    /// Compiled JSON Schemas keyed by `ExpectedOutput::output_type`.
    output_schemas: HashMap<String, jsonschema::Validator>,
    /// Marker regexes compiled on first use.
    regex_cache: Mutex<HashMap<String, Regex>>,
}

impl ExpectedOutputVerifier {
    pub fn new() -> Self {
        Self {
            output_schemas: HashMap::new(),
            regex_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Require every `json` part of an output of type `output_type` to
    /// satisfy `schema`. Registering a type twice replaces the schema.
    pub fn register_output_schema(
        &mut self,
        output_type: impl Into<String>,
        schema: &Value,
    ) -> BatonResult<()> {
        let output_type = output_type.into();
        let validator = jsonschema::validator_for(schema).map_err(|e| BatonError::Config {
            reason: format!("invalid JSON Schema for output type '{output_type}': {e}"),
        })?;
        self.output_schemas.insert(output_type, validator);
        Ok(())
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn resolve_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
        let mut current = value;
        for segment in path.split('.') {
            match current.get(segment) {
                Some(v) if !v.is_null() => current = v,
                _ => return None,
            }
        }
        Some(current)
    }

    /// A text line `key: value` (or `key = value`) with a non-empty value.
    fn text_has_field(text: &str, field: &str) -> bool {
        text.lines().any(|line| {
            let Some((key, value)) = line.split_once(':').or_else(|| line.split_once('=')) else {
                return false;
            };
            key.trim().eq_ignore_ascii_case(field) && !value.trim().is_empty()
        })
    }

    fn marker_matches(&self, marker: &str, text: &str) -> Result<bool, String> {
        let Some(pattern) = marker.strip_prefix(REGEX_PREFIX) else {
            return Ok(text.contains(marker));
        };
        let mut cache = self
            .regex_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(re) = cache.get(pattern) {
            return Ok(re.is_match(text));
        }
        let re = Regex::new(pattern).map_err(|e| format!("invalid marker regex '{pattern}': {e}"))?;
        let matched = re.is_match(text);
        cache.insert(pattern.to_string(), re);
        Ok(matched)
    }
}

impl Default for ExpectedOutputVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputValidator for ExpectedOutputVerifier {
    fn validate(&self, output: &Message, expected: &ExpectedOutput) -> BatonResult<ValidationReport> {
        let mut failures: Vec<ValidationFailure> = Vec::new();
        let text = output.rendered();
        let json: Vec<&Value> = output.json_values().collect();

        // ── Required fields ───────────────────────────────────────────────────
        for field in &expected.required_fields {
            let in_json = json.iter().any(|v| Self::resolve_path(v, field).is_some());
            if !in_json && !Self::text_has_field(&text, field) {
                failures.push(ValidationFailure {
                    check: "required-field".to_string(),
                    message: format!("required field '{field}' is missing or null"),
                });
            }
        }

        // ── Size limits ───────────────────────────────────────────────────────
        if let Some(max) = expected.max_lines {
            let lines = text.lines().count();
            if lines > max {
                failures.push(ValidationFailure {
                    check: "max-lines".to_string(),
                    message: format!("output has {lines} lines, limit is {max}"),
                });
            }
        }
        if let Some(max) = expected.max_tokens {
            let tokens = text.split_whitespace().count();
            if tokens > max {
                failures.push(ValidationFailure {
                    check: "max-tokens".to_string(),
                    message: format!("output has {tokens} tokens, limit is {max}"),
                });
            }
        }

        // ── Completeness markers ──────────────────────────────────────────────
        for marker in &expected.completeness_markers {
            match self.marker_matches(marker, &text) {
                Ok(true) => {}
                Ok(false) => failures.push(ValidationFailure {
                    check: "completeness-marker".to_string(),
                    message: format!("completeness marker '{marker}' not found"),
                }),
                Err(message) => failures.push(ValidationFailure {
                    check: "completeness-marker".to_string(),
                    message,
                }),
            }
        }

        // ── Output-type schema ────────────────────────────────────────────────
        if let Some(validator) = expected
            .output_type
            .as_deref()
            .and_then(|t| self.output_schemas.get(t))
        {
            for value in &json {
                for error in validator.iter_errors(value) {
                    failures.push(ValidationFailure {
                        check: "json-schema".to_string(),
                        message: format!("JSON Schema violation at {}: {}", error.instance_path, error),
                    });
                }
            }
        }

        let report = ValidationReport::from_failures(failures);
        if report.passed {
            debug!(sender = %output.sender, "output passed validation");
        } else {
            warn!(
                sender = %output.sender,
                failures = report.failures.len(),
                summary = %report.summary(),
                "output failed validation"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use baton_contracts::{content::Part, ids::AgentId};

    use super::*;

    fn sender() -> AgentId {
        AgentId::new("diagnosis-agent")
    }

    fn checks(report: &ValidationReport) -> Vec<&str> {
        report.failures.iter().map(|f| f.check.as_str()).collect()
    }

    #[test]
    fn json_part_satisfies_dotted_required_fields() {
        let verifier = ExpectedOutputVerifier::new();
        let expected = ExpectedOutput::typed("root_cause_analysis", ["root_cause", "impact.severity"]).unwrap();
        let output = Message::new(
            sender(),
            vec![Part::json(json!({ "root_cause": "pool exhaustion", "impact": { "severity": "high" } }))],
        )
        .unwrap();

        let report = verifier.validate(&output, &expected).unwrap();
        assert!(report.passed, "{}", report.summary());
    }

    #[test]
    fn text_lines_satisfy_required_fields() {
        let verifier = ExpectedOutputVerifier::new();
        let expected = ExpectedOutput::typed("root_cause_analysis", ["root_cause", "severity"]).unwrap();
        let output = Message::text(sender(), "Root_Cause: pool exhaustion\nseverity = high");
        assert!(verifier.validate(&output, &expected).unwrap().passed);
    }

    #[test]
    fn null_or_empty_field_is_missing() {
        let verifier = ExpectedOutputVerifier::new();
        let expected = ExpectedOutput::typed("rca", ["root_cause"]).unwrap();
        let output = Message::new(sender(), vec![Part::json(json!({ "root_cause": null })), Part::text("root_cause:")])
            .unwrap();
        let report = verifier.validate(&output, &expected).unwrap();
        assert_eq!(checks(&report), vec!["required-field"]);
    }

    #[test]
    fn limits_are_inclusive() {
        let verifier = ExpectedOutputVerifier::new();
        let expected = ExpectedOutput::unconstrained().with_max_lines(2).with_max_tokens(4);
        assert!(verifier.validate(&Message::text(sender(), "a b\nc d"), &expected).unwrap().passed);

        let report = verifier
            .validate(&Message::text(sender(), "a b\nc d\ne"), &expected)
            .unwrap();
        assert_eq!(checks(&report), vec!["max-lines", "max-tokens"]);
    }

    #[test]
    fn substring_and_regex_markers() {
        let verifier = ExpectedOutputVerifier::new();
        let expected = ExpectedOutput::unconstrained()
            .with_marker("## Summary")
            .with_marker(r"re:confidence: 0\.\d+");

        let complete = Message::text(sender(), "## Summary\nconfidence: 0.82");
        assert!(verifier.validate(&complete, &expected).unwrap().passed);

        let partial = Message::text(sender(), "## Summary\nconfidence: high");
        let report = verifier.validate(&partial, &expected).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].message.contains("re:confidence"));
    }

    #[test]
    fn invalid_marker_regex_is_a_failure_not_an_error() {
        let verifier = ExpectedOutputVerifier::new();
        let expected = ExpectedOutput::unconstrained().with_marker("re:(unclosed");
        let report = verifier.validate(&Message::text(sender(), "anything"), &expected).unwrap();
        assert!(!report.passed);
        assert!(report.failures[0].message.contains("invalid marker regex"));
    }

    #[test]
    fn all_failures_are_collected() {
        let verifier = ExpectedOutputVerifier::new();
        let expected = ExpectedOutput::typed("rca", ["root_cause"])
            .unwrap()
            .with_max_lines(1)
            .with_marker("DONE");
        let report = verifier
            .validate(&Message::text(sender(), "thinking\nstill thinking"), &expected)
            .unwrap();
        assert_eq!(checks(&report), vec!["required-field", "max-lines", "completeness-marker"]);
    }

    #[test]
    fn registered_output_schema_checks_json_parts() {
        let mut verifier = ExpectedOutputVerifier::new();
        verifier
            .register_output_schema(
                "rca",
                &json!({
                    "type": "object",
                    "properties": { "severity": { "enum": ["low", "medium", "high"] } }
                }),
            )
            .unwrap();
        let expected = ExpectedOutput::typed("rca", ["severity"]).unwrap();

        let good = Message::new(sender(), vec![Part::json(json!({ "severity": "high" }))]).unwrap();
        assert!(verifier.validate(&good, &expected).unwrap().passed);

        let bad = Message::new(sender(), vec![Part::json(json!({ "severity": "urgent" }))]).unwrap();
        let report = verifier.validate(&bad, &expected).unwrap();
        assert_eq!(checks(&report), vec!["json-schema"]);
    }

    #[test]
    fn invalid_output_schema_is_config_error() {
        let mut verifier = ExpectedOutputVerifier::new();
        let err = verifier
            .register_output_schema("rca", &json!({ "type": 12 }))
            .unwrap_err();
        assert!(matches!(err, BatonError::Config { .. }));
    }
}
