//! Output contracts and the reports produced when checking them.
//!
//! An `ExpectedOutput` states what a producer must hand back. Field presence,
//! size limits, and completeness markers are only checked when the producer
//! submits its output, never when the contract is created.

use serde::{Deserialize, Serialize};

use crate::error::{BatonError, BatonResult};

/// What a producer must return to complete a handoff.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExpectedOutput {
    /// Declared output type (e.g. `"root_cause_analysis"`). When set,
    /// `required_fields` must be non-empty.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub output_type: Option<String>,

    /// Dotted field paths that must be present in the output.
    #[serde(default)]
    pub required_fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lines: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,

    /// Substrings the output must contain. A marker prefixed with `re:` is a
    /// regular expression instead.
    #[serde(default)]
    pub completeness_markers: Vec<String>,
}

impl ExpectedOutput {
    /// An output contract with no constraints at all.
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// A typed output contract. Fails when `required_fields` is empty.
    pub fn typed(
        output_type: impl Into<String>,
        required_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> BatonResult<Self> {
        let out = Self {
            output_type: Some(output_type.into()),
            required_fields: required_fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        };
        out.check_shape()?;
        Ok(out)
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = Some(max_lines);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.completeness_markers.push(marker.into());
        self
    }

    /// `required_fields` must be non-empty whenever `type` is set.
    pub fn check_shape(&self) -> BatonResult<()> {
        if self.output_type.is_some() && self.required_fields.is_empty() {
            return Err(BatonError::SchemaValidation {
                reason: format!(
                    "expected_output.type '{}' is set but required_fields is empty",
                    self.output_type.as_deref().unwrap_or_default()
                ),
            });
        }
        Ok(())
    }
}

/// The outcome of checking one output against an `ExpectedOutput`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True only if every check passed.
    pub passed: bool,
    /// Every failure found, in check order. Empty on pass.
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub fn pass() -> Self {
        Self {
            passed: true,
            failures: Vec::new(),
        }
    }

    pub fn from_failures(failures: Vec<ValidationFailure>) -> Self {
        Self {
            passed: failures.is_empty(),
            failures,
        }
    }

    /// `"[check] message; [check] message"`, used in gate reasons and logs.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("[{}] {}", f.check, f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A single failed check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    /// Which check failed: `required-field`, `max-lines`, `max-tokens`,
    /// `completeness-marker`, or `json-schema`.
    pub check: String,
    pub message: String,
}
