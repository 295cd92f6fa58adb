//! Capability manifests: the authored catalog of capabilities, patterns, and
//! the relations between them.
//!
//! ```toml
//! version = "2026.10"
//!
//! [[capabilities]]
//! capability_id = "refactor.structured-output"
//! category = "refactoring"
//! maturity = "beta"
//! confidence = 0.8
//! triggers = [
//!     "structured output",
//!     { phrase = "replace regex parsing of LLM output", context = "refactoring" },
//! ]
//!
//! [[patterns]]
//! id = "regex-llm-parsing"
//! kind = "anti_pattern"
//!
//! [[relations]]
//! from = "refactor.structured-output"
//! kind = "avoids"
//! to = "regex-llm-parsing"
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use baton_contracts::{
    capability::{Capability, PatternEntry, Relation},
    error::{BatonError, BatonResult},
    insight::clamp_confidence,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityManifest {
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub patterns: Vec<PatternEntry>,
    /// Authored in one direction only.
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl CapabilityManifest {
    pub fn from_toml_str(s: &str) -> BatonResult<Self> {
        let manifest: Self = toml::from_str(s).map_err(|e| BatonError::Config {
            reason: format!("failed to parse capability manifest TOML: {}", e),
        })?;
        manifest.normalized()
    }

    pub fn from_json_str(s: &str) -> BatonResult<Self> {
        let manifest: Self = serde_json::from_str(s).map_err(|e| BatonError::Config {
            reason: format!("failed to parse capability manifest JSON: {}", e),
        })?;
        manifest.normalized()
    }

    /// Load a `.json` file as JSON and anything else as TOML.
    pub fn from_file(path: &Path) -> BatonResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BatonError::Config {
            reason: format!("failed to read capability manifest '{}': {}", path.display(), e),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }

    pub fn capability(&self, id: &str) -> Option<&Capability> {
        self.capabilities.iter().find(|c| c.capability_id.0 == id)
    }

    /// Clamp confidences, then check ids and relation endpoints.
    fn normalized(mut self) -> BatonResult<Self> {
        for cap in &mut self.capabilities {
            cap.confidence = clamp_confidence(cap.confidence);
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject duplicate capability ids, ids shared between a capability and
    /// a pattern, and relations naming an unknown entry.
    pub fn validate(&self) -> BatonResult<()> {
        let mut ids = HashSet::new();
        for cap in &self.capabilities {
            if !ids.insert(cap.capability_id.0.as_str()) {
                return Err(BatonError::DuplicateCapability {
                    capability_id: cap.capability_id.0.clone(),
                    version: self.version.clone(),
                });
            }
        }
        for pattern in &self.patterns {
            if !ids.insert(pattern.id.as_str()) {
                return Err(BatonError::Config {
                    reason: format!(
                        "manifest {}: pattern id '{}' is already in use",
                        self.version, pattern.id
                    ),
                });
            }
        }
        for rel in &self.relations {
            for end in [&rel.from, &rel.to] {
                if !ids.contains(end.as_str()) {
                    return Err(BatonError::Config {
                        reason: format!(
                            "manifest {}: relation {} -{}-> {} names unknown entry '{}'",
                            self.version, rel.from, rel.kind, rel.to, end
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
