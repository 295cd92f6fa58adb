//! The contract registry.
//!
//! Validation of a candidate runs three checks and reports every problem it
//! finds in one `SchemaValidation` error:
//!
//! 1. **Structural**: required fields present and correctly typed, no unknown
//!    top-level keys outside the extension point (compiled JSON Schema).
//! 2. **Output contract**: `expected_output.required_fields` is non-empty
//!    whenever `expected_output.type` is set.
//! 3. **Version**: the `schema_version` stamped on the candidate names a
//!    registered schema.

use std::collections::BTreeMap;

use semver::Version;
use serde_json::Value;
use tracing::{debug, info, warn};

use baton_contracts::{
    error::{BatonError, BatonResult},
    handoff::HandoffContract,
};
use baton_core::traits::ContractValidator;

use crate::schema::ContractSchema;

struct Compiled {
    schema: ContractSchema,
    validator: jsonschema::Validator,
}

/// Versioned contract schemas, several major versions at once.
#[derive(Default)]
pub struct ContractRegistry {
    schemas: BTreeMap<Version, Compiled>,
}

impl ContractRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in `1.0.0` handoff schema.
    pub fn with_builtin() -> BatonResult<Self> {
        let mut registry = Self::new();
        registry.register(ContractSchema::builtin_v1())?;
        Ok(registry)
    }

    /// Register a schema version.
    ///
    /// Within a major version, a schema must be an additive extension of the
    /// closest lower version and an additive base for the closest higher one.
    pub fn register(&mut self, schema: ContractSchema) -> BatonResult<()> {
        schema.check()?;
        if self.schemas.contains_key(&schema.version) {
            return Err(BatonError::SchemaValidation {
                reason: format!("schema version {} is already registered", schema.version),
            });
        }

        let major = schema.version.major;
        let same_major = |v: &&Version| v.major == major;
        let lower = self
            .schemas
            .range(..schema.version.clone())
            .map(|(v, _)| v)
            .filter(same_major)
            .next_back()
            .cloned();
        let higher = self
            .schemas
            .range(schema.version.clone()..)
            .map(|(v, _)| v)
            .find(same_major)
            .cloned();

        if let Some(lower) = lower.and_then(|v| self.schemas.get(&v)) {
            lower.schema.check_additive(&schema)?;
        }
        if let Some(higher) = higher.and_then(|v| self.schemas.get(&v)) {
            schema.check_additive(&higher.schema)?;
        }

        let document = schema.to_json_schema();
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(&document)
            .map_err(|e| BatonError::SchemaValidation {
                reason: format!("schema {} does not compile: {e}", schema.version),
            })?;

        info!(version = %schema.version, fields = schema.fields.len(), "contract schema registered");
        self.schemas
            .insert(schema.version.clone(), Compiled { schema, validator });
        Ok(())
    }

    pub fn resolve(&self, version: &Version) -> Option<&ContractSchema> {
        self.schemas.get(version).map(|c| &c.schema)
    }

    /// The highest registered version within `major`.
    pub fn latest(&self, major: u64) -> Option<&ContractSchema> {
        self.schemas
            .values()
            .rev()
            .map(|c| &c.schema)
            .find(|s| s.version.major == major)
    }

    pub fn versions(&self) -> Vec<Version> {
        self.schemas.keys().cloned().collect()
    }

    /// Fill absent fields that declare a default. Present fields are never
    /// overwritten.
    pub fn apply_defaults(&self, candidate: &mut Value) -> BatonResult<()> {
        let version = stamped_version(candidate)?;
        let compiled = self.compiled(&version)?;
        let Some(object) = candidate.as_object_mut() else {
            return Err(BatonError::SchemaValidation {
                reason: "contract must be a JSON object".to_string(),
            });
        };
        for field in &compiled.schema.fields {
            if let Some(default) = &field.default {
                if !object.contains_key(&field.name) {
                    debug!(field = %field.name, "applying schema default");
                    object.insert(field.name.clone(), default.clone());
                }
            }
        }
        Ok(())
    }

    /// Validate a raw JSON candidate. Defaults are applied to a copy first.
    pub fn validate_value(&self, candidate: &Value) -> BatonResult<()> {
        let version = stamped_version(candidate)?;
        let compiled = self.compiled(&version)?;

        let mut filled = candidate.clone();
        self.apply_defaults(&mut filled)?;

        let mut problems: Vec<String> = compiled
            .validator
            .iter_errors(&filled)
            .map(|error| format!("at '{}': {}", error.instance_path, error))
            .collect();

        if let Some(expected) = filled.get("expected_output") {
            let typed = expected.get("type").is_some_and(|t| !t.is_null());
            let fields_empty = expected
                .get("required_fields")
                .and_then(Value::as_array)
                .map_or(true, |f| f.is_empty());
            if typed && fields_empty {
                problems.push(
                    "expected_output.required_fields must be non-empty when type is set"
                        .to_string(),
                );
            }
        }

        if problems.is_empty() {
            debug!(%version, "contract passed schema validation");
            Ok(())
        } else {
            let reason = problems.join("; ");
            warn!(%version, %reason, "contract failed schema validation");
            Err(BatonError::SchemaValidation { reason })
        }
    }

    fn compiled(&self, version: &Version) -> BatonResult<&Compiled> {
        self.schemas
            .get(version)
            .ok_or_else(|| BatonError::SchemaValidation {
                reason: format!("unknown schema version {version}"),
            })
    }
}

impl ContractValidator for ContractRegistry {
    fn validate(&self, contract: &HandoffContract) -> BatonResult<()> {
        let value = serde_json::to_value(contract).map_err(|e| BatonError::SchemaValidation {
            reason: format!("contract does not serialize: {e}"),
        })?;
        self.validate_value(&value)
    }
}

fn stamped_version(candidate: &Value) -> BatonResult<Version> {
    let raw = candidate
        .get("schema_version")
        .and_then(Value::as_str)
        .ok_or_else(|| BatonError::SchemaValidation {
            reason: "missing field 'schema_version'".to_string(),
        })?;
    Version::parse(raw).map_err(|e| BatonError::SchemaValidation {
        reason: format!("schema_version '{raw}' is not a semantic version: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use baton_contracts::{
        content::Message,
        expected::ExpectedOutput,
        ids::{AgentId, CapabilityId},
    };

    use super::*;
    use crate::schema::{FieldSpec, FieldType};

    fn contract() -> HandoffContract {
        HandoffContract::new(
            AgentId::new("triage-agent"),
            AgentId::new("diagnosis-agent"),
            CapabilityId::new("diagnose.root_cause"),
            ExpectedOutput::typed("root_cause_analysis", ["root_cause"]).unwrap(),
            Message::text(AgentId::new("triage-agent"), "investigate"),
        )
    }

    fn v1_1() -> ContractSchema {
        let mut schema = ContractSchema::builtin_v1();
        schema.version = Version::new(1, 1, 0);
        schema.with_field(FieldSpec::optional("priority", FieldType::Integer).with_default(json!(3)))
    }

    #[test]
    fn builtin_accepts_well_formed_contract() {
        let registry = ContractRegistry::with_builtin().unwrap();
        registry.validate(&contract()).unwrap();
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let registry = ContractRegistry::with_builtin().unwrap();
        let mut value = serde_json::to_value(contract()).unwrap();
        value.as_object_mut().unwrap().remove("capability_id");

        let err = registry.validate_value(&value).unwrap_err();
        assert!(matches!(err, BatonError::SchemaValidation { .. }));
        assert!(err.to_string().contains("capability_id"));
    }

    #[test]
    fn wrongly_typed_field_is_rejected() {
        let registry = ContractRegistry::with_builtin().unwrap();
        let mut value = serde_json::to_value(contract()).unwrap();
        value["to_agent"] = json!(42);
        assert!(registry.validate_value(&value).is_err());
    }

    #[test]
    fn unknown_top_level_field_is_rejected() {
        let registry = ContractRegistry::with_builtin().unwrap();
        let mut value = serde_json::to_value(contract()).unwrap();
        value["urgency"] = json!("high");
        let err = registry.validate_value(&value).unwrap_err();
        assert!(err.to_string().contains("urgency"));
    }

    #[test]
    fn extension_point_accepts_unknown_keys() {
        let registry = ContractRegistry::with_builtin().unwrap();
        let contract = contract().with_extension("team.oncall", json!("sre-eu"));
        registry.validate(&contract).unwrap();
    }

    #[test]
    fn typed_output_without_fields_is_rejected() {
        let registry = ContractRegistry::with_builtin().unwrap();
        let mut contract = contract();
        contract.expected_output.required_fields.clear();
        let err = registry.validate(&contract).unwrap_err();
        assert!(err.to_string().contains("required_fields"));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let registry = ContractRegistry::with_builtin().unwrap();
        let contract = contract().with_schema_version(Version::new(9, 0, 0));
        let err = registry.validate(&contract).unwrap_err();
        assert!(err.to_string().contains("unknown schema version 9.0.0"));
    }

    #[test]
    fn minor_version_must_be_additive() {
        let mut registry = ContractRegistry::with_builtin().unwrap();
        let mut broken = ContractSchema::builtin_v1();
        broken.version = Version::new(1, 1, 0);
        broken.fields.retain(|f| f.name != "request");

        let err = registry.register(broken).unwrap_err();
        assert!(err.to_string().contains("breaking change requires a new major version"));
        assert_eq!(registry.versions(), vec![Version::new(1, 0, 0)]);
    }

    #[test]
    fn new_major_may_break_and_both_resolve() {
        let mut registry = ContractRegistry::with_builtin().unwrap();
        let mut v2 = ContractSchema::builtin_v1();
        v2.version = Version::new(2, 0, 0);
        v2.fields.retain(|f| f.name != "correlation_id");
        registry.register(v2).unwrap();

        registry.validate(&contract()).unwrap();
        let mut value = serde_json::to_value(contract().with_schema_version(Version::new(2, 0, 0))).unwrap();
        value.as_object_mut().unwrap().remove("correlation_id");
        registry.validate_value(&value).unwrap();

        assert_eq!(registry.latest(1).unwrap().version, Version::new(1, 0, 0));
        assert_eq!(registry.latest(2).unwrap().version, Version::new(2, 0, 0));
    }

    #[test]
    fn inserting_between_versions_checks_both_neighbours() {
        let mut registry = ContractRegistry::with_builtin().unwrap();
        let mut v1_2 = v1_1();
        v1_2.version = Version::new(1, 2, 0);
        registry.register(v1_2).unwrap();

        // 1.1.0 without `priority` would be fine after 1.0.0 but 1.2.0 has it
        // optional, so it is still additive.
        let mut v1_1_plain = ContractSchema::builtin_v1();
        v1_1_plain.version = Version::new(1, 1, 0);
        registry.register(v1_1_plain).unwrap();

        // 1.1.5 declaring `priority` as a string breaks 1.2.0.
        let mut bad = v1_1();
        bad.version = Version::new(1, 1, 5);
        bad.fields.last_mut().unwrap().field_type = FieldType::String;
        assert!(registry.register(bad).is_err());
    }

    #[test]
    fn defaults_fill_absent_fields_only() {
        let mut registry = ContractRegistry::with_builtin().unwrap();
        registry.register(v1_1()).unwrap();

        let mut value = serde_json::to_value(contract().with_schema_version(Version::new(1, 1, 0))).unwrap();
        registry.apply_defaults(&mut value).unwrap();
        assert_eq!(value["priority"], 3);

        value["priority"] = json!(1);
        registry.apply_defaults(&mut value).unwrap();
        assert_eq!(value["priority"], 1);
    }

    #[test]
    fn duplicate_version_is_rejected() {
        let mut registry = ContractRegistry::with_builtin().unwrap();
        assert!(registry.register(ContractSchema::builtin_v1()).is_err());
    }
}
