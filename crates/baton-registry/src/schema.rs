//! Contract schema definitions.
//!
//! Schemas can be built in code or loaded from TOML:
//!
//! ```toml
//! version = "1.1.0"
//! extension_field = "extensions"
//!
//! [[fields]]
//! name = "id"
//! type = "string"
//! required = true
//!
//! [[fields]]
//! name = "priority"
//! type = "integer"
//! default = 3
//! ```

use std::path::Path;

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use baton_contracts::error::{BatonError, BatonResult};

/// The JSON type a top-level contract field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    /// An RFC 3339 timestamp string.
    Timestamp,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Timestamp => "timestamp",
        }
    }

    fn json_schema(self) -> Value {
        match self {
            FieldType::Timestamp => json!({ "type": "string", "format": "date-time" }),
            other => json!({ "type": other.as_str() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Filled in by `ContractRegistry::apply_defaults` when the field is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

fn default_extension_field() -> String {
    "extensions".to_string()
}

/// One version of the handoff contract shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSchema {
    pub version: Version,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// The object-valued field where unknown keys are allowed.
    #[serde(default = "default_extension_field")]
    pub extension_field: String,
}

impl ContractSchema {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            fields: Vec::new(),
            extension_field: default_extension_field(),
        }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The built-in `1.0.0` schema, matching `HandoffContract` as serialized.
    pub fn builtin_v1() -> Self {
        Self::new(Version::new(1, 0, 0))
            .with_field(FieldSpec::required("id", FieldType::String))
            .with_field(FieldSpec::required("schema_version", FieldType::String))
            .with_field(FieldSpec::required("from_agent", FieldType::String))
            .with_field(FieldSpec::required("to_agent", FieldType::String))
            .with_field(FieldSpec::required("capability_id", FieldType::String))
            .with_field(FieldSpec::required("expected_output", FieldType::Object))
            .with_field(FieldSpec::required("status", FieldType::String))
            .with_field(FieldSpec::required("created_at", FieldType::Timestamp))
            .with_field(FieldSpec::required("correlation_id", FieldType::String))
            .with_field(FieldSpec::required("request", FieldType::Object))
    }

    pub fn from_toml_str(s: &str) -> BatonResult<Self> {
        let schema: ContractSchema = toml::from_str(s).map_err(|e| BatonError::Config {
            reason: format!("failed to parse contract schema TOML: {}", e),
        })?;
        schema.check()?;
        Ok(schema)
    }

    pub fn from_file(path: &Path) -> BatonResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BatonError::Config {
            reason: format!("failed to read contract schema '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject schemas that are internally inconsistent.
    pub fn check(&self) -> BatonResult<()> {
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(BatonError::SchemaValidation {
                    reason: format!(
                        "schema {} declares field '{}' twice",
                        self.version, field.name
                    ),
                });
            }
            if field.name == self.extension_field {
                return Err(BatonError::SchemaValidation {
                    reason: format!(
                        "field '{}' collides with the extension point",
                        field.name
                    ),
                });
            }
        }
        Ok(())
    }

    /// Compile to a JSON Schema document.
    ///
    /// Unknown top-level keys are rejected except under the extension field,
    /// which must itself be an object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            properties.insert(field.name.clone(), field.field_type.json_schema());
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }
        properties.insert(self.extension_field.clone(), json!({ "type": "object" }));

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Additive-only evolution check: `next` may add optional or defaulted
    /// fields but may not remove, retype, or change the requiredness of any
    /// field of `self`.
    pub fn check_additive(&self, next: &ContractSchema) -> BatonResult<()> {
        let breaking = |detail: String| BatonError::SchemaValidation {
            reason: format!(
                "breaking change requires a new major version ({} -> {}): {}",
                self.version, next.version, detail
            ),
        };

        if next.extension_field != self.extension_field {
            return Err(breaking(format!(
                "extension point renamed from '{}' to '{}'",
                self.extension_field, next.extension_field
            )));
        }

        for old in &self.fields {
            let Some(new) = next.field(&old.name) else {
                return Err(breaking(format!("field '{}' removed", old.name)));
            };
            if new.field_type != old.field_type {
                return Err(breaking(format!(
                    "field '{}' changed type from {} to {}",
                    old.name,
                    old.field_type.as_str(),
                    new.field_type.as_str()
                )));
            }
            if new.required != old.required {
                return Err(breaking(format!("field '{}' changed requiredness", old.name)));
            }
        }

        for new in &next.fields {
            if self.field(&new.name).is_none() && new.required && new.default.is_none() {
                return Err(breaking(format!(
                    "new field '{}' is required without a default",
                    new.name
                )));
            }
        }
        Ok(())
    }
}
