use forma_api::{Mapping, Value};
use serde::Deserialize;

use crate::error::EngineError;

/// Root schema document, parsed from TOML.
///
/// ```toml
/// [[models]]
/// name = "Person"
///
/// [[models.fields]]
/// name = "age"
/// type = "int"
/// default = 0
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    /// Model definitions. Names are unique within a document.
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    /// Field order is also the positional order for sequence construction.
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    /// Built-in type name (`int`, `str`, `datetime`, ...) or the name of
    /// another model in the same document.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Used when the field is absent from the input.
    #[serde(default)]
    pub default: Option<toml::Value>,
    /// Absent or null input stores null instead of failing.
    #[serde(default)]
    pub optional: bool,
}

impl SchemaConfig {
    /// Load a schema document from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse a schema document from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }
}

/// Raw value of a TOML literal. TOML datetimes become their ISO-8601 text
/// and are parsed by the converter like any other timestamp string.
pub(crate) fn toml_to_value(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::Str(s.clone()),
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => Value::Str(dt.to_string()),
        toml::Value::Array(items) => Value::List(items.iter().map(toml_to_value).collect()),
        toml::Value::Table(table) => Value::Map(
            table
                .iter()
                .map(|(k, v)| (k.as_str(), toml_to_value(v)))
                .collect::<Mapping>(),
        ),
    }
}
