use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use forma_api::{TypeDescriptor, Value, convert};

use crate::config::{ModelConfig, SchemaConfig, toml_to_value};
use crate::error::EngineError;
use crate::record::{RecordField, RecordType};

/// Resolved schema-driven models, by name.
///
/// Built once from a [`SchemaConfig`]; nested model references are resolved
/// into shared [`RecordType`]s, so a field typed `Address` converts through
/// the same capabilities as the `Address` model itself.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<RecordType>>,
}

impl ModelRegistry {
    /// Validate and resolve every model of the document.
    ///
    /// Fails on duplicate model or field names, unknown type names, defaults
    /// that do not convert to their field type, and reference cycles between
    /// models (a model cannot contain itself, directly or through others).
    pub fn build(config: &SchemaConfig) -> Result<Self, EngineError> {
        let mut declared: HashMap<&str, &ModelConfig> = HashMap::new();
        for model in &config.models {
            if TypeDescriptor::from_name(&model.name).is_some() {
                return Err(EngineError::Schema(format!(
                    "model name '{}' shadows a built-in type",
                    model.name
                )));
            }
            if declared.insert(model.name.as_str(), model).is_some() {
                return Err(EngineError::Schema(format!("duplicate model '{}'", model.name)));
            }
        }

        let mut resolver = Resolver {
            declared,
            resolved: HashMap::new(),
            visiting: Vec::new(),
        };
        for model in &config.models {
            resolver.resolve(&model.name)?;
        }

        tracing::info!(models = resolver.resolved.len(), "model registry built");
        Ok(Self {
            models: resolver.resolved,
        })
    }

    /// Target descriptor for model `name`.
    pub fn get(&self, name: &str) -> Option<TypeDescriptor> {
        self.models
            .get(name)
            .map(|model| TypeDescriptor::Model(model.clone()))
    }

    pub fn record_type(&self, name: &str) -> Option<&Arc<RecordType>> {
        self.models.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Convert `value` into an instance of model `name`.
    pub fn convert(&self, name: &str, value: Value) -> Result<Value, EngineError> {
        let descriptor = self
            .get(name)
            .ok_or_else(|| EngineError::Schema(format!("unknown model '{name}'")))?;
        Ok(convert(value, &descriptor)?)
    }
}

/// Depth-first resolution with an explicit stack for cycle detection.
struct Resolver<'a> {
    declared: HashMap<&'a str, &'a ModelConfig>,
    resolved: HashMap<String, Arc<RecordType>>,
    visiting: Vec<String>,
}

impl Resolver<'_> {
    fn resolve(&mut self, name: &str) -> Result<Arc<RecordType>, EngineError> {
        if let Some(done) = self.resolved.get(name) {
            return Ok(done.clone());
        }
        if let Some(start) = self.visiting.iter().position(|n| n == name) {
            let mut cycle = self.visiting[start..].to_vec();
            cycle.push(name.to_string());
            return Err(EngineError::Schema(format!(
                "model reference cycle: {}",
                cycle.join(" -> ")
            )));
        }
        let config = *self
            .declared
            .get(name)
            .ok_or_else(|| EngineError::Schema(format!("unknown model '{name}'")))?;

        self.visiting.push(name.to_string());
        let fields = self.resolve_fields(config);
        self.visiting.pop();
        let fields = fields.map_err(|e| e.with_context(format!("model '{name}'")))?;

        tracing::debug!(model = name, fields = fields.len(), "resolved model");
        let model = Arc::new(RecordType::new(name, fields));
        self.resolved.insert(name.to_string(), model.clone());
        Ok(model)
    }

    fn resolve_fields(&mut self, config: &ModelConfig) -> Result<Vec<RecordField>, EngineError> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(config.fields.len());
        for field in &config.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(EngineError::Schema(format!("duplicate field '{}'", field.name)));
            }

            let descriptor = match TypeDescriptor::from_name(&field.type_name) {
                Some(builtin) => builtin,
                None if self.declared.contains_key(field.type_name.as_str()) => {
                    TypeDescriptor::Model(self.resolve(&field.type_name)?)
                }
                None => {
                    return Err(EngineError::Schema(format!(
                        "field '{}': unknown type '{}'",
                        field.name, field.type_name
                    )));
                }
            };

            let default = field
                .default
                .as_ref()
                .map(|raw| convert(toml_to_value(raw), &descriptor))
                .transpose()
                .map_err(|e| EngineError::from(e).with_context(format!("default of '{}'", field.name)))?;

            fields.push(RecordField {
                name: field.name.clone(),
                descriptor,
                default,
                optional: field.optional,
            });
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use pretty_assertions::assert_eq;

    fn registry(toml_str: &str) -> Result<ModelRegistry, EngineError> {
        ModelRegistry::build(&SchemaConfig::parse(toml_str)?)
    }

    const PEOPLE: &str = r#"
        [[models]]
        name = "Person"
        fields = [
            { name = "name", type = "str" },
            { name = "age", type = "int" },
            { name = "address", type = "Address", optional = true },
        ]

        [[models]]
        name = "Address"
        fields = [
            { name = "street", type = "str" },
            { name = "city", type = "str", default = "Springfield" },
        ]
    "#;

    #[test]
    fn resolves_nested_models_declared_later() {
        let registry = registry(PEOPLE).unwrap();
        assert_eq!(registry.len(), 2);
        let mut names: Vec<_> = registry.names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Address", "Person"]);

        let raw = serde_json::json!({
            "name": "Alice",
            "age": "30",
            "address": ["742 Evergreen Terrace"],
        });
        let value = registry.convert("Person", Value::from(raw)).unwrap();

        let person = value.as_model::<Record>().unwrap();
        assert_eq!(person.get("age"), Some(&Value::Int(30)));
        let address = person.get("address").unwrap().as_model::<Record>().unwrap();
        assert_eq!(address.get("city"), Some(&Value::from("Springfield")));
        assert_eq!(
            value.to_json(),
            serde_json::json!({
                "name": "Alice",
                "age": 30,
                "address": {"street": "742 Evergreen Terrace", "city": "Springfield"},
            })
        );
    }

    #[test]
    fn nested_descriptor_shares_the_registered_type() {
        let registry = registry(PEOPLE).unwrap();
        let person = registry.record_type("Person").unwrap();
        let address = registry.record_type("Address").unwrap();

        let TypeDescriptor::Model(nested) = &person.fields()[2].descriptor else {
            panic!("address field should be a model");
        };
        let nested_ptr = Arc::as_ptr(nested) as *const ();
        assert_eq!(nested_ptr, Arc::as_ptr(address) as *const ());
    }

    #[test]
    fn rejects_reference_cycles() {
        let err = registry(
            r#"
            [[models]]
            name = "A"
            fields = [{ name = "b", type = "B" }]

            [[models]]
            name = "B"
            fields = [{ name = "a", type = "A" }]
            "#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("A -> B -> A"), "{err}");
    }

    #[test]
    fn rejects_unknown_types_and_duplicates() {
        let err = registry(
            r#"
            [[models]]
            name = "A"
            fields = [{ name = "x", type = "decimal" }]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown type 'decimal'"), "{err}");

        let err = registry(
            r#"
            [[models]]
            name = "A"
            [[models]]
            name = "A"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate model 'A'"), "{err}");

        let err = registry(
            r#"
            [[models]]
            name = "A"
            fields = [{ name = "x", type = "int" }, { name = "x", type = "str" }]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate field 'x'"), "{err}");
    }

    #[test]
    fn rejects_defaults_of_the_wrong_shape() {
        let err = registry(
            r#"
            [[models]]
            name = "A"
            fields = [{ name = "n", type = "int", default = "many" }]
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, EngineError::Convert(ref e) if e.is_conversion()), "{err:?}");
        assert!(err.to_string().contains("default of 'n'"), "{err}");
    }

    #[test]
    fn unknown_model_lookup() {
        let registry = registry(PEOPLE).unwrap();
        assert!(registry.get("Nobody").is_none());
        assert!(matches!(
            registry.convert("Nobody", Value::Null),
            Err(EngineError::Schema(_))
        ));
    }
}
