use std::any::Any;
use std::sync::Arc;

use forma_api::model::{ModelObject, ModelType};
use forma_api::{ConvertError, Mapping, ModelError, TypeDescriptor, Value, convert};

/// One declared field of a schema-driven model.
#[derive(Debug, Clone)]
pub struct RecordField {
    pub name: String,
    pub descriptor: TypeDescriptor,
    /// Already converted to `descriptor`.
    pub default: Option<Value>,
    pub optional: bool,
}

/// Model type declared at runtime (from a schema file) instead of a Rust struct.
///
/// Builds [`Record`] instances. Instances are recognised by model name, which
/// is unique within a [`ModelRegistry`](crate::registry::ModelRegistry).
#[derive(Debug)]
pub struct RecordType {
    name: String,
    fields: Vec<RecordField>,
}

impl RecordType {
    pub fn new(name: impl Into<String>, fields: Vec<RecordField>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn fields(&self) -> &[RecordField] {
        &self.fields
    }

    /// Convert a present raw value to the field's type.
    fn coerce(&self, field: &RecordField, raw: Value) -> Result<Value, ConvertError> {
        if field.optional && raw.is_null() {
            return Ok(Value::Null);
        }
        convert(raw, &field.descriptor).map_err(|e| e.with_context(&field.name))
    }

    /// Value for an absent field: its default, null if optional, else an error.
    fn absent(&self, field: &RecordField) -> Result<Value, ConvertError> {
        if let Some(default) = &field.default {
            return Ok(default.clone());
        }
        if field.optional {
            return Ok(Value::Null);
        }
        Err(ModelError::MissingField {
            model: self.name.clone(),
            field: field.name.clone(),
        }
        .into())
    }

    fn build(&self, values: Mapping) -> Arc<dyn ModelObject> {
        Arc::new(Record {
            model: self.name.clone(),
            values,
        })
    }
}

impl ModelType for RecordType {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_instance(&self, object: &dyn ModelObject) -> bool {
        object
            .as_any()
            .downcast_ref::<Record>()
            .is_some_and(|record| record.model == self.name)
    }

    fn from_mapping(&self, mapping: &Mapping) -> Result<Arc<dyn ModelObject>, ConvertError> {
        let mut values = Mapping::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = match mapping.get(&field.name) {
                Some(raw) => self.coerce(field, raw.clone())?,
                None => self.absent(field)?,
            };
            values.insert(field.name.clone(), value);
        }
        Ok(self.build(values))
    }

    fn from_sequence(&self, items: &[Value]) -> Result<Arc<dyn ModelObject>, ConvertError> {
        if items.len() > self.fields.len() {
            return Err(ModelError::TooManyValues {
                model: self.name.clone(),
                expected: self.fields.len(),
                got: items.len(),
            }
            .into());
        }
        let mut values = Mapping::with_capacity(self.fields.len());
        for (index, field) in self.fields.iter().enumerate() {
            let value = match items.get(index) {
                Some(raw) => self.coerce(field, raw.clone())?,
                None => self.absent(field)?,
            };
            values.insert(field.name.clone(), value);
        }
        Ok(self.build(values))
    }
}

/// Instance of a [`RecordType`]: field values in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    model: String,
    values: Mapping,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn values(&self) -> &Mapping {
        &self.values
    }
}

impl ModelObject for Record {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn fields(&self) -> Mapping {
        self.values.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn person() -> Arc<RecordType> {
        Arc::new(RecordType::new(
            "Person",
            vec![
                RecordField {
                    name: "name".into(),
                    descriptor: TypeDescriptor::String,
                    default: None,
                    optional: false,
                },
                RecordField {
                    name: "age".into(),
                    descriptor: TypeDescriptor::Integer,
                    default: Some(Value::Int(0)),
                    optional: false,
                },
                RecordField {
                    name: "email".into(),
                    descriptor: TypeDescriptor::String,
                    default: None,
                    optional: true,
                },
            ],
        ))
    }

    #[test]
    fn mapping_fields_are_converted_to_declared_types() {
        let raw: Mapping = [("name", Value::from("Alice")), ("age", Value::from("30"))]
            .into_iter()
            .collect();

        let value = convert(Value::Map(raw), &TypeDescriptor::Model(person())).unwrap();
        let record = value.as_model::<Record>().unwrap();

        assert_eq!(record.get("name"), Some(&Value::from("Alice")));
        assert_eq!(record.get("age"), Some(&Value::Int(30)));
        assert_eq!(record.get("email"), Some(&Value::Null));
    }

    #[test]
    fn absent_fields_use_defaults() {
        let value = convert(
            Value::List(vec![Value::from("Bob")]),
            &TypeDescriptor::Model(person()),
        )
        .unwrap();

        let record = value.as_model::<Record>().unwrap();
        assert_eq!(record.get("age"), Some(&Value::Int(0)));
    }

    #[test]
    fn optional_null_skips_conversion() {
        let raw: Mapping = [("name", Value::from("Eve")), ("email", Value::Null)]
            .into_iter()
            .collect();

        let value = convert(Value::Map(raw), &TypeDescriptor::Model(person())).unwrap();

        // A required string field would have turned null into "".
        assert_eq!(value.as_model::<Record>().unwrap().get("email"), Some(&Value::Null));
    }

    #[test]
    fn records_of_the_same_type_are_not_rebuilt() {
        let model = person();
        let descriptor = TypeDescriptor::Model(model.clone());
        let first = convert(Value::List(vec![Value::from("Dan")]), &descriptor).unwrap();

        let second = convert(first.clone(), &descriptor).unwrap();

        let (Value::Model(a), Value::Model(b)) = (&first, &second) else {
            panic!("expected model values");
        };
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn missing_required_field_is_reported() {
        let err = convert(Value::Map(Mapping::new()), &TypeDescriptor::Model(person())).unwrap_err();
        assert_eq!(err.to_string(), "Person: missing field 'name'");
    }
}
