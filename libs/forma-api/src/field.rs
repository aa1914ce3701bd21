//! Typed model fields.
//!
//! [`FieldValue`] ties a Rust field type to the descriptor it is converted
//! with, and extracts the typed value back out of the converted [`Value`].
//! The free functions are the building blocks `#[derive(Model)]` expands to.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::converter::convert;
use crate::descriptor::TypeDescriptor;
use crate::error::{ConvertError, ModelError};
use crate::model::Model;
use crate::value::{Mapping, Value};

pub trait FieldValue: Sized {
    /// Target kind raw values are converted to before extraction.
    fn descriptor() -> TypeDescriptor;

    /// Extract from a value already converted with [`Self::descriptor`].
    fn from_value(value: Value) -> Result<Self, ConvertError>;

    fn into_value(self) -> Value;

    /// Convert a raw value and extract it.
    fn coerce(value: Value) -> Result<Self, ConvertError> {
        Self::from_value(convert(value, &Self::descriptor())?)
    }

    /// Value used when the field is absent. `None` makes it required.
    fn missing() -> Option<Self> {
        None
    }
}

fn mismatch(value: &Value, to: &TypeDescriptor) -> ConvertError {
    ConvertError::unsupported(value.type_name(), to)
}

impl FieldValue for String {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::String
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(mismatch(&other, &Self::descriptor())),
        }
    }

    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl FieldValue for i64 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Integer
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(mismatch(&other, &Self::descriptor())),
        }
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl FieldValue for f64 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Float
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Float(f) => Ok(f),
            other => Err(mismatch(&other, &Self::descriptor())),
        }
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl FieldValue for bool {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Boolean
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch(&other, &Self::descriptor())),
        }
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl FieldValue for DateTime<FixedOffset> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Timestamp
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            other => Err(mismatch(&other, &Self::descriptor())),
        }
    }

    fn into_value(self) -> Value {
        Value::Timestamp(self)
    }
}

/// Untyped field: any value is stored as given.
impl FieldValue for Value {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Any
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        Ok(value)
    }

    fn into_value(self) -> Value {
        self
    }
}

/// Absent or null → `None`.
impl<T: FieldValue> FieldValue for Option<T> {
    fn descriptor() -> TypeDescriptor {
        T::descriptor()
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn into_value(self) -> Value {
        self.map_or(Value::Null, T::into_value)
    }

    fn coerce(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Null => Ok(None),
            other => T::coerce(other).map(Some),
        }
    }

    fn missing() -> Option<Self> {
        Some(None)
    }
}

/// Elements are coerced one by one, each to `T`.
fn coerce_elements<T: FieldValue>(items: Vec<Value>) -> Result<Vec<T>, ConvertError> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| T::coerce(item).map_err(|e| e.with_context(format!("[{i}]"))))
        .collect()
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::OrderedSequence
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::List(items) => coerce_elements(items),
            other => Err(mismatch(&other, &Self::descriptor())),
        }
    }

    fn into_value(self) -> Value {
        Value::List(self.into_iter().map(T::into_value).collect())
    }
}

impl<T: FieldValue> FieldValue for Box<[T]> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::FixedSequence
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            Value::Tuple(items) => coerce_elements(items).map(Vec::into_boxed_slice),
            other => Err(mismatch(&other, &Self::descriptor())),
        }
    }

    fn into_value(self) -> Value {
        Value::Tuple(self.into_vec().into_iter().map(T::into_value).collect())
    }
}

impl<T: FieldValue + Ord> FieldValue for BTreeSet<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Set
    }

    fn from_value(value: Value) -> Result<Self, ConvertError> {
        match value {
            // Elements equal after coercion ("1" and 1) collapse here.
            Value::Set(items) => coerce_elements(items).map(|v| v.into_iter().collect()),
            other => Err(mismatch(&other, &Self::descriptor())),
        }
    }

    fn into_value(self) -> Value {
        Value::Set(self.into_iter().map(T::into_value).collect())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Derive support
// ═══════════════════════════════════════════════════════════════

/// Read field `key` of `model` from a mapping.
#[doc(hidden)]
pub fn from_mapping<T: FieldValue>(
    model: &str,
    mapping: &Mapping,
    key: &str,
) -> Result<T, ConvertError> {
    match mapping.get(key) {
        Some(raw) => T::coerce(raw.clone()).map_err(|e| e.with_context(key)),
        None => T::missing().ok_or_else(|| missing_field(model, key)),
    }
}

/// Read the `index`-th field (`key`) of `model` from a sequence.
#[doc(hidden)]
pub fn from_sequence<T: FieldValue>(
    model: &str,
    items: &[Value],
    index: usize,
    key: &str,
) -> Result<T, ConvertError> {
    match items.get(index) {
        Some(raw) => T::coerce(raw.clone()).map_err(|e| e.with_context(key)),
        None => T::missing().ok_or_else(|| missing_field(model, key)),
    }
}

/// Reject sequences longer than the field list.
#[doc(hidden)]
pub fn check_arity(model: &str, items: &[Value], expected: usize) -> Result<(), ConvertError> {
    if items.len() > expected {
        return Err(ModelError::TooManyValues {
            model: model.to_string(),
            expected,
            got: items.len(),
        }
        .into());
    }
    Ok(())
}

/// Clone a typed model out of a converted `Model` value.
#[doc(hidden)]
pub fn downcast_model<M: Model>(value: Value) -> Result<M, ConvertError> {
    match value {
        Value::Model(object) => object
            .as_any()
            .downcast_ref::<M>()
            .cloned()
            .ok_or_else(|| ConvertError::unsupported(object.model_name(), M::NAME)),
        other => Err(ConvertError::unsupported(other.type_name(), M::NAME)),
    }
}

#[doc(hidden)]
pub fn model_value<M: Model>(model: M) -> Value {
    Value::Model(Arc::new(model))
}

fn missing_field(model: &str, field: &str) -> ConvertError {
    ModelError::MissingField {
        model: model.to_string(),
        field: field.to_string(),
    }
    .into()
}
