use std::fmt;
use std::sync::Arc;

use crate::model::{Model, ModelType, TypedModel};

/// Target type of a conversion.
///
/// Fixed set of kinds plus one extension point: `Model` carries the
/// construction capabilities of a structured model, so the converter never
/// depends on a concrete model definition.
#[derive(Clone)]
pub enum TypeDescriptor {
    /// Pass-through: the value is returned unchanged.
    Any,
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
    OrderedSequence,
    FixedSequence,
    Set,
    Model(Arc<dyn ModelType>),
}

impl TypeDescriptor {
    /// Descriptor for a typed model (usually one with `#[derive(Model)]`).
    pub fn model<M: Model>() -> Self {
        TypeDescriptor::Model(Arc::new(TypedModel::<M>::new()))
    }

    /// Look up a built-in kind by its schema name.
    ///
    /// Model kinds have no built-in name and return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        let descriptor = match name {
            "any" => TypeDescriptor::Any,
            "str" | "string" => TypeDescriptor::String,
            "int" | "integer" => TypeDescriptor::Integer,
            "float" => TypeDescriptor::Float,
            "bool" | "boolean" => TypeDescriptor::Boolean,
            "datetime" | "timestamp" => TypeDescriptor::Timestamp,
            "list" => TypeDescriptor::OrderedSequence,
            "tuple" => TypeDescriptor::FixedSequence,
            "set" => TypeDescriptor::Set,
            _ => return None,
        };
        Some(descriptor)
    }

    pub fn name(&self) -> &str {
        match self {
            TypeDescriptor::Any => "Any",
            TypeDescriptor::String => "String",
            TypeDescriptor::Integer => "Integer",
            TypeDescriptor::Float => "Float",
            TypeDescriptor::Boolean => "Boolean",
            TypeDescriptor::Timestamp => "Timestamp",
            TypeDescriptor::OrderedSequence => "OrderedSequence",
            TypeDescriptor::FixedSequence => "FixedSequence",
            TypeDescriptor::Set => "Set",
            TypeDescriptor::Model(model) => model.name(),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Model(model) => write!(f, "Model({})", model.name()),
            other => f.write_str(other.name()),
        }
    }
}

/// Model descriptors are equal when they share capabilities or name the
/// same model.
impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeDescriptor::Model(a), TypeDescriptor::Model(b)) => {
                Arc::ptr_eq(a, b) || a.name() == b.name()
            }
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}
