use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::ConvertError;
use crate::value::{Mapping, Value};

/// A constructed model instance, as stored inside [`Value::Model`].
pub trait ModelObject: Any + fmt::Debug + Send + Sync {
    fn model_name(&self) -> &str;

    /// Snapshot of the field values, in declaration order.
    fn fields(&self) -> Mapping;

    fn as_any(&self) -> &dyn Any;
}

/// Construction capabilities of a structured model.
///
/// This is the only thing the converter knows about models. Both
/// constructors are expected to run every field value back through
/// [`convert`](crate::converter::convert) with the field's declared type.
pub trait ModelType: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `object` was built by this model type. Used to keep repeated
    /// conversion from rebuilding an instance.
    fn is_instance(&self, object: &dyn ModelObject) -> bool;

    /// Build an instance field-by-field from a key/value mapping.
    fn from_mapping(&self, mapping: &Mapping) -> Result<Arc<dyn ModelObject>, ConvertError>;

    /// Build an instance positionally from raw field values.
    fn from_sequence(&self, items: &[Value]) -> Result<Arc<dyn ModelObject>, ConvertError>;
}

/// A plain Rust struct usable as a model. Implemented by `#[derive(Model)]`.
pub trait Model: ModelObject + Clone {
    const NAME: &'static str;

    /// Mapping keys, in declaration order.
    const FIELDS: &'static [&'static str];

    fn from_mapping(mapping: &Mapping) -> Result<Self, ConvertError>;

    fn from_sequence(items: &[Value]) -> Result<Self, ConvertError>;

    fn to_mapping(&self) -> Mapping;
}

/// [`ModelType`] adapter for a typed [`Model`].
pub struct TypedModel<M>(PhantomData<fn() -> M>);

impl<M> TypedModel<M> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<M> Default for TypedModel<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> ModelType for TypedModel<M> {
    fn name(&self) -> &str {
        M::NAME
    }

    fn is_instance(&self, object: &dyn ModelObject) -> bool {
        object.as_any().is::<M>()
    }

    fn from_mapping(&self, mapping: &Mapping) -> Result<Arc<dyn ModelObject>, ConvertError> {
        Ok(Arc::new(M::from_mapping(mapping)?))
    }

    fn from_sequence(&self, items: &[Value]) -> Result<Arc<dyn ModelObject>, ConvertError> {
        Ok(Arc::new(M::from_sequence(items)?))
    }
}
