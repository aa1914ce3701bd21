// Lets `#[derive(Model)]` expansions name `forma_api::...` inside this crate too.
extern crate self as forma_api;

pub mod converter;
pub mod descriptor;
pub mod error;
pub mod field;
pub mod model;
pub mod value;

pub use converter::convert;
pub use descriptor::TypeDescriptor;
pub use error::{ConvertError, ModelError};
pub use forma_api_derive::Model;
pub use model::{Model, ModelObject, ModelType};
pub use value::{Mapping, Value};
