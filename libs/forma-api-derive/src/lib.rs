use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

/// Derive macro for typed models.
///
/// Generates `ModelObject`, `Model` and `FieldValue` impls for the annotated
/// struct, so it can be built from a mapping or a sequence through
/// `forma_api::convert` and nested inside other models:
///
/// - `from_mapping(&Mapping)`: each field read by name and converted to its type.
/// - `from_sequence(&[Value])`: fields assigned positionally.
/// - `to_mapping()`: field snapshot in declaration order.
///
/// The struct must implement `Clone` and `Debug`.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Clone, Model)]
/// pub struct Person {
///     pub name: String,
///     #[model(rename = "years")]
///     pub age: i64,
///     pub email: Option<String>,
/// }
/// ```
///
/// Field types must implement `forma_api::field::FieldValue`.
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens,
        Err(e) => e.to_compile_error().into(),
    }
}

fn derive_impl(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;
    let name_str = name.to_string();

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Model does not support generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Model only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "Model only supports structs")),
    };

    let mut keys = Vec::new();
    let mut from_mapping_tokens = Vec::new();
    let mut from_sequence_tokens = Vec::new();
    let mut to_mapping_tokens = Vec::new();

    for (index, field) in fields.iter().enumerate() {
        let field_name = field.ident.as_ref().ok_or_else(|| {
            syn::Error::new_spanned(field, "expected named field")
        })?;
        let field_ty = &field.ty;

        // Parse #[model(...)] attribute.
        let mut rename: Option<String> = None;
        for attr in &field.attrs {
            if !attr.path().is_ident("model") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let value: LitStr = meta.value()?.parse()?;
                    rename = Some(value.value());
                    Ok(())
                } else {
                    Err(meta.error("unknown model attribute (expected `rename`)"))
                }
            })?;
        }

        let key = rename.unwrap_or_else(|| field_name.to_string());
        if keys.contains(&key) {
            return Err(syn::Error::new_spanned(
                field_name,
                format!("duplicate model key '{key}'"),
            ));
        }

        from_mapping_tokens.push(quote! {
            #field_name: forma_api::field::from_mapping::<#field_ty>(#name_str, __mapping, #key)?
        });
        from_sequence_tokens.push(quote! {
            #field_name: forma_api::field::from_sequence::<#field_ty>(#name_str, __items, #index, #key)?
        });
        to_mapping_tokens.push(quote! {
            __mapping.insert(
                #key,
                <#field_ty as forma_api::field::FieldValue>::into_value(
                    ::std::clone::Clone::clone(&self.#field_name),
                ),
            );
        });
        keys.push(key);
    }

    let field_count = keys.len();

    let expanded = quote! {
        impl forma_api::model::ModelObject for #name {
            fn model_name(&self) -> &str {
                #name_str
            }

            fn fields(&self) -> forma_api::value::Mapping {
                <Self as forma_api::model::Model>::to_mapping(self)
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }

        impl forma_api::model::Model for #name {
            const NAME: &'static str = #name_str;
            const FIELDS: &'static [&'static str] = &[#(#keys),*];

            fn from_mapping(
                __mapping: &forma_api::value::Mapping,
            ) -> Result<Self, forma_api::error::ConvertError> {
                Ok(Self {
                    #(#from_mapping_tokens),*
                })
            }

            fn from_sequence(
                __items: &[forma_api::value::Value],
            ) -> Result<Self, forma_api::error::ConvertError> {
                forma_api::field::check_arity(#name_str, __items, #field_count)?;
                Ok(Self {
                    #(#from_sequence_tokens),*
                })
            }

            fn to_mapping(&self) -> forma_api::value::Mapping {
                let mut __mapping = forma_api::value::Mapping::with_capacity(#field_count);
                #(#to_mapping_tokens)*
                __mapping
            }
        }

        impl forma_api::field::FieldValue for #name {
            fn descriptor() -> forma_api::descriptor::TypeDescriptor {
                forma_api::descriptor::TypeDescriptor::model::<Self>()
            }

            fn from_value(
                value: forma_api::value::Value,
            ) -> Result<Self, forma_api::error::ConvertError> {
                forma_api::field::downcast_model::<Self>(value)
            }

            fn into_value(self) -> forma_api::value::Value {
                forma_api::field::model_value(self)
            }
        }
    };

    Ok(TokenStream::from(expanded))
}
