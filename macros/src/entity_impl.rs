//! Entity derive macro implementation
//!
//! Generates an `Entity` implementation whose metadata holds one getter and
//! one optional setter per mapped field.

use darling::{ast, FromDeriveInput, FromField};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

use crate::utils::{crate_path, to_snake_case};

/// Receiver for the struct that derives Entity
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(entity), supports(struct_named))]
pub struct EntityReceiver {
    /// The struct identifier
    ident: syn::Ident,
    generics: syn::Generics,
    /// The struct data with parsed fields
    data: ast::Data<(), EntityFieldReceiver>,
    /// Entity type name, defaults to the struct name
    #[darling(default)]
    name: Option<String>,
    /// Table name, defaults to the snake-cased entity name
    #[darling(default)]
    table: Option<String>,
}

/// Receiver for the fields in the struct
#[derive(Debug, FromField)]
#[darling(attributes(entity))]
pub struct EntityFieldReceiver {
    ident: Option<syn::Ident>,
    ty: syn::Type,
    /// Marks the identifier field
    #[darling(default)]
    id: bool,
    /// Target entity type of an association
    #[darling(default)]
    association: Option<syn::Path>,
    /// Field is read by the engine but has no setter
    #[darling(default)]
    readonly: bool,
    /// Field name used in records and storage
    #[darling(default)]
    rename: Option<String>,
    /// Field is not part of the entity metadata
    #[darling(default)]
    skip: bool,
}

impl EntityFieldReceiver {
    fn field_name(&self) -> String {
        self.rename.clone().unwrap_or_else(|| {
            self.ident
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        })
    }
}

/// Process the Entity derive macro
pub fn process_derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let receiver = match EntityReceiver::from_derive_input(&input) {
        Ok(receiver) => receiver,
        Err(err) => return err.write_errors().into(),
    };

    match generate_entity_impl(&receiver) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => err.write_errors().into(),
    }
}

/// Generate the `Entity` implementation
fn generate_entity_impl(receiver: &EntityReceiver) -> darling::Result<TokenStream2> {
    let struct_name = &receiver.ident;
    if !receiver.generics.params.is_empty() {
        return Err(darling::Error::custom("Entity cannot be derived for generic structs")
            .with_span(&receiver.generics));
    }

    let ast::Data::Struct(fields) = &receiver.data else {
        unreachable!("Darling ensures this is a struct")
    };
    let mapped: Vec<&EntityFieldReceiver> = fields.iter().filter(|f| !f.skip).collect();

    let id_field = find_identifier(&mapped, struct_name)?;
    if id_field.association.is_some() {
        return Err(darling::Error::custom("the identifier cannot be an association")
            .with_span(&id_field.ty));
    }

    let krate = crate_path();
    let entity_name = receiver
        .name
        .clone()
        .unwrap_or_else(|| struct_name.to_string());
    let table = receiver
        .table
        .clone()
        .unwrap_or_else(|| to_snake_case(&entity_name));
    let id_name = id_field.field_name();
    let id_ty = &id_field.ty;

    let field_defs = mapped
        .iter()
        .map(|field| generate_field_def(struct_name, field))
        .collect::<Vec<_>>();

    Ok(quote! {
        impl #krate::model::Entity for #struct_name {
            const NAME: &'static str = #entity_name;
            const TABLE: &'static str = #table;
            const IDENTIFIER: &'static str = #id_name;
            const ID_TYPE: #krate::model::ScalarType =
                <#id_ty as #krate::model::Scalar>::TYPE;

            fn metadata() -> &'static #krate::model::EntityMetadata<Self> {
                static METADATA: ::std::sync::OnceLock<#krate::model::EntityMetadata<#struct_name>> =
                    ::std::sync::OnceLock::new();
                METADATA.get_or_init(|| {
                    #krate::model::EntityMetadata::new(
                        #entity_name,
                        #table,
                        #id_name,
                        ::std::vec![#(#field_defs),*],
                    )
                })
            }
        }
    })
}

/// Pick the field marked `#[entity(id)]`, or the one called `id`
fn find_identifier<'a>(
    mapped: &[&'a EntityFieldReceiver],
    struct_name: &syn::Ident,
) -> darling::Result<&'a EntityFieldReceiver> {
    let marked: Vec<&EntityFieldReceiver> = mapped.iter().copied().filter(|f| f.id).collect();
    match marked.as_slice() {
        [field] => Ok(field),
        [] => mapped
            .iter()
            .copied()
            .find(|f| f.ident.as_ref().is_some_and(|i| i == "id"))
            .ok_or_else(|| {
                darling::Error::custom(
                    "entity needs a field called `id` or a field marked #[entity(id)]",
                )
                .with_span(struct_name)
            }),
        _ => Err(
            darling::Error::custom("only one field may be marked #[entity(id)]")
                .with_span(struct_name),
        ),
    }
}

/// Generate the `FieldDef` expression for one field
fn generate_field_def(struct_name: &syn::Ident, field: &EntityFieldReceiver) -> TokenStream2 {
    let krate = crate_path();
    let ident = field
        .ident
        .as_ref()
        .expect("named struct fields always have identifiers");
    let ty = &field.ty;
    let name = field.field_name();

    let getter = quote! {
        (|entity: &#struct_name| {
            <#ty as #krate::model::FieldValue>::to_value(&entity.#ident)
        }) as #krate::model::Getter<#struct_name>
    };

    let setter = if field.readonly {
        quote! { ::std::option::Option::None }
    } else {
        quote! {
            ::std::option::Option::Some(
                (|entity: &mut #struct_name, value: #krate::value::Value| {
                    #krate::model::assign(&mut entity.#ident, #name, value)
                }) as #krate::model::Setter<#struct_name>
            )
        }
    };

    match &field.association {
        Some(target) => quote! {
            #krate::model::FieldDef::association(
                #name,
                <#target as #krate::model::Entity>::NAME,
                <#target as #krate::model::Entity>::ID_TYPE,
                #getter,
                #setter,
            )
        },
        None => quote! {
            #krate::model::FieldDef::scalar(
                #name,
                <#ty as #krate::model::Scalar>::TYPE,
                #getter,
                #setter,
            )
        },
    }
}
