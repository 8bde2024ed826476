//! Procedural macros for the entity-writer crate
//!
//! This crate generates entity metadata (the field table of getters and
//! setters that the writer and backends use) from plain struct definitions.

use proc_macro::TokenStream;

// Import modules
mod entity_impl;
mod utils;

/// Derive macro for generating entity metadata
///
/// Every named field becomes a scalar field unless it is marked as an
/// association or skipped. The identifier is the field marked `#[entity(id)]`,
/// or the field called `id`.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Debug, Clone, Default, Entity)]
/// #[entity(table = "orders")]
/// struct Order {
///     #[entity(id, readonly)]
///     id: Option<i64>,
///
///     #[entity(rename = "ref")]
///     reference: String,
///
///     #[entity(association = "Customer")]
///     customer: Option<EntityRef>,
///
///     #[entity(skip)]
///     scratch: Vec<u8>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity_impl::process_derive_entity(input)
}
