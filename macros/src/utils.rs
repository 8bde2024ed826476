//! Utility functions for procedural macros

use proc_macro2::TokenStream;
use quote::quote;

/// Path of the runtime crate as seen from generated code
pub fn crate_path() -> TokenStream {
    quote! { ::entity_writer }
}

/// Convert a type name such as `OrderLine` into `order_line`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("Customer"), "customer");
        assert_eq!(to_snake_case("OrderLine"), "order_line");
        assert_eq!(to_snake_case("HTTPLog"), "httplog");
    }
}
