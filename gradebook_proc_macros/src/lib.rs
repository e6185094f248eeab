use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DataStruct, DeriveInput, Fields, Type};

/// Derives `supplied_fields()` and `is_empty()` for partial-update payloads.
///
/// Every named field of type `Option<_>` counts as a patchable field; a field
/// is "supplied" when it is `Some`. Non-`Option` fields are ignored.
#[proc_macro_derive(SuppliedFields)]
pub fn supplied_fields(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let struct_name = &input.ident;

    let fields = match &input.data {
        Data::Struct(DataStruct { fields: Fields::Named(fields), .. }) => fields,
        _ => {
            return syn::Error::new_spanned(&input.ident, "SuppliedFields supports only structs with named fields")
                .to_compile_error()
                .into();
        }
    };

    let option_fields = fields.named.iter().filter_map(|field| {
        let field_name = field.ident.as_ref()?;
        let Type::Path(type_path) = &field.ty else {
            return None;
        };
        if type_path.path.segments.last()?.ident == "Option" {
            Some(field_name)
        } else {
            None
        }
    }).collect::<Vec<_>>();

    let checks = option_fields.iter().map(|field_name| {
        quote! {
            if self.#field_name.is_some() {
                fields.push(stringify!(#field_name));
            }
        }
    });
    let any_supplied = option_fields.iter().map(|field_name| {
        quote! { self.#field_name.is_some() }
    });

    let expanded = quote! {
        impl #struct_name {
            pub fn supplied_fields(&self) -> Vec<&'static str> {
                let mut fields = Vec::new();
                #(#checks)*
                fields
            }
            pub fn is_empty(&self) -> bool {
                !(false #(|| #any_supplied)*)
            }
        }
    };

    TokenStream::from(expanded)
}
