use proc_macro::TokenStream;
use quote::quote;
use syn;

pub fn impl_deser_macro(ast: &syn::DeriveInput) -> TokenStream {
    let name = ast.ident.clone();
    let is_tuple_struct = match ast.data {
        syn::Data::Struct(ref data) => matches!(data.fields, syn::Fields::Unnamed(_)),
        _ => false,
    };
    let statements: Vec<quote::__private::TokenStream> = match ast.data {
        syn::Data::Struct(ref data) => data
            .fields
            .iter()
            .zip(0..1_000_000)
            .map(|(field, index)| deserialize_field(field, index))
            .collect(),
        // Enums need context (a tag or the shape of the surrounding data) to
        // pick a variant, so their impls are written by hand.
        _ => unimplemented!(),
    };
    let expanded = if is_tuple_struct {
        quote! {
            impl ThunderboltDeserialize for #name {
                fn thunderbolt_deserialize<R: std::io::Read>(mut target: R) -> Result<Self, SerializationError>
                {
                    Ok(#name (
                        #(#statements)*
                    ))
                }
            }
        }
    } else {
        quote! {
            impl ThunderboltDeserialize for #name {
                fn thunderbolt_deserialize<R: std::io::Read>(mut target: R) -> Result<Self, SerializationError>
                {
                    Ok(#name {
                        #(#statements)*
                    })
                }
            }
        }
    };

    TokenStream::from(expanded)
}

fn deserialize_field(field: &syn::Field, _index: usize) -> quote::__private::TokenStream {
    let ty = field.ty.clone();
    match field.ident.clone() {
        Some(name) => {
            quote! { #name: <#ty as ThunderboltDeserialize>::thunderbolt_deserialize(&mut target)?, }
        }
        None => {
            quote! { <#ty as ThunderboltDeserialize>::thunderbolt_deserialize(&mut target)?, }
        }
    }
}
