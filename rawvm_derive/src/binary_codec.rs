//! `#[derive(BinaryCodec)]` for structs.
//!
//! Fields are written in declaration order through `crate::types::encoding`,
//! so the derive only works inside the `rawvm` crate itself. Enums and unions
//! are rejected: every container the crate persists is a plain struct.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data_struct) = &input.data else {
        return syn::Error::new_spanned(&input, "BinaryCodec derive only supports structs")
            .to_compile_error()
            .into();
    };

    let (encode_body, decode_body) = match &data_struct.fields {
        Fields::Named(fields) => {
            let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
            (
                quote! {
                    #( crate::types::encoding::Encode::encode(&self.#names, out); )*
                },
                quote! {
                    Ok(Self {
                        #( #names: crate::types::encoding::Decode::decode(input)?, )*
                    })
                },
            )
        }
        Fields::Unnamed(fields) => {
            let indices: Vec<_> = (0..fields.unnamed.len()).map(syn::Index::from).collect();
            let decoders = indices.iter().map(|_| {
                quote! { crate::types::encoding::Decode::decode(input)?, }
            });
            (
                quote! {
                    #( crate::types::encoding::Encode::encode(&self.#indices, out); )*
                },
                quote! {
                    Ok(Self( #(#decoders)* ))
                },
            )
        }
        Fields::Unit => (quote! { let _ = out; }, quote! { let _ = input; Ok(Self) }),
    };

    quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    }
    .into()
}
