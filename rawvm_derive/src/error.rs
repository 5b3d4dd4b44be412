//! `#[derive(Error)]` for enums and structs.
//!
//! ```ignore
//! use rawvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum StateError {
//!     #[error("buffer too small: need {needed} bytes, have {available}")]
//!     BufferTooSmall { needed: usize, available: usize },
//!
//!     #[error("corrupt state: {0}")]
//!     Corrupt(String),
//!
//!     #[error("state is empty")]
//!     Empty,
//! }
//! ```
//!
//! Tuple fields are referenced as `{0}`, `{1}`; named fields by name. Every
//! field must appear in the message because the fields are passed to `write!`
//! as named arguments.

use proc_macro::TokenStream;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Enum(data_enum) => {
            let arms = data_enum
                .variants
                .iter()
                .map(|variant| {
                    let ident = &variant.ident;
                    let message =
                        message_from_attrs(&variant.attrs, ident, &format!("variant `{ident}`"))?;
                    Ok(match &variant.fields {
                        Fields::Unit => quote! {
                            Self::#ident => write!(f, #message),
                        },
                        Fields::Unnamed(fields) => {
                            let bindings: Vec<_> =
                                (0..fields.unnamed.len()).map(|i| format_ident!("f{}", i)).collect();
                            let message = positional_to_named(&message, bindings.len());
                            quote! {
                                Self::#ident(#(#bindings),*) => write!(f, #message, #(#bindings = #bindings),*),
                            }
                        }
                        Fields::Named(fields) => {
                            let bindings: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                            quote! {
                                Self::#ident { #(#bindings),* } => write!(f, #message, #(#bindings = #bindings),*),
                            }
                        }
                    })
                })
                .collect::<syn::Result<Vec<_>>>()?;
            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(data_struct) => {
            let message = message_from_attrs(&input.attrs, name, &format!("type `{name}`"))?;
            match &data_struct.fields {
                Fields::Unit => quote! { write!(f, #message) },
                Fields::Named(fields) => {
                    let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                    quote! { write!(f, #message, #(#names = self.#names),*) }
                }
                Fields::Unnamed(fields) => {
                    let bindings: Vec<_> =
                        (0..fields.unnamed.len()).map(|i| format_ident!("f{}", i)).collect();
                    let indices: Vec<_> = (0..fields.unnamed.len()).map(syn::Index::from).collect();
                    let message = positional_to_named(&message, bindings.len());
                    quote! { write!(f, #message, #(#bindings = self.#indices),*) }
                }
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Returns the string literal of the `#[error("...")]` attribute.
fn message_from_attrs<T: ToTokens>(
    attrs: &[syn::Attribute],
    target: &T,
    target_desc: &str,
) -> syn::Result<String> {
    let Some(attr) = attrs.iter().find(|attr| attr.path().is_ident("error")) else {
        return Err(syn::Error::new_spanned(
            target,
            format!("missing #[error(\"...\")] attribute on {target_desc}"),
        ));
    };
    let Meta::List(list) = &attr.meta else {
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")]",
        ));
    };
    match syn::parse2::<Lit>(list.tokens.clone()) {
        Ok(Lit::Str(lit)) => Ok(lit.value()),
        _ => Err(syn::Error::new_spanned(
            &attr.meta,
            "#[error] message must be a string literal",
        )),
    }
}

/// Rewrites `{0}`, `{1:?}` into `{f0}`, `{f1:?}`.
fn positional_to_named(message: &str, count: usize) -> String {
    let mut out = message.to_string();
    for i in (0..count).rev() {
        out = out
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    out
}
