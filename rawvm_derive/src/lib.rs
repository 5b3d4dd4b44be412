//! Derive macros for the rawvm crate.
//!
//! Provides:
//! - `#[derive(BinaryCodec)]` - binary encoding for program and save-state containers
//! - `#[derive(Error)]` - `Display` and `Error` boilerplate for error enums

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` for a struct, field by field.
#[proc_macro_derive(BinaryCodec)]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display` and `Error` from `#[error("...")]` attributes.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
