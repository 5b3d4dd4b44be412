//! Shared value types.
//!
//! - `Bytes`: reference-counted bytecode blobs handed from the resource
//!   collaborator to the VM
//! - `Hash`: SHA3-256 digests used to fingerprint VM state
//! - `encoding`: little-endian binary codec behind `#[derive(BinaryCodec)]`

pub mod bytes;
pub mod encoding;
pub mod hash;
