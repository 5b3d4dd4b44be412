//! SHA3-256 digests.

use crate::types::encoding::EncodeSink;
use rawvm_derive::BinaryCodec;
use sha3::{Digest, Sha3_256};
use std::fmt;

pub const HASH_LEN: usize = 32;

/// 32-byte SHA3-256 digest.
///
/// Two runs that fed the same inputs from the same starting state must
/// produce equal state hashes, which is what replay and re-record tooling
/// compares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec, Default, Hash)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    pub fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn sha3() -> HashBuilder {
        HashBuilder::new()
    }

    /// Shortened hex form used in CLI output.
    pub fn short(&self) -> String {
        self.0[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Incremental hasher; also an [`EncodeSink`] so encodable values can be
/// hashed without an intermediate buffer.
pub struct HashBuilder {
    hasher: Sha3_256,
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HashBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Sha3_256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::Encode;

    #[test]
    fn incremental_matches_one_shot() {
        let mut a = Hash::sha3();
        a.update(b"raw");
        a.update(b"vm");
        let mut b = Hash::sha3();
        b.update(b"rawvm");
        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn encode_sink_feeds_hasher() {
        let mut a = Hash::sha3();
        0x1234u16.encode(&mut a);
        let mut b = Hash::sha3();
        b.update(&[0x34, 0x12]);
        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn display_and_short_are_hex() {
        let hash = Hash([0xAB; HASH_LEN]);
        assert_eq!(hash.to_string().len(), 64);
        assert_eq!(hash.short(), "abababababababab");
        assert_ne!(hash, Hash::zero());
    }
}
