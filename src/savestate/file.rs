//! On-disk save-state container.

use crate::savestate::{CURRENT_STATE_VERSION, StateError};
use crate::types::encoding::{Decode, Encode};
use crate::types::hash::Hash;
use rawvm_derive::BinaryCodec;

/// Magic bytes identifying a serialized save state.
const MAGIC: &[u8; 4] = b"RAWS";

/// A save state plus the metadata needed to load it back.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct StateFile {
    /// Format version the payload was written with.
    pub version: u16,
    /// Part that was running when the state was taken.
    pub part: u16,
    /// Raw serializer output.
    pub payload: Vec<u8>,
}

impl StateFile {
    pub fn new(part: u16, payload: Vec<u8>) -> Self {
        Self {
            version: CURRENT_STATE_VERSION,
            part,
            payload,
        }
    }

    pub fn payload_hash(&self) -> Hash {
        let mut h = Hash::sha3();
        h.update(&self.payload);
        h.finalize()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        MAGIC.encode(&mut out);
        self.encode(&mut out);
        out
    }

    /// Parses a container, rejecting versions newer than this build.
    pub fn from_bytes(mut input: &[u8]) -> Result<Self, StateError> {
        let corrupt = |reason: &str| StateError::Corrupt {
            reason: reason.to_string(),
        };

        let magic = <[u8; 4]>::decode(&mut input).map_err(|_| corrupt("truncated"))?;
        if &magic != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let file = StateFile::decode(&mut input).map_err(|e| corrupt(&format!("{e:?}")))?;
        if !input.is_empty() {
            return Err(corrupt("trailing bytes"));
        }
        if file.version == 0 || file.version > CURRENT_STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                version: file.version,
                current: CURRENT_STATE_VERSION,
            });
        }
        Ok(file)
    }
}
