//! Save states of the VM block and the state hash.
//!
//! Layout, all little-endian: the variable store (256 words), the call stack
//! slots (256 words), both program counter rows of the thread table (2 x 64
//! words), then both paused rows (2 x 64 bytes).

use super::{HASH_EXCLUDED_BYTE, SpecialKeys, VirtualMachine};
use crate::savestate::{CURRENT_STATE_VERSION, Entry, Serializer, StateError};
use crate::types::hash::Hash;

impl VirtualMachine {
    /// Entries of the VM block, terminated by [`Entry::End`].
    pub fn state_entries(&mut self) -> Vec<Entry<'_>> {
        let [pcs, paused] = self.threads.entries();
        vec![
            self.variables.entry(),
            self.call_stack.entry(),
            pcs,
            paused,
            Entry::End,
        ]
    }

    /// Saves or loads the VM block at the serializer's cursor.
    pub fn save_or_load(&mut self, serializer: &mut Serializer<'_>) -> Result<(), StateError> {
        serializer.save_or_load(&mut self.state_entries())
    }

    /// Bytes the VM block takes at `version`.
    pub fn state_size(&mut self, version: u16) -> usize {
        let serializer = Serializer::counter(version);
        serializer.measure(&self.state_entries())
    }

    /// Writes the VM block at the current version into `buffer` and returns
    /// the byte count. With no buffer only the count is computed.
    pub fn serialize_state(&mut self, buffer: Option<&mut [u8]>) -> Result<usize, StateError> {
        let mut serializer = match buffer {
            Some(buffer) => Serializer::saver(buffer, CURRENT_STATE_VERSION),
            None => Serializer::counter(CURRENT_STATE_VERSION),
        };
        self.save_or_load(&mut serializer)?;
        Ok(serializer.bytes_count())
    }

    /// Loads a VM block written at the current version.
    pub fn deserialize_state(&mut self, buffer: &[u8]) -> Result<usize, StateError> {
        self.deserialize_state_version(buffer, CURRENT_STATE_VERSION)
    }

    /// Loads a VM block written at `version`. The buffer must hold exactly
    /// one block; nothing is modified when it does not.
    ///
    /// A successful load replaces every field a fatal error could have left
    /// inconsistent, so it also clears the aborted flag. Pending part
    /// switches and special keys belong to the frames before the load and
    /// are dropped.
    pub fn deserialize_state_version(&mut self, buffer: &[u8], version: u16) -> Result<usize, StateError> {
        if version == 0 || version > CURRENT_STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                version,
                current: CURRENT_STATE_VERSION,
            });
        }
        let expected = self.state_size(version);
        if buffer.len() != expected {
            return Err(StateError::SizeMismatch {
                expected,
                actual: buffer.len(),
            });
        }

        let mut serializer = Serializer::loader(buffer, version);
        self.save_or_load(&mut serializer)?;
        self.call_stack.reset_depth();
        self.requested_part = None;
        self.keys = SpecialKeys::default();
        self.aborted = false;
        Ok(serializer.bytes_count())
    }

    /// SHA3-256 of the little-endian variable store, skipping
    /// [`HASH_EXCLUDED_BYTE`].
    pub fn state_hash(&self) -> Hash {
        let bytes = self.variables.to_le_bytes();
        let mut hasher = Hash::sha3();
        hasher.update(&bytes[..HASH_EXCLUDED_BYTE]);
        hasher.update(&bytes[HASH_EXCLUDED_BYTE + 1..]);
        hasher.finalize()
    }
}
