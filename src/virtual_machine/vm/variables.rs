//! The 256-entry variable store and its reserved indices.

use crate::savestate::{ElementSize, Entry, VersionRange};

pub const NUM_VARIABLES: usize = 256;

// Reserved indices. Scripts may read any of them; the names document which
// ones the engine itself writes.

/// Seed for script-side pseudo random numbers; zero after init.
pub const VAR_RANDOM_SEED: u8 = 0x3C;
/// Engine flag set to 0x81 at init.
pub const VAR_ENGINE_FLAG: u8 = 0x54;
/// Checked when the code key is pressed.
pub const VAR_SPECIAL_KEY_CHECK: u8 = 0xC9;
/// Last typed character on the password screen.
pub const VAR_LAST_KEYCHAR: u8 = 0xDA;
/// Set to 0x14 on every part switch.
pub const VAR_PART_FLAG: u8 = 0xE4;
pub const VAR_HERO_POS_UP_DOWN: u8 = 0xE5;
/// Written from the music sequencer's mark.
pub const VAR_MUS_MARK: u8 = 0xF4;
/// Cleared by every `BLIT`.
pub const VAR_BLIT_FLAG: u8 = 0xF7;
/// Vertical scroll passed to `COPY_PAGE`.
pub const VAR_SCROLL_Y: u8 = 0xF9;
pub const VAR_HERO_ACTION: u8 = 0xFA;
pub const VAR_HERO_POS_JUMP_DOWN: u8 = 0xFB;
pub const VAR_HERO_POS_LEFT_RIGHT: u8 = 0xFC;
pub const VAR_HERO_POS_MASK: u8 = 0xFD;
pub const VAR_HERO_ACTION_POS_MASK: u8 = 0xFE;
/// Frame pacing in 20ms slices.
pub const VAR_PAUSE_SLICES: u8 = 0xFF;

/// Value of [`VAR_ENGINE_FLAG`] after init.
pub const ENGINE_FLAG_INIT: i16 = 0x81;
/// Value of [`VAR_PART_FLAG`] after a part switch.
pub const PART_FLAG_INIT: i16 = 0x14;

/// Byte offset, in the little-endian image of the store, excluded from the
/// state hash: the low byte of variable 0xC7.
pub const HASH_EXCLUDED_BYTE: usize = 0x18E;

/// Global signed 16-bit variables shared by every thread.
///
/// A `u8` index cannot go out of range, so accessors are infallible.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Variables {
    vars: [i16; NUM_VARIABLES],
}

impl Default for Variables {
    fn default() -> Self {
        Self::new()
    }
}

impl Variables {
    /// Zero-filled store with the init seed values applied.
    pub fn new() -> Self {
        let mut vars = Self {
            vars: [0; NUM_VARIABLES],
        };
        vars.reset();
        vars
    }

    pub fn reset(&mut self) {
        self.vars = [0; NUM_VARIABLES];
        self.set(VAR_ENGINE_FLAG, ENGINE_FLAG_INIT);
        self.set(VAR_RANDOM_SEED, 0);
    }

    #[inline(always)]
    pub fn get(&self, idx: u8) -> i16 {
        self.vars[idx as usize]
    }

    #[inline(always)]
    pub fn set(&mut self, idx: u8, value: i16) {
        self.vars[idx as usize] = value;
    }

    /// Unsigned view of a variable, as used by the bitwise opcodes.
    pub fn get_u16(&self, idx: u8) -> u16 {
        self.get(idx) as u16
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.vars
    }

    /// Little-endian image of the store.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.vars.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    pub(crate) fn entry(&mut self) -> Entry<'_> {
        Entry::array(&mut self.vars, ElementSize::Word, VersionRange::since(1))
    }
}
