//! Thread table and call stack.
//!
//! Each of the 64 threads has a current program counter and paused flag,
//! plus a requested value of each. Opcodes only ever write the requested
//! side; [`ThreadTable::commit_requests`] copies it over at the start of a
//! frame, so pause, resume and jump requests never take effect mid-frame.

use crate::savestate::{ElementSize, Entry, VersionRange};
use crate::virtual_machine::errors::VMError;

pub const NUM_THREADS: usize = 64;
/// Program counter of a thread that does not run.
pub const INACTIVE_THREAD: u16 = 0xFFFF;
/// Requested program counter meaning "no request".
pub const NO_REQUEST: u16 = 0xFFFF;
/// Requested program counter meaning "deactivate".
pub const DEACTIVATE_REQUEST: u16 = 0xFFFE;

pub const CALL_STACK_SIZE: usize = 256;

const CURRENT: usize = 0;
const REQUESTED: usize = 1;

/// Double-buffered thread state. Row [`CURRENT`] is what the scheduler runs,
/// row [`REQUESTED`] collects writes made during the frame.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ThreadTable {
    pcs: [[u16; NUM_THREADS]; 2],
    paused: [[u8; NUM_THREADS]; 2],
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadTable {
    /// Every thread inactive, no requests, nothing paused.
    pub fn new() -> Self {
        Self {
            pcs: [[INACTIVE_THREAD; NUM_THREADS]; 2],
            paused: [[0; NUM_THREADS]; 2],
        }
    }

    /// Hard reset used by a part switch: thread 0 starts at offset 0.
    pub fn reset_for_part(&mut self) {
        *self = Self::new();
        self.pcs[CURRENT][0] = 0;
    }

    /// Applies pending pause flags and jump requests.
    pub fn commit_requests(&mut self) {
        for thread in 0..NUM_THREADS {
            self.paused[CURRENT][thread] = self.paused[REQUESTED][thread];

            let requested = self.pcs[REQUESTED][thread];
            if requested != NO_REQUEST {
                self.pcs[CURRENT][thread] = if requested == DEACTIVATE_REQUEST {
                    INACTIVE_THREAD
                } else {
                    requested
                };
                self.pcs[REQUESTED][thread] = NO_REQUEST;
            }
        }
    }

    pub fn pc(&self, thread: usize) -> u16 {
        self.pcs[CURRENT][thread]
    }

    pub fn set_pc(&mut self, thread: usize, pc: u16) {
        self.pcs[CURRENT][thread] = pc;
    }

    pub fn requested_pc(&self, thread: usize) -> u16 {
        self.pcs[REQUESTED][thread]
    }

    pub fn is_paused(&self, thread: usize) -> bool {
        self.paused[CURRENT][thread] != 0
    }

    pub fn is_pause_requested(&self, thread: usize) -> bool {
        self.paused[REQUESTED][thread] != 0
    }

    /// True when the scheduler should give the thread a slice.
    pub fn is_runnable(&self, thread: usize) -> bool {
        !self.is_paused(thread) && self.pc(thread) != INACTIVE_THREAD
    }

    /// Requests a jump (or [`DEACTIVATE_REQUEST`]) for the next frame.
    pub fn request_pc(&mut self, thread: u8, pc: u16) -> Result<(), VMError> {
        let slot = self
            .pcs[REQUESTED]
            .get_mut(thread as usize)
            .ok_or(VMError::InvalidThread { thread })?;
        *slot = pc;
        Ok(())
    }

    pub fn request_pause(&mut self, thread: u8, paused: bool) -> Result<(), VMError> {
        let slot = self
            .paused[REQUESTED]
            .get_mut(thread as usize)
            .ok_or(VMError::InvalidThread { thread })?;
        *slot = paused as u8;
        Ok(())
    }

    /// Number of threads with a program counter.
    pub fn active_count(&self) -> usize {
        self.pcs[CURRENT]
            .iter()
            .filter(|pc| **pc != INACTIVE_THREAD)
            .count()
    }

    /// Save-state entries: both program counter rows, then both paused rows.
    pub(crate) fn entries(&mut self) -> [Entry<'_>; 2] {
        [
            Entry::array(self.pcs.as_flattened_mut(), ElementSize::Word, VersionRange::since(1)),
            Entry::array(self.paused.as_flattened_mut(), ElementSize::Byte, VersionRange::since(1)),
        ]
    }
}

/// Return offsets for `CALL`/`RET`.
///
/// Depth is reset at the start of every slice; the slots themselves are left
/// alone and are part of the save state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallStack {
    slots: [u16; CALL_STACK_SIZE],
    depth: usize,
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStack {
    pub fn new() -> Self {
        Self {
            slots: [0; CALL_STACK_SIZE],
            depth: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn reset_depth(&mut self) {
        self.depth = 0;
    }

    /// Clears slots and depth.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn slots(&self) -> &[u16] {
        &self.slots
    }

    /// Pushes a return offset; `at` is the offset of the `CALL` for errors.
    pub fn push(&mut self, return_to: u16, at: usize) -> Result<(), VMError> {
        if self.depth >= CALL_STACK_SIZE {
            return Err(VMError::CallStackOverflow {
                offset: at,
                depth: self.depth,
            });
        }
        self.slots[self.depth] = return_to;
        self.depth += 1;
        Ok(())
    }

    pub fn pop(&mut self, at: usize) -> Result<u16, VMError> {
        if self.depth == 0 {
            return Err(VMError::CallStackUnderflow { offset: at });
        }
        self.depth -= 1;
        Ok(self.slots[self.depth])
    }

    pub(crate) fn entry(&mut self) -> Entry<'_> {
        Entry::array(&mut self.slots, ElementSize::Word, VersionRange::since(1))
    }
}
