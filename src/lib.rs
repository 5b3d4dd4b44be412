//! Cooperative multi-threaded bytecode VM with versioned save states.
//!
//! Provides the interpreter and frame scheduler, the save-state serializer,
//! an engine facade for replay tooling, and an assembler/disassembler pair.

pub mod core;
pub mod savestate;
pub mod types;
pub mod utils;
pub mod virtual_machine;
