//! Cooperative bytecode virtual machine.
//!
//! Up to 64 script threads share one variable store and one bytecode part.
//! Each host frame every runnable thread runs until it yields; requests a
//! thread makes about other threads (jump, pause, kill) are buffered and
//! committed at the start of the next frame.
//!
//! # Architecture
//!
//! - **Variables**: 256 signed 16-bit cells; arithmetic wraps
//! - **Threads**: 64 program counters plus pending requests, double-buffered
//! - **Call stack**: shared by all threads, emptied at the start of each slice
//! - **Instruction format**: one opcode byte with big-endian operands; two
//!   polygon instructions encode their operand shapes in the opcode bits
//! - **Budget**: a slice that never yields is aborted after a configurable
//!   number of instructions
//!
//! # Modules
//!
//! - [`assembler`]: Assembly parsing, diagnostics, and bytecode generation
//! - [`disasm`]: Bytecode listings in assembler syntax
//! - [`errors`]: Assembly and execution error types
//! - [`host`]: Collaborator traits (rendering, audio, resources, clock)
//! - [`input`]: Per-frame player input and its token form
//! - [`isa`]: Instruction set definition and opcode mappings
//! - [`program`]: Program container and bytecode cursor
//! - [`vm`]: Interpreter, frame scheduler and VM save states

pub mod assembler;
pub mod disasm;
pub mod errors;
pub mod host;
pub mod input;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod program;
pub mod vm;
