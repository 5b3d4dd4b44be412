use crate::savestate::StateError;
use crate::types::encoding::DecodeError;
use rawvm_derive::Error;

/// Errors raised while assembling, loading, or running bytecode.
///
/// Everything raised from inside a frame is fatal: the VM refuses to run
/// again until it is re-initialized (see [`VMError::Aborted`]).
#[derive(Debug, Error)]
pub enum VMError {
    /// Opcode byte above the table range that is not a polygon pattern.
    #[error("invalid instruction 0x{opcode:02X} at offset 0x{offset:04X}")]
    InvalidInstruction { opcode: u8, offset: usize },
    /// Fetch ran past the end of the part's bytecode.
    #[error(
        "unexpected end of bytecode at 0x{ip:04X}: requested {requested} byte(s), {available} available"
    )]
    UnexpectedEndOfBytecode {
        ip: usize,
        requested: usize,
        available: usize,
    },
    /// Program counter no longer fits the 16-bit thread table.
    #[error("invalid instruction pointer 0x{ip:X}")]
    InvalidIP { ip: usize },
    #[error("call stack overflow at offset 0x{offset:04X} (depth {depth})")]
    CallStackOverflow { offset: usize, depth: usize },
    #[error("call stack underflow at offset 0x{offset:04X}")]
    CallStackUnderflow { offset: usize },
    /// A slice ran too long without yielding.
    #[error("thread {thread} exceeded the instruction limit of {limit} without yielding")]
    InstructionLimitExceeded { thread: usize, limit: u64 },
    #[error("thread index {thread} out of range")]
    InvalidThread { thread: u8 },
    #[error("unknown part 0x{part:04X}")]
    UnknownPart { part: u16 },
    /// Raised by every entry point after a fatal error.
    #[error("virtual machine aborted after a fatal error")]
    Aborted,
    /// Malformed input token; the VM is untouched.
    #[error("invalid input token {token:?}: expected 5 characters of the form UDLRF with '.' for released buttons")]
    InvalidInput { token: String },
    #[error("save state error: {0}")]
    State(StateError),

    /// Unrecognized mnemonic during assembly.
    #[error("invalid instruction name: {name}")]
    InvalidInstructionName { name: String },
    #[error("{instruction} expects {expected} operand(s), got {actual}")]
    ArityMismatch {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    #[error("invalid operand {token:?}: expected {expected}")]
    InvalidOperand {
        token: String,
        expected: &'static str,
    },
    #[error("duplicate label: {label}")]
    DuplicateLabel { label: String },
    #[error("undefined label: {label}")]
    UndefinedLabel { label: String },
    #[error("invalid section header: {header}")]
    InvalidSection { header: String },
    /// Assembly error annotated with its source position.
    #[error("line {line}, column {offset}: {source}")]
    AssemblyError {
        line: usize,
        offset: usize,
        source: String,
    },
    #[error("io error on {path}: {message}")]
    IoError { path: String, message: String },
    #[error("decoding error: {reason}")]
    DecodeError { reason: String },
}

impl From<DecodeError> for VMError {
    fn from(err: DecodeError) -> Self {
        VMError::DecodeError {
            reason: format!("{err:?}"),
        }
    }
}

impl From<StateError> for VMError {
    fn from(err: StateError) -> Self {
        VMError::State(err)
    }
}

impl VMError {
    /// True for errors that leave the VM unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, VMError::InvalidInput { .. })
    }
}
