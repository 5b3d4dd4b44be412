//! Program containers and the bytecode cursor.
//!
//! [`Program`] is the on-disk form produced by the assembler: one bytecode
//! blob per game part. [`Script`] is what the interpreter reads from: a shared
//! handle on one part's bytecode plus a plain offset, so the program counter
//! is always region-relative.

use crate::types::bytes::Bytes;
use crate::types::encoding::{Decode, Encode};
use crate::virtual_machine::errors::VMError;
use rawvm_derive::BinaryCodec;

/// Magic bytes identifying a serialized program.
const MAGIC: &[u8; 4] = b"RAWP";

/// Current program format version.
const CURRENT_VERSION: Version = Version::new(1, 0);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, BinaryCodec)]
struct Version {
    major: u8,
    minor: u8,
}

impl Version {
    const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

/// Bytecode of one part.
#[derive(Debug, Clone, PartialEq, Eq, BinaryCodec)]
pub struct Part {
    pub id: u16,
    pub bytecode: Bytes,
}

/// Assembled program: the bytecode of every part it defines.
#[derive(Debug, Clone, Default, PartialEq, Eq, BinaryCodec)]
pub struct Program {
    pub parts: Vec<Part>,
}

impl Program {
    pub fn part(&self, id: u16) -> Option<&Part> {
        self.parts.iter().find(|part| part.id == id)
    }

    /// Serializes the program with a magic header and version.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        MAGIC.encode(&mut out);
        CURRENT_VERSION.encode(&mut out);
        self.encode(&mut out);
        out
    }

    /// Parses a serialized program, rejecting unknown major versions.
    pub fn from_bytes(mut input: &[u8]) -> Result<Self, VMError> {
        if input.len() < MAGIC.len() {
            return Err(VMError::DecodeError {
                reason: "truncated".to_string(),
            });
        }
        if &<[u8; 4]>::decode(&mut input)? != MAGIC {
            return Err(VMError::DecodeError {
                reason: "bad magic".to_string(),
            });
        }
        let version = Version::decode(&mut input)?;
        if version.major != CURRENT_VERSION.major || version > CURRENT_VERSION {
            return Err(VMError::DecodeError {
                reason: format!("unsupported version {}.{}", version.major, version.minor),
            });
        }
        let program = Program::decode(&mut input)?;
        if !input.is_empty() {
            return Err(VMError::DecodeError {
                reason: "trailing bytes".to_string(),
            });
        }
        Ok(program)
    }
}

/// Read cursor over one part's bytecode.
///
/// Every fetch is bounds-checked; running off the end is fatal rather than
/// wrapping.
#[derive(Debug, Clone, Default)]
pub struct Script {
    code: Bytes,
    pc: usize,
}

impl Script {
    pub fn new(code: Bytes) -> Self {
        Self { code, pc: 0 }
    }

    pub fn code(&self) -> &Bytes {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn jump(&mut self, offset: u16) {
        self.pc = offset as usize;
    }

    /// Program counter in the 16-bit form the thread table stores.
    pub fn pc_u16(&self) -> Result<u16, VMError> {
        u16::try_from(self.pc).map_err(|_| VMError::InvalidIP { ip: self.pc })
    }

    /// Reads exactly `count` bytes and advances past them.
    pub fn read_exact(&mut self, count: usize) -> Result<&[u8], VMError> {
        let start = self.pc;
        let end = start
            .checked_add(count)
            .ok_or(VMError::InvalidIP { ip: start })?;
        let available = self.code.len().saturating_sub(start);
        let slice = self
            .code
            .get(start..end)
            .ok_or(VMError::UnexpectedEndOfBytecode {
                ip: start,
                requested: count,
                available,
            })?;
        self.pc = end;
        Ok(slice)
    }

    pub fn fetch_byte(&mut self) -> Result<u8, VMError> {
        Ok(self.read_exact(1)?[0])
    }

    /// Big-endian 16-bit fetch.
    pub fn fetch_word(&mut self) -> Result<u16, VMError> {
        let bytes = self.read_exact(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_word_is_big_endian() {
        let mut script = Script::new(Bytes::from(vec![0x12, 0x34, 0xAB]));
        assert_eq!(script.fetch_word().unwrap(), 0x1234);
        assert_eq!(script.fetch_byte().unwrap(), 0xAB);
        assert_eq!(script.pc(), 3);
    }

    #[test]
    fn fetch_past_end_is_error() {
        let mut script = Script::new(Bytes::from(vec![0x01]));
        assert!(matches!(
            script.fetch_word(),
            Err(VMError::UnexpectedEndOfBytecode {
                ip: 0,
                requested: 2,
                available: 1
            })
        ));
        assert_eq!(script.pc(), 0);
    }

    #[test]
    fn jump_moves_the_cursor() {
        let mut script = Script::new(Bytes::from(vec![1, 2, 3, 4]));
        script.jump(2);
        assert_eq!(script.fetch_byte().unwrap(), 3);
        script.jump(0);
        assert_eq!(script.fetch_byte().unwrap(), 1);
    }

    #[test]
    fn pc_beyond_u16_is_invalid() {
        let mut script = Script::new(Bytes::from(vec![0u8; 0x10001]));
        script.read_exact(0x10000).unwrap();
        assert!(matches!(script.pc_u16(), Err(VMError::InvalidIP { ip: 0x10000 })));
    }

    #[test]
    fn program_roundtrip_and_lookup() {
        let program = Program {
            parts: vec![
                Part {
                    id: 0x3E80,
                    bytecode: Bytes::from(vec![0x06]),
                },
                Part {
                    id: 0x3E81,
                    bytecode: Bytes::from(vec![0x11, 0x06]),
                },
            ],
        };
        let bytes = program.to_bytes();
        assert_eq!(&bytes[..4], b"RAWP");
        let decoded = Program::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, program);
        assert_eq!(decoded.part(0x3E81).unwrap().bytecode.as_slice(), &[0x11, 0x06]);
        assert!(decoded.part(0x3E82).is_none());
    }

    #[test]
    fn program_rejects_bad_magic_and_trailing_bytes() {
        let mut bytes = Program::default().to_bytes();
        bytes.push(0);
        assert!(matches!(
            Program::from_bytes(&bytes),
            Err(VMError::DecodeError { .. })
        ));
        bytes[0] = b'X';
        assert!(Program::from_bytes(&bytes).is_err());
    }
}
