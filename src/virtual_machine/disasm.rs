//! Bytecode listing.
//!
//! Decodes a part's bytecode linearly, one instruction per line, in the
//! assembler's syntax. Jump targets are printed as absolute offsets.

use crate::virtual_machine::assembler::{POLY_BACKGROUND, POLY_SPRITE};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{
    Instruction, OperandKind, POLY_A_BIT, POLY_B_BIT, range_size,
};
use crate::virtual_machine::program::Script;
use crate::types::bytes::Bytes;
use std::fmt;

const COMPARISONS: [&str; 6] = ["==", "!=", ">", ">=", "<", "<="];

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub offset: usize,
    pub bytes: Vec<u8>,
    pub text: String,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: Vec<String> = self.bytes.iter().map(|b| format!("{b:02X}")).collect();
        write!(f, "{:04X}  {:<21} {}", self.offset, hex.join(" "), self.text)
    }
}

/// Decodes every instruction of `code`.
pub fn disassemble(code: &Bytes) -> Result<Vec<Line>, VMError> {
    let mut script = Script::new(code.clone());
    let mut lines = Vec::new();
    while script.pc() < script.len() {
        let offset = script.pc();
        let text = decode_one(&mut script)?;
        lines.push(Line {
            offset,
            bytes: code[offset..script.pc()].to_vec(),
            text,
        });
    }
    Ok(lines)
}

/// Renders a full listing, one line per instruction.
pub fn listing(code: &Bytes) -> Result<String, VMError> {
    let mut out = String::new();
    for line in disassemble(code)? {
        out.push_str(&line.to_string());
        out.push('\n');
    }
    Ok(out)
}

fn decode_one(script: &mut Script) -> Result<String, VMError> {
    let offset = script.pc();
    let opcode = script.fetch_byte()?;

    if opcode & POLY_A_BIT != 0 {
        let low = script.fetch_byte()?;
        let halved = (((opcode & !POLY_A_BIT) as u16) << 8) | low as u16;
        let x = script.fetch_byte()?;
        let y = script.fetch_byte()?;
        return Ok(format!("{POLY_BACKGROUND} 0x{:04X}, {x}, {y}", halved as u32 * 2));
    }
    if opcode & POLY_B_BIT != 0 {
        return decode_poly_sprite(script, opcode);
    }

    let instr = Instruction::try_from(opcode)
        .map_err(|_| VMError::InvalidInstruction { opcode, offset })?;
    let mut operands = Vec::with_capacity(instr.operands().len());
    for kind in instr.operands() {
        operands.push(match kind {
            OperandKind::Var => format!("v{}", script.fetch_byte()?),
            OperandKind::Byte => script.fetch_byte()?.to_string(),
            OperandKind::Word => (script.fetch_word()? as i16).to_string(),
            OperandKind::Addr => format!("0x{:04X}", script.fetch_word()?),
            OperandKind::Cond => decode_condition(script)?,
            OperandKind::Range => decode_range(script)?,
        });
    }

    if operands.is_empty() {
        Ok(instr.mnemonic().to_string())
    } else {
        Ok(format!("{} {}", instr.mnemonic(), operands.join(", ")))
    }
}

fn decode_condition(script: &mut Script) -> Result<String, VMError> {
    let cond = script.fetch_byte()?;
    let var = script.fetch_byte()?;
    let rhs = if cond & 0x80 != 0 {
        format!("v{}", script.fetch_byte()?)
    } else if cond & 0x40 != 0 {
        (script.fetch_word()? as i16).to_string()
    } else {
        script.fetch_byte()?.to_string()
    };
    let target = script.fetch_word()?;
    let op = COMPARISONS
        .get((cond & 7) as usize)
        .map(|op| op.to_string())
        .unwrap_or_else(|| format!("?{}", cond & 7));
    Ok(format!("v{var} {op} {rhs}, 0x{target:04X}"))
}

/// Empty ranges carry no action byte; they list with action 0, which
/// assembles back to the same two bytes.
fn decode_range(script: &mut Script) -> Result<String, VMError> {
    let first = script.fetch_byte()?;
    let last = script.fetch_byte()?;
    let action = if range_size(first, last) == 3 {
        script.fetch_byte()?
    } else {
        0
    };
    Ok(format!("{first}, {last}, {action}"))
}

fn decode_poly_sprite(script: &mut Script, opcode: u8) -> Result<String, VMError> {
    let offset = script.fetch_word()? as u32 * 2;

    let x = match (opcode & 0x20 != 0, opcode & 0x10 != 0) {
        (false, false) => (script.fetch_word()? as i16).to_string(),
        (false, true) => format!("v{}", script.fetch_byte()?),
        (true, false) => script.fetch_byte()?.to_string(),
        (true, true) => (script.fetch_byte()? as u16 + 0x100).to_string(),
    };
    let y = match (opcode & 0x08 != 0, opcode & 0x04 != 0) {
        (false, false) => (script.fetch_word()? as i16).to_string(),
        (false, true) => format!("v{}", script.fetch_byte()?),
        (true, _) => script.fetch_byte()?.to_string(),
    };
    let zoom = match opcode & 0x03 {
        0b00 => None,
        0b01 => Some(format!("v{}", script.fetch_byte()?)),
        0b10 => Some(script.fetch_byte()?.to_string()),
        _ => Some("alt".to_string()),
    };

    let mut text = format!("{POLY_SPRITE} 0x{offset:04X}, {x}, {y}");
    if let Some(zoom) = zoom {
        text.push_str(", ");
        text.push_str(&zoom);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::assembler::assemble_source;

    const SOURCE: &str = r#"
    start:
        SET v16, 0x1234
        JMP_IF v16 != v2, start
        JMP_IF v1 < -1, start
        POLY_BG 0x2468, 10, 250
        POLY 0x10, 300, v2, v3
        POLY 0x10, -5, 7, alt
        RESET_THREADS 1, 63, 2
        RESET_THREADS 9, 3, 0
        PAUSE
    "#;

    fn texts(code: &Bytes) -> Vec<String> {
        disassemble(code)
            .unwrap()
            .into_iter()
            .map(|line| line.text)
            .collect()
    }

    #[test]
    fn decodes_in_assembler_syntax() {
        let program = assemble_source(SOURCE).unwrap();
        assert_eq!(
            texts(&program.parts[0].bytecode),
            vec![
                "SET v16, 4660",
                "JMP_IF v16 != v2, 0x0000",
                "JMP_IF v1 < -1, 0x0000",
                "POLY_BG 0x2468, 10, 250",
                "POLY 0x0010, 300, v2, v3",
                "POLY 0x0010, -5, 7, alt",
                "RESET_THREADS 1, 63, 2",
                "RESET_THREADS 9, 3, 0",
                "PAUSE",
            ]
        );
    }

    #[test]
    fn listing_reassembles_to_same_bytes() {
        let program = assemble_source(SOURCE).unwrap();
        let code = &program.parts[0].bytecode;
        let source: Vec<String> = texts(code);
        let again = assemble_source(source.join("\n")).unwrap();
        assert_eq!(again.parts[0].bytecode, *code);
    }

    #[test]
    fn listing_shows_offsets_and_bytes() {
        let code = Bytes::from(vec![0x06, 0x11]);
        let out = listing(&code).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000  06"));
        assert!(lines[0].ends_with("PAUSE"));
        assert!(lines[1].starts_with("0001  11"));
    }

    #[test]
    fn invalid_opcode_is_reported_with_offset() {
        let code = Bytes::from(vec![0x06, 0x1B]);
        assert!(matches!(
            disassemble(&code),
            Err(VMError::InvalidInstruction {
                opcode: 0x1B,
                offset: 1
            })
        ));
    }

    #[test]
    fn empty_thread_range_is_two_bytes() {
        let code = Bytes::from(vec![0x0C, 9, 3, 0x06]);
        let lines = disassemble(&code).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].bytes, vec![0x0C, 9, 3]);
        assert_eq!(lines[1].offset, 3);
        assert_eq!(lines[1].text, "PAUSE");
    }

    #[test]
    fn truncated_operand_is_reported() {
        let code = Bytes::from(vec![0x00, 0x01]);
        assert!(matches!(
            disassemble(&code),
            Err(VMError::UnexpectedEndOfBytecode { .. })
        ));
    }
}
