//! Assembly language parser and bytecode compiler.
//!
//! Converts human-readable assembly source into a [`Program`].
//! Uses [`for_each_instruction!`](for_each_instruction) to generate the
//! table-driven part of `parse_instruction`; the two polygon forms are parsed
//! by hand because their encoding lives in the opcode bits.
//!
//! # Syntax
//!
//! ```text
//! [ part 0x3E80 ]              # starts the bytecode of a part
//! loop:                        # label, local to its part
//!     SET v16, 10              # vN is variable N
//!     JMP_IF v16 >= 0x20, loop # ==, !=, >, >=, <, <= against vN or a number
//!     POLY_BG 0x1200, 40, 60   # variant A: even offset, x, y
//!     POLY 0x0400, v1, 250, v3 # variant B: offset, x, y [, zoom | vN | alt]
//!     PAUSE
//! ```
//!
//! - Instructions are uppercase mnemonics from the opcode table
//! - Immediates are decimal or `0x` hex, optionally negative
//! - Comments start with `#`
//! - Commas between operands are optional
//! - Code before any section marker belongs to the first game part

use crate::for_each_instruction;
use crate::types::bytes::Bytes;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, POLY_A_BIT, POLY_B_BIT, range_size};
use crate::virtual_machine::program::{Part, Program};
use crate::virtual_machine::vm::GAME_PART_FIRST;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const LABEL_SUFFIX: char = ':';
const SECTION_KEYWORD: &str = "part";
const VAR_PREFIX: char = 'v';

/// Mnemonic of polygon variant A.
pub const POLY_BACKGROUND: &str = "POLY_BG";
/// Mnemonic of polygon variant B.
pub const POLY_SPRITE: &str = "POLY";
/// Keyword selecting the alternate polygon buffer in `POLY`.
const ALT_BUFFER: &str = "alt";

/// Formats a compiler-style diagnostic for assembly failures.
fn render_assembly_diagnostic(
    file: &str,
    source: &str,
    line: usize,
    offset: usize,
    message: &str,
) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Emit a diagnostic to stderr for assembly errors.
fn log_assembly_error(file: &str, source: &str, err: &VMError) {
    if let VMError::AssemblyError {
        line,
        offset,
        source: message,
    } = err
    {
        eprintln!(
            "{}",
            render_assembly_diagnostic(file, source, *line, *offset, message)
        );
    } else {
        eprintln!("error: {err}");
    }
}

/// Label table of the part being assembled.
#[derive(Default)]
pub struct AsmContext {
    /// Label definitions mapping names to offsets in the part's bytecode.
    pub(crate) labels: HashMap<String, u16>,
}

impl AsmContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a label at the given bytecode offset.
    pub(crate) fn define_label(&mut self, name: String, offset: usize) -> Result<(), VMError> {
        if self.labels.contains_key(&name) {
            return Err(VMError::DuplicateLabel { label: name });
        }
        let offset = u16::try_from(offset).map_err(|_| VMError::InvalidIP { ip: offset })?;
        self.labels.insert(name, offset);
        Ok(())
    }

    /// Resolves a label to its bytecode offset.
    pub(crate) fn resolve_label(&self, name: &str) -> Result<u16, VMError> {
        self.labels
            .get(name)
            .copied()
            .ok_or(VMError::UndefinedLabel {
                label: name.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column offset in the line.
    offset: usize,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `#` starts a comment
/// - commas are ignored
/// - whitespace-separated tokens
fn tokenize(line: &str) -> Vec<Token<'_>> {
    let code = line.split(COMMENT_CHAR).next().unwrap_or("");
    let mut out = Vec::with_capacity(8);
    let mut start: Option<usize> = None;

    for (i, c) in code.char_indices() {
        if c == ',' || c.is_whitespace() {
            if let Some(s) = start.take() {
                out.push(Token {
                    text: &code[s..i],
                    offset: s + 1,
                });
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push(Token {
            text: &code[s..],
            offset: s + 1,
        });
    }
    out
}

/// Parse an integer literal: decimal or `0x` hex, with an optional `-`.
pub(crate) fn parse_int(tok: &str) -> Result<i64, VMError> {
    let invalid = || VMError::InvalidOperand {
        token: tok.to_string(),
        expected: "integer",
    };
    let (negative, digits) = match tok.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, tok),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).map_err(|_| invalid())?,
        None => digits.parse::<i64>().map_err(|_| invalid())?,
    };
    Ok(if negative { -value } else { value })
}

/// Parse a variable token like `v0`, `v255` or `v0xFF`.
pub(crate) fn parse_var(tok: &str) -> Result<u8, VMError> {
    let invalid = || VMError::InvalidOperand {
        token: tok.to_string(),
        expected: "variable v0..v255",
    };
    let index = tok.strip_prefix(VAR_PREFIX).ok_or_else(invalid)?;
    let value = parse_int(index).map_err(|_| invalid())?;
    u8::try_from(value).map_err(|_| invalid())
}

fn is_var(tok: &str) -> bool {
    parse_var(tok).is_ok()
}

/// Parse an unsigned byte immediate.
pub(crate) fn parse_byte(tok: &str) -> Result<u8, VMError> {
    u8::try_from(parse_int(tok)?).map_err(|_| VMError::InvalidOperand {
        token: tok.to_string(),
        expected: "byte 0..=255",
    })
}

/// Parse a 16-bit immediate; negative values are stored in two's complement.
pub(crate) fn parse_word(tok: &str) -> Result<u16, VMError> {
    let value = parse_int(tok)?;
    if !(i16::MIN as i64..=u16::MAX as i64).contains(&value) {
        return Err(VMError::InvalidOperand {
            token: tok.to_string(),
            expected: "word -32768..=65535",
        });
    }
    Ok(value as u16)
}

/// Parses an absolute address or a label reference.
pub(crate) fn parse_addr(tok: &str, ctx: &AsmContext) -> Result<u16, VMError> {
    if tok.starts_with(|c: char| c.is_ascii_digit()) {
        return u16::try_from(parse_int(tok)?).map_err(|_| VMError::InvalidOperand {
            token: tok.to_string(),
            expected: "address 0..=0xFFFF",
        });
    }
    ctx.resolve_label(tok)
}

/// Right-hand side of a `JMP_IF` comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rhs {
    Var(u8),
    Byte(u8),
    Word(u16),
}

impl Rhs {
    fn parse(tok: &str) -> Result<Rhs, VMError> {
        if tok.starts_with(VAR_PREFIX) {
            return parse_var(tok).map(Rhs::Var);
        }
        match parse_int(tok)? {
            value @ 0..=255 => Ok(Rhs::Byte(value as u8)),
            _ => parse_word(tok).map(Rhs::Word),
        }
    }

    fn flags(&self) -> u8 {
        match self {
            Rhs::Var(_) => 0x80,
            Rhs::Word(_) => 0x40,
            Rhs::Byte(_) => 0x00,
        }
    }

    fn size(&self) -> usize {
        match self {
            Rhs::Var(_) | Rhs::Byte(_) => 1,
            Rhs::Word(_) => 2,
        }
    }
}

fn parse_comparison(tok: &str) -> Result<u8, VMError> {
    match tok {
        "==" => Ok(0),
        "!=" => Ok(1),
        ">" => Ok(2),
        ">=" => Ok(3),
        "<" => Ok(4),
        "<=" => Ok(5),
        _ => Err(VMError::InvalidOperand {
            token: tok.to_string(),
            expected: "comparison (==, !=, >, >=, <, <=)",
        }),
    }
}

/// `JMP_IF` operand block: `vA <op> rhs, target`.
#[derive(Debug, Clone)]
struct Condition {
    comparison: u8,
    var: u8,
    rhs: Rhs,
    target: u16,
}

impl Condition {
    /// Tokens making up the block.
    const TOKENS: usize = 4;

    fn parse(tokens: &[Token], ctx: &AsmContext) -> Result<Condition, VMError> {
        Ok(Condition {
            var: parse_var(tokens[0].text)?,
            comparison: parse_comparison(tokens[1].text)?,
            rhs: Rhs::parse(tokens[2].text)?,
            target: parse_addr(tokens[3].text, ctx)?,
        })
    }

    fn emit(&self, out: &mut Vec<u8>) {
        out.push(self.rhs.flags() | self.comparison);
        out.push(self.var);
        match self.rhs {
            Rhs::Var(v) | Rhs::Byte(v) => out.push(v),
            Rhs::Word(w) => out.extend_from_slice(&w.to_be_bytes()),
        }
        out.extend_from_slice(&self.target.to_be_bytes());
    }
}

/// `RESET_THREADS` operand block: `first, last, action`.
#[derive(Debug, Clone)]
struct ThreadRange {
    first: u8,
    last: u8,
    action: u8,
}

impl ThreadRange {
    const TOKENS: usize = 3;

    fn parse(tokens: &[Token]) -> Result<ThreadRange, VMError> {
        Ok(ThreadRange {
            first: parse_byte(tokens[0].text)?,
            last: parse_byte(tokens[1].text)?,
            action: parse_byte(tokens[2].text)?,
        })
    }

    fn size(&self) -> usize {
        range_size(self.first, self.last)
    }

    /// An empty range is encoded without its action byte.
    fn emit(&self, out: &mut Vec<u8>) {
        out.push(self.first);
        out.push(self.last);
        if self.size() == 3 {
            out.push(self.action);
        }
    }
}

/// Even polygon offset as stored (halved) in the bytecode.
fn parse_poly_offset(tok: &str, max_halved: u16) -> Result<u16, VMError> {
    let value = parse_int(tok)?;
    if value < 0 || value % 2 != 0 || value / 2 > max_halved as i64 {
        return Err(VMError::InvalidOperand {
            token: tok.to_string(),
            expected: "even polygon offset",
        });
    }
    Ok((value / 2) as u16)
}

/// `POLY_BG offset, x, y`
#[derive(Debug, Clone)]
struct PolyBackground {
    halved_offset: u16,
    x: u8,
    y: u8,
}

impl PolyBackground {
    const SIZE: usize = 4;

    fn parse(operands: &[Token]) -> Result<Self, VMError> {
        expect_arity(POLY_BACKGROUND, 3, operands.len())?;
        Ok(Self {
            halved_offset: parse_poly_offset(operands[0].text, 0x7FFF)?,
            x: parse_byte(operands[1].text)?,
            y: parse_byte(operands[2].text)?,
        })
    }

    fn emit(&self, out: &mut Vec<u8>) {
        let [high, low] = self.halved_offset.to_be_bytes();
        out.extend_from_slice(&[POLY_A_BIT | high, low, self.x, self.y]);
    }
}

/// `POLY offset, x, y [, zoom]`; the opcode bits record how each operand
/// is encoded.
#[derive(Debug, Clone)]
struct PolySprite {
    opcode: u8,
    halved_offset: u16,
    operands: Vec<u8>,
}

impl PolySprite {
    fn parse(tokens: &[Token]) -> Result<Self, VMError> {
        if !(3..=4).contains(&tokens.len()) {
            return Err(VMError::ArityMismatch {
                instruction: POLY_SPRITE.to_string(),
                expected: 3,
                actual: tokens.len(),
            });
        }

        let mut opcode = POLY_B_BIT;
        let halved_offset = parse_poly_offset(tokens[0].text, 0xFFFF)?;
        let mut operands = Vec::with_capacity(5);

        let x = tokens[1].text;
        if is_var(x) {
            opcode |= 0x10;
            operands.push(parse_var(x)?);
        } else {
            match parse_int(x)? {
                value @ 0..=255 => {
                    opcode |= 0x20;
                    operands.push(value as u8);
                }
                value @ 256..=511 => {
                    opcode |= 0x30;
                    operands.push((value - 256) as u8);
                }
                _ => operands.extend_from_slice(&parse_word(x)?.to_be_bytes()),
            }
        }

        let y = tokens[2].text;
        if is_var(y) {
            opcode |= 0x04;
            operands.push(parse_var(y)?);
        } else {
            match parse_int(y)? {
                value @ 0..=255 => {
                    opcode |= 0x08;
                    operands.push(value as u8);
                }
                _ => operands.extend_from_slice(&parse_word(y)?.to_be_bytes()),
            }
        }

        if let Some(zoom) = tokens.get(3).map(|t| t.text) {
            if zoom == ALT_BUFFER {
                opcode |= 0x03;
            } else if is_var(zoom) {
                opcode |= 0x01;
                operands.push(parse_var(zoom)?);
            } else {
                opcode |= 0x02;
                operands.push(parse_byte(zoom)?);
            }
        }

        Ok(Self {
            opcode,
            halved_offset,
            operands,
        })
    }

    fn size(&self) -> usize {
        3 + self.operands.len()
    }

    fn emit(&self, out: &mut Vec<u8>) {
        out.push(self.opcode);
        out.extend_from_slice(&self.halved_offset.to_be_bytes());
        out.extend_from_slice(&self.operands);
    }
}

fn expect_arity(instruction: &str, expected: usize, actual: usize) -> Result<(), VMError> {
    if expected != actual {
        return Err(VMError::ArityMismatch {
            instruction: instruction.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn instruction_from_str(name: &str) -> Result<Instruction, VMError> {
    Instruction::from_mnemonic(name).ok_or_else(|| VMError::InvalidInstructionName {
        name: name.to_string(),
    })
}

macro_rules! define_parse_instruction {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $category:ident
        ),* $(,)?
    ) => {

        // =========================
        // Assembler IR
        // =========================
        #[derive(Debug, Clone)]
        enum AsmInstr {
            $(
                $name {
                    $( $field: define_parse_instruction!(@ty $kind) ),*
                },
            )*
            PolyBackground(PolyBackground),
            PolySprite(PolySprite),
        }

        impl AsmInstr {
            /// Encodes the assembly instruction into bytecode
            fn assemble(&self, out: &mut Vec<u8>) {
                match self {
                    $(
                        AsmInstr::$name { $( $field ),* } => {
                            out.push($opcode);
                            $(
                                define_parse_instruction!(@emit out, $kind, $field);
                            )*
                        }
                    )*
                    AsmInstr::PolyBackground(poly) => poly.emit(out),
                    AsmInstr::PolySprite(poly) => poly.emit(out),
                }
            }
        }

        /// Operand tokens an instruction takes.
        fn instruction_arity(instr: Instruction) -> usize {
            match instr {
                $(
                    Instruction::$name => {
                        0usize $( + define_parse_instruction!(@tokens $kind) )*
                    }
                )*
            }
        }

        /// Parse one table instruction from its operand tokens.
        #[allow(unused_assignments)]
        fn parse_table_instruction(
            ctx: &AsmContext,
            instr: Instruction,
            operands: &[Token],
        ) -> Result<AsmInstr, VMError> {
            expect_arity(instr.mnemonic(), instruction_arity(instr), operands.len())?;

            match instr {
                $(
                    Instruction::$name => {
                        #[allow(unused_mut, unused_variables)]
                        let mut rest = operands;
                        Ok(AsmInstr::$name {
                            $(
                                $field: define_parse_instruction!(@parse $kind, rest, ctx),
                            )*
                        })
                    }
                )*
            }
        }
    };

    // ---------- IR field types ----------
    (@ty Var)  => { u8 };
    (@ty Byte) => { u8 };
    (@ty Word) => { u16 };
    (@ty Addr) => { u16 };
    (@ty Cond) => { Condition };
    (@ty Range) => { ThreadRange };

    // ---------- operand tokens ----------
    (@tokens Cond) => { Condition::TOKENS };
    (@tokens Range) => { ThreadRange::TOKENS };
    (@tokens $kind:ident) => { 1usize };

    // ---------- encoding ----------
    (@emit $out:ident, Var, $v:ident)  => { $out.push(*$v) };
    (@emit $out:ident, Byte, $v:ident) => { $out.push(*$v) };
    (@emit $out:ident, Word, $v:ident) => { $out.extend_from_slice(&$v.to_be_bytes()) };
    (@emit $out:ident, Addr, $v:ident) => { $out.extend_from_slice(&$v.to_be_bytes()) };
    (@emit $out:ident, Cond, $v:ident) => { $v.emit($out) };
    (@emit $out:ident, Range, $v:ident) => { $v.emit($out) };

    // ---------- parsing ----------
    (@parse Var, $rest:ident, $ctx:ident) => {{
        let (tok, tail) = $rest.split_at(1);
        $rest = tail;
        parse_var(tok[0].text)?
    }};
    (@parse Byte, $rest:ident, $ctx:ident) => {{
        let (tok, tail) = $rest.split_at(1);
        $rest = tail;
        parse_byte(tok[0].text)?
    }};
    (@parse Word, $rest:ident, $ctx:ident) => {{
        let (tok, tail) = $rest.split_at(1);
        $rest = tail;
        parse_word(tok[0].text)?
    }};
    (@parse Addr, $rest:ident, $ctx:ident) => {{
        let (tok, tail) = $rest.split_at(1);
        $rest = tail;
        parse_addr(tok[0].text, $ctx)?
    }};
    (@parse Cond, $rest:ident, $ctx:ident) => {{
        let (toks, tail) = $rest.split_at(Condition::TOKENS);
        $rest = tail;
        Condition::parse(toks, $ctx)?
    }};
    (@parse Range, $rest:ident, $ctx:ident) => {{
        let (toks, tail) = $rest.split_at(ThreadRange::TOKENS);
        $rest = tail;
        ThreadRange::parse(toks)?
    }};
}

for_each_instruction!(define_parse_instruction);

/// Parse one instruction line (mnemonic plus operands).
fn parse_instruction(ctx: &AsmContext, tokens: &[Token]) -> Result<AsmInstr, VMError> {
    let (name, operands) = match tokens.split_first() {
        Some((name, operands)) => (name.text, operands),
        None => {
            return Err(VMError::ArityMismatch {
                instruction: "<missing opcode>".to_string(),
                expected: 1,
                actual: 0,
            });
        }
    };

    match name {
        POLY_BACKGROUND => PolyBackground::parse(operands).map(AsmInstr::PolyBackground),
        POLY_SPRITE => PolySprite::parse(operands).map(AsmInstr::PolySprite),
        _ => parse_table_instruction(ctx, instruction_from_str(name)?, operands),
    }
}

/// Encoded size of an instruction line, computable before labels resolve.
fn instruction_size(tokens: &[Token]) -> Result<usize, VMError> {
    let name = tokens[0].text;
    let operands = &tokens[1..];
    match name {
        POLY_BACKGROUND => Ok(PolyBackground::SIZE),
        POLY_SPRITE => Ok(PolySprite::parse(operands)?.size()),
        _ => {
            let instr = instruction_from_str(name)?;
            if let Some(size) = instr.fixed_size() {
                return Ok(size);
            }
            expect_arity(name, instruction_arity(instr), operands.len())?;
            match instr {
                Instruction::ResetThread => Ok(1 + ThreadRange::parse(operands)?.size()),
                // JMP_IF: the rhs picks the encoding.
                _ => {
                    let rhs = Rhs::parse(operands[2].text)?;
                    Ok(1 + 1 + 1 + rhs.size() + 2)
                }
            }
        }
    }
}

/// Checks if a token is a label definition (ends with `:`)
fn is_label_def(tok: &str) -> bool {
    tok.ends_with(LABEL_SUFFIX) && tok.len() > 1
}

/// Extracts the label name from a label definition token.
fn label_name(tok: &str) -> &str {
    &tok[..tok.len() - 1]
}

/// Parses `[ part <id> ]`. Returns `None` for lines that are not section
/// markers.
fn parse_section_marker(line: &str) -> Option<Result<u16, VMError>> {
    let trimmed = line.split(COMMENT_CHAR).next().unwrap_or("").trim();
    let inner = trimmed.strip_prefix('[')?.strip_suffix(']')?;
    let invalid = || VMError::InvalidSection {
        header: trimmed.to_string(),
    };

    let mut words = inner.split_whitespace();
    let parsed = match (words.next(), words.next(), words.next()) {
        (Some(keyword), Some(id), None) if keyword.eq_ignore_ascii_case(SECTION_KEYWORD) => {
            parse_int(id)
                .ok()
                .and_then(|id| u16::try_from(id).ok())
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    };
    Some(parsed)
}

/// Source lines of one part, collected by the first pass.
struct PartSource<'a> {
    id: u16,
    /// (line number, tokens) of each instruction.
    lines: Vec<(usize, Vec<Token<'a>>)>,
    ctx: AsmContext,
    size: usize,
}

impl<'a> PartSource<'a> {
    fn new(id: u16) -> Self {
        Self {
            id,
            lines: Vec::new(),
            ctx: AsmContext::new(),
            size: 0,
        }
    }
}

fn at(line: usize, offset: usize) -> impl Fn(VMError) -> VMError {
    move |e| VMError::AssemblyError {
        line,
        offset,
        source: e.to_string(),
    }
}

/// Performs two-pass assembly.
///
/// Pass 1: tokenizes all lines, splits them into parts, computes instruction
/// sizes and records label offsets.
///
/// Pass 2: parses instructions with label resolution and emits bytecode.
fn assemble_parts(source: &str) -> Result<Program, VMError> {
    let mut parts: Vec<PartSource> = Vec::new();

    for (line_idx, line) in source.lines().enumerate() {
        let line_no = line_idx + 1;

        if let Some(section) = parse_section_marker(line) {
            let id = section.map_err(at(line_no, 1))?;
            if parts.iter().any(|part| part.id == id) {
                return Err(at(line_no, 1)(VMError::InvalidSection {
                    header: format!("part 0x{id:04X} defined twice"),
                }));
            }
            parts.push(PartSource::new(id));
            continue;
        }

        let tokens = tokenize(line);
        if tokens.is_empty() {
            continue;
        }
        if parts.is_empty() {
            parts.push(PartSource::new(GAME_PART_FIRST));
        }
        let Some(part) = parts.last_mut() else {
            continue;
        };

        let mut instr_tokens = &tokens[..];
        if is_label_def(tokens[0].text) {
            let name = label_name(tokens[0].text).to_string();
            part.ctx
                .define_label(name, part.size)
                .map_err(at(line_no, tokens[0].offset))?;
            instr_tokens = &tokens[1..];
        }
        if instr_tokens.is_empty() {
            continue;
        }

        part.size += instruction_size(instr_tokens).map_err(at(line_no, instr_tokens[0].offset))?;
        part.lines.push((line_no, instr_tokens.to_vec()));
    }

    let mut program = Program::default();
    for part in parts {
        let mut bytecode = Vec::with_capacity(part.size);
        for (line_no, tokens) in &part.lines {
            let instr =
                parse_instruction(&part.ctx, tokens).map_err(at(*line_no, tokens[0].offset))?;
            instr.assemble(&mut bytecode);
        }
        program.parts.push(Part {
            id: part.id,
            bytecode: Bytes::from(bytecode),
        });
    }
    Ok(program)
}

/// Assemble a full source string into a [`Program`].
///
/// Section markers `[ part <id> ]` start a new part; labels are local to the
/// part that defines them.
pub fn assemble_source(source: impl AsRef<str>) -> Result<Program, VMError> {
    assemble_source_with_name(source.as_ref(), "<source>")
}

/// Assembles source with an associated filename for error diagnostics.
fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Program, VMError> {
    let result = assemble_parts(source);
    if let Err(err) = &result {
        log_assembly_error(source_name, source, err);
    }
    result
}

/// Convenience: assemble directly from file path
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Program, VMError> {
    let path_ref = path.as_ref();
    let source = fs::read_to_string(path_ref).map_err(|e| VMError::IoError {
        path: path_ref.display().to_string(),
        message: e.to_string(),
    })?;
    assemble_source_with_name(&source, &path_ref.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(source: &str) -> Vec<u8> {
        let program = assemble_source(source).unwrap();
        assert_eq!(program.parts.len(), 1);
        program.parts[0].bytecode.to_vec()
    }

    fn assembly_message(source: &str) -> String {
        match assemble_source(source).unwrap_err() {
            VMError::AssemblyError { source, .. } => source,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn parse_var_valid() {
        assert_eq!(parse_var("v0").unwrap(), 0);
        assert_eq!(parse_var("v255").unwrap(), 255);
        assert_eq!(parse_var("v0xF9").unwrap(), 0xF9);
    }

    #[test]
    fn parse_var_invalid() {
        assert!(parse_var("0").is_err());
        assert!(parse_var("r1").is_err());
        assert!(parse_var("v256").is_err());
        assert!(parse_var("v-1").is_err());
        assert!(parse_var("v").is_err());
    }

    #[test]
    fn parse_int_forms() {
        assert_eq!(parse_int("42").unwrap(), 42);
        assert_eq!(parse_int("-7").unwrap(), -7);
        assert_eq!(parse_int("0x3E80").unwrap(), 0x3E80);
        assert_eq!(parse_int("-0x10").unwrap(), -16);
        assert!(parse_int("12a").is_err());
    }

    #[test]
    fn parse_word_range() {
        assert_eq!(parse_word("-1").unwrap(), 0xFFFF);
        assert_eq!(parse_word("65535").unwrap(), 0xFFFF);
        assert!(parse_word("65536").is_err());
        assert!(parse_word("-32769").is_err());
    }

    #[test]
    fn tokenize_ignores_commas_and_comments() {
        let tokens = tokenize("  SET v1, 0x10 # comment");
        let texts: Vec<_> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["SET", "v1", "0x10"]);
        assert_eq!(tokens[0].offset, 3);
    }

    #[test]
    fn assemble_empty_source() {
        let program = assemble_source("# nothing here\n\n").unwrap();
        assert!(program.parts.is_empty());
    }

    #[test]
    fn default_part_is_first_game_part() {
        let program = assemble_source("PAUSE").unwrap();
        assert_eq!(program.parts[0].id, GAME_PART_FIRST);
    }

    #[test]
    fn assemble_set_is_big_endian() {
        assert_eq!(code("SET v16, 0x1234"), vec![0x00, 16, 0x12, 0x34]);
        assert_eq!(code("SET v1, -2"), vec![0x00, 1, 0xFF, 0xFE]);
    }

    #[test]
    fn labels_resolve_forward_and_backward() {
        let bytes = code(
            r#"
            start:
                JMP end
                PAUSE
            end: JMP start
            "#,
        );
        assert_eq!(bytes, vec![0x07, 0x00, 0x04, 0x06, 0x07, 0x00, 0x00]);
    }

    #[test]
    fn jmp_if_encodings() {
        assert_eq!(
            code("t: JMP_IF v1 == v2, t"),
            vec![0x0A, 0x80, 1, 2, 0x00, 0x00]
        );
        assert_eq!(
            code("t: JMP_IF v1 >= 200, t"),
            vec![0x0A, 0x03, 1, 200, 0x00, 0x00]
        );
        assert_eq!(
            code("t: JMP_IF v1 < -1, t"),
            vec![0x0A, 0x44, 1, 0xFF, 0xFF, 0x00, 0x00]
        );
        assert_eq!(
            code("t: JMP_IF v1 != 0x1234, t"),
            vec![0x0A, 0x41, 1, 0x12, 0x34, 0x00, 0x00]
        );
    }

    #[test]
    fn jmp_if_size_feeds_label_offsets() {
        let bytes = code(
            r#"
                JMP_IF v0 > 1000, after
                PAUSE
            after:
                KILL
            "#,
        );
        assert_eq!(bytes[5..7], [0x00, 0x08]);
        assert_eq!(bytes[8], 0x11);
    }

    #[test]
    fn empty_thread_range_drops_action_byte() {
        assert_eq!(code("RESET_THREADS 1, 63, 2"), vec![0x0C, 1, 63, 2]);
        assert_eq!(code("RESET_THREADS 5, 2, 1"), vec![0x0C, 5, 2]);
        // 0x44 masks to 4, below 5.
        assert_eq!(code("RESET_THREADS 5, 0x44, 1"), vec![0x0C, 5, 0x44]);

        let source = "RESET_THREADS 5, 2, 1\nt:\nJMP t";
        assert_eq!(code(source), vec![0x0C, 5, 2, 0x07, 0x00, 0x03]);
    }

    #[test]
    fn poly_background_encoding() {
        assert_eq!(code("POLY_BG 0x2468, 10, 250"), vec![0x92, 0x34, 10, 250]);
        assert!(assemble_source("POLY_BG 3, 0, 0").is_err());
        assert!(assemble_source("POLY_BG 0x10000, 0, 0").is_err());
    }

    #[test]
    fn poly_sprite_encodings() {
        // byte x, byte y, default zoom
        assert_eq!(code("POLY 0x10, 5, 6"), vec![0x68, 0x00, 0x08, 5, 6]);
        // x in 256..=511, var y, var zoom
        assert_eq!(
            code("POLY 0x10, 300, v2, v3"),
            vec![0x75, 0x00, 0x08, 44, 2, 3]
        );
        // var x, word y, byte zoom
        assert_eq!(
            code("POLY 0x10, v1, 1000, 0x80"),
            vec![0x52, 0x00, 0x08, 1, 0x03, 0xE8, 0x80]
        );
        // word x, byte y, alternate buffer
        assert_eq!(
            code("POLY 0x10, -5, 7, alt"),
            vec![0x4B, 0x00, 0x08, 0xFF, 0xFB, 7]
        );
    }

    #[test]
    fn sections_split_parts() {
        let program = assemble_source(
            r#"
            [ part 0x3E81 ]
            loop: PAUSE
                JMP loop
            [ part 0x3E82 ]
            loop: KILL
            "#,
        )
        .unwrap();
        assert_eq!(program.parts.len(), 2);
        assert_eq!(program.part(0x3E81).unwrap().bytecode.to_vec(), vec![0x06, 0x07, 0, 0]);
        assert_eq!(program.part(0x3E82).unwrap().bytecode.to_vec(), vec![0x11]);
    }

    #[test]
    fn duplicate_part_is_rejected() {
        assert!(assemble_source("[ part 1 ]\nPAUSE\n[ part 1 ]\nPAUSE").is_err());
    }

    #[test]
    fn malformed_section_is_rejected() {
        assert!(assembly_message("[ chapter 1 ]").contains("invalid section header"));
    }

    #[test]
    fn assemble_invalid_instruction() {
        let err = assemble_source("NOPE v0").unwrap_err();
        assert!(matches!(
            err,
            VMError::AssemblyError { line: 1, offset: 1, ref source } if source.contains("invalid instruction name")
        ));
    }

    #[test]
    fn assemble_wrong_arity() {
        assert!(assembly_message("ADD v0").contains("expects 2 operand(s), got 1"));
    }

    #[test]
    fn assemble_undefined_label() {
        assert!(assembly_message("JMP nowhere").contains("undefined label"));
    }

    #[test]
    fn assemble_duplicate_label() {
        assert!(assembly_message("a: PAUSE\na: PAUSE").contains("duplicate label"));
    }

    #[test]
    fn diagnostic_points_at_column() {
        let diag = render_assembly_diagnostic("t.asm", "  SET v1, x", 1, 11, "bad operand");
        assert!(diag.contains("t.asm:1:11"));
        assert!(diag.contains("   1 |   SET v1, x"));
        assert!(diag.ends_with("  |           ^\n"));
    }

    #[test]
    fn every_table_instruction_assembles() {
        let mut source = String::from("t:\n");
        for instr in Instruction::ALL {
            let operands: Vec<&str> = instr
                .operands()
                .iter()
                .map(|kind| match kind {
                    crate::virtual_machine::isa::OperandKind::Var => "v1",
                    crate::virtual_machine::isa::OperandKind::Cond => "v1 == 2 t",
                    crate::virtual_machine::isa::OperandKind::Range => "1 3 2",
                    crate::virtual_machine::isa::OperandKind::Addr => "t",
                    _ => "3",
                })
                .collect();
            let _ = writeln!(source, "{} {}", instr.mnemonic(), operands.join(", "));
        }
        let bytes = code(&source);
        let expected: usize = Instruction::ALL
            .iter()
            .map(|i| match i {
                Instruction::CondJmp => 6,
                Instruction::ResetThread => 4,
                _ => i.fixed_size().unwrap(),
            })
            .sum();
        assert_eq!(bytes.len(), expected);
    }
}
