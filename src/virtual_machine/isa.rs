//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical opcode table and hands it to a callback macro, so the decoder, the
//! assembler and the ISA guard test all expand the same list.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<u8>` for decoding table opcodes
//! - Per-instruction operand layouts and profiling categories
//!
//! # Bytecode Format
//!
//! - Opcode: 1 byte
//! - Variable operand: 1 byte (index into the 256-entry variable store)
//! - Byte immediate: 1 byte
//! - Word immediate / address: 2 bytes, **big-endian**
//! - Condition block (`JMP_IF` only): variable length, see [`condition_size`]
//! - Thread range (`RESET_THREADS` only): 2 or 3 bytes, see [`range_size`]
//!
//! Opcodes with bit 7 or bit 6 set are polygon draws whose operand shape is
//! encoded in the opcode itself; they never reach the table.

use crate::virtual_machine::errors::VMError;

/// Highest opcode dispatched through the table.
pub const LAST_TABLE_OPCODE: u8 = 0x1A;
/// Opcode bit selecting polygon variant A.
pub const POLY_A_BIT: u8 = 0x80;
/// Opcode bit selecting polygon variant B.
pub const POLY_B_BIT: u8 = 0x40;

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Variables
            // =========================
            /// SET var, word ; v[var] = word
            MovConst = 0x00, "SET" => [dst: Var, value: Word], Data,
            /// MOV dst, src ; v[dst] = v[src]
            Mov = 0x01, "MOV" => [dst: Var, src: Var], Data,
            /// ADD dst, src ; v[dst] += v[src] (wrapping)
            Add = 0x02, "ADD" => [dst: Var, src: Var], Data,
            /// ADDI var, word ; v[var] += word (wrapping)
            AddConst = 0x03, "ADDI" => [dst: Var, value: Word], Data,
            // =========================
            // Control flow
            // =========================
            /// CALL addr ; push return offset, jump
            Call = 0x04, "CALL" => [target: Addr], Flow,
            /// RET ; pop return offset
            Ret = 0x05, "RET" => [], Flow,
            /// PAUSE ; end this thread's slice
            PauseThread = 0x06, "PAUSE" => [], Thread,
            /// JMP addr
            Jmp = 0x07, "JMP" => [target: Addr], Flow,
            /// SET_VEC thread, addr ; request a jump for another thread
            SetVec = 0x08, "SET_VEC" => [thread: Byte, target: Addr], Thread,
            /// DJNZ var, addr ; v[var] -= 1, jump if non-zero
            Jnz = 0x09, "DJNZ" => [counter: Var, target: Addr], Flow,
            /// JMP_IF var OP rhs, addr
            CondJmp = 0x0A, "JMP_IF" => [condition: Cond], Flow,
            // =========================
            // Video
            // =========================
            /// SET_PALETTE word ; palette number is the high byte
            SetPalette = 0x0B, "SET_PALETTE" => [palette: Word], Video,
            // =========================
            // Threads
            // =========================
            /// RESET_THREADS first, last, action ; 0/1 resume/pause, 2 deactivate
            ResetThread = 0x0C, "RESET_THREADS" => [range: Range], Thread,
            // =========================
            // Video
            // =========================
            /// SELECT_PAGE page
            SelectPage = 0x0D, "SELECT_PAGE" => [page: Byte], Video,
            /// FILL_PAGE page, color
            FillPage = 0x0E, "FILL_PAGE" => [page: Byte, color: Byte], Video,
            /// COPY_PAGE src, dst ; vertical scroll from v[SCROLL_Y]
            CopyPage = 0x0F, "COPY_PAGE" => [src: Byte, dst: Byte], Video,
            /// BLIT page ; present a page, handle special keys
            BlitFramebuffer = 0x10, "BLIT" => [page: Byte], Video,
            /// KILL ; deactivate this thread and yield
            KillThread = 0x11, "KILL" => [], Thread,
            /// DRAW_STRING id, x, y, color
            DrawString = 0x12, "DRAW_STRING" => [string_id: Word, x: Byte, y: Byte, color: Byte], Video,
            // =========================
            // Variables
            // =========================
            /// SUB dst, src ; v[dst] -= v[src] (wrapping)
            Sub = 0x13, "SUB" => [dst: Var, src: Var], Data,
            /// AND var, word ; unsigned bitwise and
            And = 0x14, "AND" => [dst: Var, mask: Word], Data,
            /// OR var, word ; unsigned bitwise or
            Or = 0x15, "OR" => [dst: Var, mask: Word], Data,
            /// SHL var, word ; unsigned shift left
            Shl = 0x16, "SHL" => [dst: Var, amount: Word], Data,
            /// SHR var, word ; logical shift right
            Shr = 0x17, "SHR" => [dst: Var, amount: Word], Data,
            // =========================
            // Audio / resources
            // =========================
            /// PLAY_SOUND id, frequency, volume, channel
            PlaySound = 0x18, "PLAY_SOUND" => [resource: Word, frequency: Byte, volume: Byte, channel: Byte], Audio,
            /// LOAD_RESOURCE id ; 0 invalidates, a part id switches part
            UpdateResources = 0x19, "LOAD_RESOURCE" => [resource: Word], Resource,
            /// PLAY_MUSIC id, delay, position
            PlayMusic = 0x1A, "PLAY_MUSIC" => [resource: Word, delay: Word, position: Byte], Audio,
        }
    };
}

/// Operand shapes used by the table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Variable index, 1 byte.
    Var,
    /// Unsigned immediate, 1 byte.
    Byte,
    /// 16-bit immediate, big-endian.
    Word,
    /// 16-bit bytecode offset, big-endian.
    Addr,
    /// `JMP_IF` condition block including its jump target.
    Cond,
    /// `RESET_THREADS` first and last thread, then the action byte unless
    /// the range is empty.
    Range,
}

impl OperandKind {
    /// Encoded size, or `None` when it depends on the operand itself.
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandKind::Var | OperandKind::Byte => Some(1),
            OperandKind::Word | OperandKind::Addr => Some(2),
            OperandKind::Cond | OperandKind::Range => None,
        }
    }
}

/// Instruction categories counted by the execution profile.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum OpCategory {
    Data = 0,
    Flow = 1,
    Thread = 2,
    Video = 3,
    Audio = 4,
    Resource = 5,
    Polygon = 6,
}

/// Number of [`OpCategory`] variants.
pub const OP_CATEGORY_COUNT: usize = 7;

impl OpCategory {
    pub const ALL: [OpCategory; OP_CATEGORY_COUNT] = [
        OpCategory::Data,
        OpCategory::Flow,
        OpCategory::Thread,
        OpCategory::Video,
        OpCategory::Audio,
        OpCategory::Resource,
        OpCategory::Polygon,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            OpCategory::Data => "Variables",
            OpCategory::Flow => "Control Flow",
            OpCategory::Thread => "Threads",
            OpCategory::Video => "Video",
            OpCategory::Audio => "Audio",
            OpCategory::Resource => "Resources",
            OpCategory::Polygon => "Polygons",
        }
    }
}

/// Size of a `JMP_IF` condition block for the given condition byte, including
/// the condition byte, the left variable and the 2-byte target.
pub const fn condition_size(cond: u8) -> usize {
    let rhs = if cond & 0x80 != 0 {
        1
    } else if cond & 0x40 != 0 {
        2
    } else {
        1
    };
    1 + 1 + rhs + 2
}

/// Size of a `RESET_THREADS` range block. An empty range (`last & 63 <
/// first`) has no action byte.
pub const fn range_size(first: u8, last: u8) -> usize {
    if last & 0x3F < first { 2 } else { 3 }
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $category:ident
        ),* $(,)?
    ) => {
        #[derive(Copy, Clone, Debug, Eq, PartialEq)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::InvalidInstruction {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// All table instructions in opcode order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name, )* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Operand layout following the opcode byte.
            pub const fn operands(&self) -> &'static [OperandKind] {
                match self {
                    $( Instruction::$name => &[ $( OperandKind::$kind ),* ], )*
                }
            }

            /// Operand names, parallel to [`Instruction::operands`].
            pub const fn operand_names(&self) -> &'static [&'static str] {
                match self {
                    $( Instruction::$name => &[ $( stringify!($field) ),* ], )*
                }
            }

            pub const fn category(&self) -> OpCategory {
                match self {
                    $( Instruction::$name => OpCategory::$category, )*
                }
            }

            /// Looks up an instruction by mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Instruction> {
                match name {
                    $( $mnemonic => Some(Instruction::$name), )*
                    _ => None,
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

impl Instruction {
    /// Encoded size including the opcode byte, if it does not depend on the
    /// operand values.
    pub fn fixed_size(&self) -> Option<usize> {
        self.operands()
            .iter()
            .try_fold(1, |acc, kind| kind.size().map(|size| acc + size))
    }

    /// True for instructions that end the current slice.
    pub const fn yields(&self) -> bool {
        matches!(self, Instruction::PauseThread | Instruction::KillThread)
    }
}
