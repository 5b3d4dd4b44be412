//! Field descriptors.

use crate::savestate::CURRENT_STATE_VERSION;

/// Inclusive range of format versions an entry participates in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VersionRange {
    pub min: u16,
    pub max: u16,
}

impl VersionRange {
    /// Present from `min` up to the current format.
    pub const fn since(min: u16) -> Self {
        Self {
            min,
            max: CURRENT_STATE_VERSION,
        }
    }

    pub const fn between(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    pub const fn contains(&self, version: u16) -> bool {
        self.min <= version && version <= self.max
    }
}

/// Width of one stored element.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ElementSize {
    Byte = 1,
    Word = 2,
    Long = 4,
}

impl ElementSize {
    pub const fn bytes(self) -> usize {
        self as usize
    }
}

/// Mutable view over a field's elements, erased to one of the supported
/// integer types.
pub enum Cells<'a> {
    U8(&'a mut [u8]),
    I8(&'a mut [i8]),
    U16(&'a mut [u16]),
    I16(&'a mut [i16]),
    U32(&'a mut [u32]),
    I32(&'a mut [i32]),
}

macro_rules! each_cells {
    ($cells:expr, $slice:ident => $body:expr) => {
        match $cells {
            Cells::U8($slice) => $body,
            Cells::I8($slice) => $body,
            Cells::U16($slice) => $body,
            Cells::I16($slice) => $body,
            Cells::U32($slice) => $body,
            Cells::I32($slice) => $body,
        }
    };
}

impl Cells<'_> {
    pub fn len(&self) -> usize {
        each_cells!(self, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `i` as raw bits, zero-extended to 32 bits.
    pub fn bits(&self, i: usize) -> u32 {
        each_cells!(self, s => s[i].to_bits())
    }

    /// Stores the low bits of `bits` into element `i`.
    pub fn set_bits(&mut self, i: usize, bits: u32) {
        each_cells!(self, s => s[i] = Scalar::from_bits(bits))
    }

    /// The field as raw bytes when its in-memory stride is one byte.
    pub fn as_bytes_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            Cells::U8(s) => Some(&mut **s),
            _ => None,
        }
    }
}

/// Integer types a descriptor can point at.
pub trait Scalar: Copy {
    fn to_bits(self) -> u32;
    fn from_bits(bits: u32) -> Self;
    fn cells(slice: &mut [Self]) -> Cells<'_>;
}

macro_rules! impl_scalar {
    ($($t:ty => $variant:ident via $unsigned:ty),* $(,)?) => {
        $(
            impl Scalar for $t {
                fn to_bits(self) -> u32 {
                    self as $unsigned as u32
                }

                fn from_bits(bits: u32) -> Self {
                    bits as $unsigned as $t
                }

                fn cells(slice: &mut [Self]) -> Cells<'_> {
                    Cells::$variant(slice)
                }
            }
        )*
    };
}

impl_scalar!(
    u8 => U8 via u8,
    i8 => I8 via u8,
    u16 => U16 via u16,
    i16 => I16 via u16,
    u32 => U32 via u32,
    i32 => I32 via u32,
);

/// One descriptor in an entry list.
///
/// Lists are walked in order and stop at the first [`Entry::End`] (or at the
/// end of the slice).
pub enum Entry<'a> {
    /// A single integer.
    Int {
        cells: Cells<'a>,
        size: ElementSize,
        versions: VersionRange,
    },
    /// A fixed-length array. Byte-wide fields stored as bytes are copied as
    /// one block; everything else goes element by element.
    Array {
        cells: Cells<'a>,
        size: ElementSize,
        versions: VersionRange,
    },
    /// A position inside a region, stored as a 4-byte offset from the
    /// serializer's base.
    Position {
        position: &'a mut usize,
        versions: VersionRange,
    },
    End,
}

impl<'a> Entry<'a> {
    pub fn int<T: Scalar>(value: &'a mut T, size: ElementSize, versions: VersionRange) -> Self {
        Entry::Int {
            cells: T::cells(std::slice::from_mut(value)),
            size,
            versions,
        }
    }

    pub fn array<T: Scalar>(values: &'a mut [T], size: ElementSize, versions: VersionRange) -> Self {
        Entry::Array {
            cells: T::cells(values),
            size,
            versions,
        }
    }

    pub fn position(position: &'a mut usize, versions: VersionRange) -> Self {
        Entry::Position { position, versions }
    }

    /// Whether this entry takes part in a walk at `version`.
    pub fn applies_to(&self, version: u16) -> bool {
        match self {
            Entry::Int { versions, .. }
            | Entry::Array { versions, .. }
            | Entry::Position { versions, .. } => versions.contains(version),
            Entry::End => false,
        }
    }

    /// Bytes this entry occupies in a state, ignoring its version range.
    pub fn encoded_len(&self) -> usize {
        match self {
            Entry::Int { size, .. } => size.bytes(),
            Entry::Array { cells, size, .. } => cells.len() * size.bytes(),
            Entry::Position { .. } => 4,
            Entry::End => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_range_is_inclusive() {
        let range = VersionRange::between(2, 3);
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(3));
        assert!(!range.contains(4));
        assert!(VersionRange::since(1).contains(CURRENT_STATE_VERSION));
    }

    #[test]
    fn scalar_bits_preserve_twos_complement() {
        assert_eq!((-1i16).to_bits(), 0xFFFF);
        assert_eq!(i16::from_bits(0xFFFF), -1);
        assert_eq!(i8::from_bits(0x1_80), -128);
        assert_eq!(u16::from_bits(0xABCD_1234), 0x1234);
    }

    #[test]
    fn encoded_len_uses_declared_width() {
        let mut values = [0i16; 10];
        let entry = Entry::array(&mut values, ElementSize::Long, VersionRange::since(1));
        assert_eq!(entry.encoded_len(), 40);

        let mut flag = 0u8;
        let entry = Entry::int(&mut flag, ElementSize::Byte, VersionRange::since(1));
        assert_eq!(entry.encoded_len(), 1);
        assert!(!Entry::End.applies_to(CURRENT_STATE_VERSION));
    }

    #[test]
    fn cells_set_bits_truncates() {
        let mut values = [0u8; 2];
        let mut cells = u8::cells(&mut values);
        cells.set_bits(1, 0x1FF);
        assert_eq!(cells.bits(1), 0xFF);
        assert!(cells.as_bytes_mut().is_some());
        assert_eq!(values, [0, 0xFF]);
    }
}
