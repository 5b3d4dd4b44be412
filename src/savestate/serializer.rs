//! Entry-list walker.

use crate::debug;
use crate::savestate::entry::{Cells, ElementSize, Entry};
use crate::savestate::StateError;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    Save,
    Load,
}

enum Buffer<'b> {
    /// No storage: only the byte count advances.
    Count,
    Save(&'b mut [u8]),
    Load(&'b [u8]),
}

/// Walks entry lists against a flat little-endian buffer.
///
/// The cursor persists across calls, so a state made of several blocks is
/// produced by calling [`Serializer::save_or_load`] once per block on the same
/// serializer.
pub struct Serializer<'b> {
    buffer: Buffer<'b>,
    mode: Mode,
    version: u16,
    base: usize,
    bytes_count: usize,
}

impl<'b> Serializer<'b> {
    /// Writes fields into `buffer`.
    pub fn saver(buffer: &'b mut [u8], version: u16) -> Self {
        Self::with_buffer(Buffer::Save(buffer), Mode::Save, version)
    }

    /// Reads fields back from `buffer`.
    pub fn loader(buffer: &'b [u8], version: u16) -> Self {
        Self::with_buffer(Buffer::Load(buffer), Mode::Load, version)
    }

    /// Touches no field; only measures how many bytes a state would take.
    pub fn counter(version: u16) -> Self {
        Self::with_buffer(Buffer::Count, Mode::Save, version)
    }

    fn with_buffer(buffer: Buffer<'b>, mode: Mode, version: u16) -> Self {
        Self {
            buffer,
            mode,
            version,
            base: 0,
            bytes_count: 0,
        }
    }

    /// Sets the region base used by position entries.
    pub fn with_base(mut self, base: usize) -> Self {
        self.base = base;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn is_counting(&self) -> bool {
        matches!(self.buffer, Buffer::Count)
    }

    /// Bytes produced or consumed so far.
    pub fn bytes_count(&self) -> usize {
        self.bytes_count
    }

    fn capacity(&self) -> Option<usize> {
        match &self.buffer {
            Buffer::Count => None,
            Buffer::Save(buf) => Some(buf.len()),
            Buffer::Load(buf) => Some(buf.len()),
        }
    }

    /// Bytes the participating entries of `entries` occupy at this
    /// serializer's version.
    pub fn measure(&self, entries: &[Entry<'_>]) -> usize {
        entries
            .iter()
            .take_while(|entry| !matches!(entry, Entry::End))
            .filter(|entry| entry.applies_to(self.version))
            .map(Entry::encoded_len)
            .sum()
    }

    /// Saves or loads every participating entry, in order.
    ///
    /// Fails without touching any field or buffer byte when the remaining
    /// buffer is too small for the whole list, or when a position cannot be
    /// stored.
    pub fn save_or_load(&mut self, entries: &mut [Entry<'_>]) -> Result<(), StateError> {
        let needed = self.bytes_count + self.measure(entries);
        match self.capacity() {
            Some(available) if available < needed => {
                return Err(StateError::BufferTooSmall { needed, available });
            }
            _ => {}
        }
        if self.mode == Mode::Save {
            for entry in entries.iter().take_while(|e| !matches!(e, Entry::End)) {
                if let Entry::Position { position, .. } = entry
                    && entry.applies_to(self.version)
                {
                    self.position_offset(**position)?;
                }
            }
        }

        let start = self.bytes_count;
        for entry in entries.iter_mut() {
            if matches!(entry, Entry::End) {
                break;
            }
            if !entry.applies_to(self.version) {
                continue;
            }
            match entry {
                Entry::Int { cells, size, .. } => self.transfer_element(cells, 0, *size),
                Entry::Array { cells, size, .. } => self.transfer_array(cells, *size),
                Entry::Position { position, .. } => self.transfer_position(position)?,
                Entry::End => unreachable!(),
            }
        }
        debug!(
            "{:?} v{}: {} bytes at offset {}",
            self.mode,
            self.version,
            self.bytes_count - start,
            start
        );
        Ok(())
    }

    fn transfer_array(&mut self, cells: &mut Cells<'_>, size: ElementSize) {
        if size == ElementSize::Byte {
            let len = cells.len();
            if let Some(bytes) = cells.as_bytes_mut() {
                let at = self.bytes_count;
                match &mut self.buffer {
                    Buffer::Count => {}
                    Buffer::Save(buf) => buf[at..at + len].copy_from_slice(bytes),
                    Buffer::Load(buf) => bytes.copy_from_slice(&buf[at..at + len]),
                }
                self.bytes_count += len;
                return;
            }
        }
        for i in 0..cells.len() {
            self.transfer_element(cells, i, size);
        }
    }

    fn transfer_element(&mut self, cells: &mut Cells<'_>, index: usize, size: ElementSize) {
        match self.mode {
            Mode::Save => {
                let bits = cells.bits(index);
                self.write_raw(bits, size);
            }
            Mode::Load => {
                if let Some(bits) = self.read_raw(size) {
                    cells.set_bits(index, bits);
                }
            }
        }
    }

    /// Offset of `position` from the base, as stored in a state.
    fn position_offset(&self, position: usize) -> Result<u32, StateError> {
        let offset = position
            .checked_sub(self.base)
            .ok_or(StateError::PositionBeforeBase {
                position,
                base: self.base,
            })?;
        u32::try_from(offset).map_err(|_| StateError::PositionOutOfRange { offset })
    }

    fn transfer_position(&mut self, position: &mut usize) -> Result<(), StateError> {
        match self.mode {
            Mode::Save => {
                let offset = self.position_offset(*position)?;
                self.write_raw(offset, ElementSize::Long);
            }
            Mode::Load => {
                if let Some(offset) = self.read_raw(ElementSize::Long) {
                    let offset = offset as usize;
                    *position = self
                        .base
                        .checked_add(offset)
                        .ok_or(StateError::PositionOutOfRange { offset })?;
                }
            }
        }
        Ok(())
    }

    fn write_raw(&mut self, bits: u32, size: ElementSize) {
        let len = size.bytes();
        let at = self.bytes_count;
        if let Buffer::Save(buf) = &mut self.buffer {
            buf[at..at + len].copy_from_slice(&bits.to_le_bytes()[..len]);
        }
        self.bytes_count += len;
    }

    /// Returns `None` in count mode.
    fn read_raw(&mut self, size: ElementSize) -> Option<u32> {
        let len = size.bytes();
        let at = self.bytes_count;
        self.bytes_count += len;
        let Buffer::Load(buf) = &self.buffer else {
            return None;
        };
        let mut raw = [0u8; 4];
        raw[..len].copy_from_slice(&buf[at..at + len]);
        Some(u32::from_le_bytes(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::savestate::entry::VersionRange;

    struct Sample {
        counter: i16,
        table: [u16; 4],
        flags: [u8; 3],
        cursor: usize,
        retired: u32,
        added: i16,
    }

    impl Sample {
        fn new() -> Self {
            Self {
                counter: -5,
                table: [1, 0x1234, 0xFFFF, 7],
                flags: [1, 0, 1],
                cursor: 0x1000 + 42,
                retired: 0xDEAD_BEEF,
                added: 99,
            }
        }

        fn blank() -> Self {
            Self {
                counter: 0,
                table: [0; 4],
                flags: [0; 3],
                cursor: 0,
                retired: 0,
                added: 0,
            }
        }

        fn entries(&mut self) -> Vec<Entry<'_>> {
            vec![
                Entry::int(&mut self.counter, ElementSize::Word, VersionRange::between(1, 3)),
                Entry::array(&mut self.table, ElementSize::Word, VersionRange::between(1, 3)),
                Entry::array(&mut self.flags, ElementSize::Byte, VersionRange::between(1, 3)),
                Entry::position(&mut self.cursor, VersionRange::between(1, 3)),
                Entry::int(&mut self.retired, ElementSize::Long, VersionRange::between(1, 1)),
                Entry::int(&mut self.added, ElementSize::Word, VersionRange::between(2, 3)),
                Entry::End,
            ]
        }
    }

    fn count(sample: &mut Sample, version: u16) -> usize {
        let mut ser = Serializer::counter(version);
        ser.save_or_load(&mut sample.entries()).unwrap();
        ser.bytes_count()
    }

    fn save(sample: &mut Sample, version: u16, base: usize) -> Vec<u8> {
        let mut buf = vec![0u8; count(sample, version)];
        let mut ser = Serializer::saver(&mut buf, version).with_base(base);
        ser.save_or_load(&mut sample.entries()).unwrap();
        assert_eq!(ser.bytes_count(), buf.len());
        buf
    }

    #[test]
    fn count_depends_on_version() {
        let mut sample = Sample::new();
        // 2 + 8 + 3 + 4, plus the retired u32 or the added i16
        assert_eq!(count(&mut sample, 1), 17 + 4);
        assert_eq!(count(&mut sample, 2), 17 + 2);
        assert_eq!(count(&mut sample, 4), 0);
    }

    #[test]
    fn counting_touches_nothing() {
        let mut sample = Sample::new();
        let mut ser = Serializer::counter(1);
        ser.save_or_load(&mut sample.entries()).unwrap();
        assert_eq!(sample.counter, -5);
        assert_eq!(sample.cursor, 0x1000 + 42);
    }

    #[test]
    fn layout_is_little_endian_in_entry_order() {
        let mut sample = Sample::new();
        let buf = save(&mut sample, 2, 0x1000);
        assert_eq!(
            buf,
            vec![
                0xFB, 0xFF, // counter
                0x01, 0x00, 0x34, 0x12, 0xFF, 0xFF, 0x07, 0x00, // table
                0x01, 0x00, 0x01, // flags
                42, 0, 0, 0, // cursor relative to base
                99, 0, // added
            ]
        );
    }

    #[test]
    fn load_restores_saved_fields() {
        let mut original = Sample::new();
        let buf = save(&mut original, 1, 0x1000);

        let mut restored = Sample::blank();
        let mut ser = Serializer::loader(&buf, 1).with_base(0x8000);
        ser.save_or_load(&mut restored.entries()).unwrap();

        assert_eq!(ser.bytes_count(), buf.len());
        assert_eq!(restored.counter, -5);
        assert_eq!(restored.table, original.table);
        assert_eq!(restored.flags, original.flags);
        assert_eq!(restored.cursor, 0x8000 + 42);
        assert_eq!(restored.retired, 0xDEAD_BEEF);
    }

    #[test]
    fn entries_outside_version_keep_their_value() {
        let mut original = Sample::new();
        let buf = save(&mut original, 1, 0);

        let mut restored = Sample::blank();
        restored.added = 1234;
        let mut ser = Serializer::loader(&buf, 1);
        ser.save_or_load(&mut restored.entries()).unwrap();
        assert_eq!(restored.added, 1234);
    }

    #[test]
    fn widened_elements_round_trip() {
        let mut values = [-2i16, 300];
        let mut buf = vec![0u8; 8];
        Serializer::saver(&mut buf, 1)
            .save_or_load(&mut [Entry::array(&mut values, ElementSize::Long, VersionRange::since(1))])
            .unwrap();
        assert_eq!(buf, vec![0xFE, 0xFF, 0, 0, 0x2C, 0x01, 0, 0]);

        let mut back = [0i16; 2];
        Serializer::loader(&buf, 1)
            .save_or_load(&mut [Entry::array(&mut back, ElementSize::Long, VersionRange::since(1))])
            .unwrap();
        assert_eq!(back, [-2, 300]);
    }

    #[test]
    fn short_buffer_fails_before_any_write() {
        let mut original = Sample::new();
        let buf = save(&mut original, 1, 0);

        let mut restored = Sample::blank();
        restored.counter = 77;
        let mut ser = Serializer::loader(&buf[..buf.len() - 1], 1);
        let err = ser.save_or_load(&mut restored.entries()).unwrap_err();
        assert_eq!(
            err,
            StateError::BufferTooSmall {
                needed: buf.len(),
                available: buf.len() - 1
            }
        );
        assert_eq!(restored.counter, 77);
        assert_eq!(ser.bytes_count(), 0);
    }

    #[test]
    fn short_save_buffer_is_left_untouched() {
        let mut sample = Sample::new();
        let mut buf = vec![0xAAu8; 4];
        let mut ser = Serializer::saver(&mut buf, 1);
        assert!(ser.save_or_load(&mut sample.entries()).is_err());
        assert_eq!(buf, vec![0xAA; 4]);
    }

    #[test]
    fn position_before_base_is_rejected() {
        let mut position = 10usize;
        let mut buf = vec![0u8; 4];
        let mut ser = Serializer::saver(&mut buf, 1).with_base(20);
        let err = ser
            .save_or_load(&mut [Entry::position(&mut position, VersionRange::since(1))])
            .unwrap_err();
        assert!(matches!(err, StateError::PositionBeforeBase { .. }));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn position_past_four_gib_is_rejected() {
        let mut counter = 7i16;
        let mut position = 0x1_0000_0000usize + 5;
        let mut buf = vec![0u8; 6];
        let mut ser = Serializer::saver(&mut buf, 1);
        let err = ser
            .save_or_load(&mut [
                Entry::int(&mut counter, ElementSize::Word, VersionRange::since(1)),
                Entry::position(&mut position, VersionRange::since(1)),
            ])
            .unwrap_err();
        assert_eq!(
            err,
            StateError::PositionOutOfRange {
                offset: 0x1_0000_0005
            }
        );
        assert_eq!(ser.bytes_count(), 0);
        assert_eq!(buf, vec![0u8; 6]);

        // Just below the limit still fits.
        let mut position = 0x1000 + u32::MAX as usize;
        let mut buf = vec![0u8; 4];
        Serializer::saver(&mut buf, 1)
            .with_base(0x1000)
            .save_or_load(&mut [Entry::position(&mut position, VersionRange::since(1))])
            .unwrap();
        assert_eq!(buf, vec![0xFF; 4]);
    }

    #[test]
    fn cursor_carries_across_calls() {
        let mut a = 0x0102u16;
        let mut b = 0x03u8;
        let mut buf = vec![0u8; 3];
        let mut ser = Serializer::saver(&mut buf, 1);
        ser.save_or_load(&mut [Entry::int(&mut a, ElementSize::Word, VersionRange::since(1))])
            .unwrap();
        ser.save_or_load(&mut [Entry::int(&mut b, ElementSize::Byte, VersionRange::since(1))])
            .unwrap();
        assert_eq!(ser.bytes_count(), 3);
        assert_eq!(buf, vec![0x02, 0x01, 0x03]);
    }

    #[test]
    fn walk_stops_at_end_marker() {
        let mut a = 1u8;
        let mut b = 2u8;
        let mut ser = Serializer::counter(1);
        ser.save_or_load(&mut [
            Entry::int(&mut a, ElementSize::Byte, VersionRange::since(1)),
            Entry::End,
            Entry::int(&mut b, ElementSize::Byte, VersionRange::since(1)),
        ])
        .unwrap();
        assert_eq!(ser.bytes_count(), 1);
    }
}
