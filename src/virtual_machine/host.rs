//! Collaborator interfaces consumed by the VM.
//!
//! The VM never stores a reference to its collaborators: every entry point
//! takes `&mut H where H: Host` for the duration of the call, mirroring how
//! rendering, audio and resource loading sit outside the deterministic core.

use crate::savestate::Entry;
use crate::types::bytes::Bytes;
use crate::virtual_machine::errors::VMError;

/// Polygon data a draw reads from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PolygonSource {
    /// Cinematic polygon segment.
    Cinematic,
    /// Alternate segment selected by polygon variant B.
    Alternate,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

impl Point {
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

/// Rendering collaborator. Fire-and-forget: nothing it does is read back.
pub trait Renderer {
    fn draw_polygon(&mut self, source: PolygonSource, offset: u16, color: u8, zoom: u16, at: Point);
    fn draw_string(&mut self, string_id: u16, x: u8, y: u8, color: u8);
    fn set_palette(&mut self, palette: u8);
    fn select_page(&mut self, page: u8);
    fn fill_page(&mut self, page: u8, color: u8);
    fn copy_page(&mut self, src: u8, dst: u8, scroll_y: i16);
    fn update_display(&mut self, page: u8);
}

pub trait Audio {
    fn play_sound(&mut self, resource_id: u16, frequency: u8, volume: u8, channel: u8);
    fn play_music(&mut self, resource_id: u16, delay: u16, position: u8);
    /// Stops every channel and the music sequencer.
    fn stop_all(&mut self);
    /// Music mark published since the last frame, if any.
    fn take_music_mark(&mut self) -> Option<i16> {
        None
    }
}

pub trait Resources {
    fn load_resource(&mut self, resource_id: u16);
    fn invalidate_resources(&mut self);
    /// Loads a part and returns its bytecode.
    fn setup_part(&mut self, part: u16) -> Result<Bytes, VMError>;
}

/// Host pacing. Never consulted for VM-visible state.
pub trait Clock {
    /// Monotonic milliseconds.
    fn timestamp(&self) -> u32;
    /// Advisory delay before the next display update.
    fn wait(&mut self, _millis: u32) {}
}

/// Collaborator-owned fields appended after the VM block in a save state.
pub trait HostState {
    fn state_entries(&mut self) -> Vec<Entry<'_>> {
        Vec::new()
    }
}

/// Everything the VM calls out to.
pub trait Host: Renderer + Audio + Resources + Clock + HostState {}

impl<T: Renderer + Audio + Resources + Clock + HostState> Host for T {}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::savestate::{ElementSize, VersionRange};
    use std::collections::HashMap;

    /// One recorded collaborator call.
    #[derive(Clone, Debug, Eq, PartialEq)]
    pub enum HostCall {
        DrawPolygon {
            source: PolygonSource,
            offset: u16,
            color: u8,
            zoom: u16,
            at: Point,
        },
        DrawString {
            string_id: u16,
            x: u8,
            y: u8,
            color: u8,
        },
        SetPalette(u8),
        SelectPage(u8),
        FillPage {
            page: u8,
            color: u8,
        },
        CopyPage {
            src: u8,
            dst: u8,
            scroll_y: i16,
        },
        UpdateDisplay(u8),
        PlaySound {
            resource_id: u16,
            frequency: u8,
            volume: u8,
            channel: u8,
        },
        PlayMusic {
            resource_id: u16,
            delay: u16,
            position: u8,
        },
        StopAll,
        LoadResource(u16),
        InvalidateResources,
        SetupPart(u16),
        Wait(u32),
    }

    /// Host that records every call and serves parts from a map.
    #[derive(Default)]
    pub struct RecordingHost {
        pub parts: HashMap<u16, Bytes>,
        pub calls: Vec<HostCall>,
        pub now: u32,
        pub music_mark: Option<i16>,
        /// Fields appended to save states when `expose_state` is set.
        pub palette_state: [u8; 2],
        pub expose_state: bool,
    }

    impl RecordingHost {
        pub fn with_part(part: u16, code: impl Into<Bytes>) -> Self {
            let mut host = Self::default();
            host.parts.insert(part, code.into());
            host
        }

        pub fn add_part(&mut self, part: u16, code: impl Into<Bytes>) {
            self.parts.insert(part, code.into());
        }

        pub fn polygons(&self) -> Vec<&HostCall> {
            self.calls
                .iter()
                .filter(|call| matches!(call, HostCall::DrawPolygon { .. }))
                .collect()
        }

        pub fn clear(&mut self) {
            self.calls.clear();
        }
    }

    impl Renderer for RecordingHost {
        fn draw_polygon(&mut self, source: PolygonSource, offset: u16, color: u8, zoom: u16, at: Point) {
            self.calls.push(HostCall::DrawPolygon {
                source,
                offset,
                color,
                zoom,
                at,
            });
        }

        fn draw_string(&mut self, string_id: u16, x: u8, y: u8, color: u8) {
            self.calls.push(HostCall::DrawString {
                string_id,
                x,
                y,
                color,
            });
        }

        fn set_palette(&mut self, palette: u8) {
            self.palette_state[0] = palette;
            self.calls.push(HostCall::SetPalette(palette));
        }

        fn select_page(&mut self, page: u8) {
            self.calls.push(HostCall::SelectPage(page));
        }

        fn fill_page(&mut self, page: u8, color: u8) {
            self.calls.push(HostCall::FillPage { page, color });
        }

        fn copy_page(&mut self, src: u8, dst: u8, scroll_y: i16) {
            self.calls.push(HostCall::CopyPage { src, dst, scroll_y });
        }

        fn update_display(&mut self, page: u8) {
            self.palette_state[1] = page;
            self.calls.push(HostCall::UpdateDisplay(page));
        }
    }

    impl Audio for RecordingHost {
        fn play_sound(&mut self, resource_id: u16, frequency: u8, volume: u8, channel: u8) {
            self.calls.push(HostCall::PlaySound {
                resource_id,
                frequency,
                volume,
                channel,
            });
        }

        fn play_music(&mut self, resource_id: u16, delay: u16, position: u8) {
            self.calls.push(HostCall::PlayMusic {
                resource_id,
                delay,
                position,
            });
        }

        fn stop_all(&mut self) {
            self.calls.push(HostCall::StopAll);
        }

        fn take_music_mark(&mut self) -> Option<i16> {
            self.music_mark.take()
        }
    }

    impl Resources for RecordingHost {
        fn load_resource(&mut self, resource_id: u16) {
            self.calls.push(HostCall::LoadResource(resource_id));
        }

        fn invalidate_resources(&mut self) {
            self.calls.push(HostCall::InvalidateResources);
        }

        fn setup_part(&mut self, part: u16) -> Result<Bytes, VMError> {
            self.calls.push(HostCall::SetupPart(part));
            self.parts
                .get(&part)
                .cloned()
                .ok_or(VMError::UnknownPart { part })
        }
    }

    impl Clock for RecordingHost {
        fn timestamp(&self) -> u32 {
            self.now
        }

        fn wait(&mut self, millis: u32) {
            self.now += millis;
            self.calls.push(HostCall::Wait(millis));
        }
    }

    impl HostState for RecordingHost {
        fn state_entries(&mut self) -> Vec<Entry<'_>> {
            if !self.expose_state {
                return Vec::new();
            }
            vec![Entry::array(
                &mut self.palette_state,
                ElementSize::Byte,
                VersionRange::since(1),
            )]
        }
    }

    #[test]
    fn setup_unknown_part_fails() {
        let mut host = RecordingHost::default();
        assert!(matches!(
            host.setup_part(0x3E80),
            Err(VMError::UnknownPart { part: 0x3E80 })
        ));
        assert_eq!(host.calls, vec![HostCall::SetupPart(0x3E80)]);
    }

    #[test]
    fn host_entries_only_when_exposed() {
        let mut host = RecordingHost::default();
        assert!(host.state_entries().is_empty());
        host.expose_state = true;
        assert_eq!(host.state_entries().len(), 1);
    }

    #[test]
    fn music_mark_is_taken_once() {
        let mut host = RecordingHost {
            music_mark: Some(3),
            ..Default::default()
        };
        assert_eq!(host.take_music_mark(), Some(3));
        assert_eq!(host.take_music_mark(), None);
    }
}
