//! Collaborators for running without a screen or a sound card.

use crate::types::bytes::Bytes;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::host::{Audio, Clock, HostState, Point, PolygonSource, Renderer, Resources};
use crate::virtual_machine::program::Program;

/// Call counters kept by [`HeadlessHost`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HostStats {
    pub polygons: u64,
    pub strings: u64,
    pub display_updates: u64,
    pub sounds: u64,
    pub music: u64,
    pub resources_loaded: u64,
    pub part_loads: u64,
}

/// Serves part bytecode from a [`Program`] and counts everything else.
///
/// The clock is virtual: it only moves when the VM asks to wait, so runs are
/// reproducible regardless of wall time.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    program: Program,
    stats: HostStats,
    now: u32,
    last_page: Option<u8>,
}

impl HeadlessHost {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            ..Self::default()
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn stats(&self) -> HostStats {
        self.stats
    }

    /// Page of the last display update.
    pub fn last_page(&self) -> Option<u8> {
        self.last_page
    }

    /// Current reading of the virtual clock.
    pub fn now(&self) -> u32 {
        self.now
    }
}

impl Renderer for HeadlessHost {
    fn draw_polygon(&mut self, _source: PolygonSource, _offset: u16, _color: u8, _zoom: u16, _at: Point) {
        self.stats.polygons += 1;
    }

    fn draw_string(&mut self, _string_id: u16, _x: u8, _y: u8, _color: u8) {
        self.stats.strings += 1;
    }

    fn set_palette(&mut self, _palette: u8) {}

    fn select_page(&mut self, _page: u8) {}

    fn fill_page(&mut self, _page: u8, _color: u8) {}

    fn copy_page(&mut self, _src: u8, _dst: u8, _scroll_y: i16) {}

    fn update_display(&mut self, page: u8) {
        self.stats.display_updates += 1;
        self.last_page = Some(page);
    }
}

impl Audio for HeadlessHost {
    fn play_sound(&mut self, _resource_id: u16, _frequency: u8, _volume: u8, _channel: u8) {
        self.stats.sounds += 1;
    }

    fn play_music(&mut self, _resource_id: u16, _delay: u16, _position: u8) {
        self.stats.music += 1;
    }

    fn stop_all(&mut self) {}
}

impl Resources for HeadlessHost {
    fn load_resource(&mut self, _resource_id: u16) {
        self.stats.resources_loaded += 1;
    }

    fn invalidate_resources(&mut self) {}

    fn setup_part(&mut self, part: u16) -> Result<Bytes, VMError> {
        let code = self
            .program
            .part(part)
            .map(|p| p.bytecode.clone())
            .ok_or(VMError::UnknownPart { part })?;
        self.stats.part_loads += 1;
        Ok(code)
    }
}

impl Clock for HeadlessHost {
    fn timestamp(&self) -> u32 {
        self.now
    }

    fn wait(&mut self, millis: u32) {
        self.now = self.now.wrapping_add(millis);
    }
}

impl HostState for HeadlessHost {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::Engine;
    use crate::virtual_machine::assembler::assemble_source;
    use crate::virtual_machine::vm::{GAME_PART_FIRST, VAR_PAUSE_SLICES, VmOptions};

    const SOURCE: &str = r#"
    [ part 0x3E80 ]
        SET v255, 2
    loop:
        POLY_BG 0x0010, 10, 20
        DRAW_STRING 5, 1, 2, 3
        PLAY_SOUND 0x20, 1, 2, 3
        LOAD_RESOURCE 0x30
        BLIT 1
        PAUSE
        JMP loop
    "#;

    fn headless(options: VmOptions) -> Engine<HeadlessHost> {
        let program = assemble_source(SOURCE).unwrap();
        Engine::new(HeadlessHost::new(program), options, GAME_PART_FIRST).unwrap()
    }

    #[test]
    fn counts_collaborator_calls() {
        let mut engine = headless(VmOptions::default());
        for _ in 0..3 {
            engine.run_frame().unwrap();
        }
        let stats = engine.host().stats();
        assert_eq!(stats.polygons, 3);
        assert_eq!(stats.strings, 3);
        assert_eq!(stats.sounds, 3);
        assert_eq!(stats.resources_loaded, 3);
        assert_eq!(stats.display_updates, 3);
        assert_eq!(stats.part_loads, 1);
        assert_eq!(engine.host().last_page(), Some(1));
    }

    #[test]
    fn headless_options_skip_display() {
        let mut engine = headless(VmOptions::headless());
        engine.run_frame().unwrap();
        assert_eq!(engine.host().stats().display_updates, 0);
        assert_eq!(engine.host().stats().polygons, 1);
    }

    #[test]
    fn clock_only_moves_when_pacing() {
        let mut engine = headless(VmOptions::default());
        engine.run_frame().unwrap();
        assert_eq!(engine.host().now(), 0);

        let mut paced = headless(VmOptions {
            pacing: true,
            ..VmOptions::default()
        });
        paced.run_frame().unwrap();
        assert_eq!(paced.vm().variable(VAR_PAUSE_SLICES), 2);
        assert!(paced.host().now() > 0);
    }

    #[test]
    fn unknown_part_is_reported() {
        let mut host = HeadlessHost::new(Program::default());
        assert!(matches!(
            host.setup_part(GAME_PART_FIRST),
            Err(VMError::UnknownPart { part: GAME_PART_FIRST })
        ));
        assert_eq!(host.stats().part_loads, 0);
    }
}
