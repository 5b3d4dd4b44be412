//! Frame scheduling: part switches, request commits, player input and the
//! round-robin over the 64 threads.

use super::{
    GAME_PART_FIRST, GAME_PART_LAST, NUM_THREADS, VirtualMachine, VAR_HERO_ACTION,
    VAR_HERO_ACTION_POS_MASK, VAR_HERO_POS_JUMP_DOWN, VAR_HERO_POS_LEFT_RIGHT, VAR_HERO_POS_MASK,
    VAR_HERO_POS_UP_DOWN, VAR_LAST_KEYCHAR, VAR_MUS_MARK, VAR_PART_FLAG, VAR_SPECIAL_KEY_CHECK,
    PART_FLAG_INIT,
};
use crate::virtual_machine::program::Script;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::host::Host;
use crate::virtual_machine::input::PlayerInput;
use crate::{debug, error, info, warn};

impl VirtualMachine {
    /// Stops audio, loads the part's bytecode and restarts thread 0 at 0.
    pub fn init_for_part<H: Host>(&mut self, host: &mut H, part: u16) -> Result<(), VMError> {
        host.stop_all();
        self.variables.set(VAR_PART_FLAG, PART_FLAG_INIT);
        let code = host.setup_part(part)?;
        self.script = Script::new(code);
        self.threads.reset_for_part();
        self.current_part = Some(part);
        info!("Part 0x{:04X} loaded ({} bytes)", part, self.script.len());
        Ok(())
    }

    /// Schedules a part switch for the start of the next frame.
    pub fn request_part_switch(&mut self, part: u16) {
        self.requested_part = Some(part);
    }

    /// Commit phase: pending part switch, music mark, then thread requests.
    pub fn check_thread_requests<H: Host>(&mut self, host: &mut H) -> Result<(), VMError> {
        self.ensure_running()?;
        let result = self.commit(host);
        self.poison_on_fatal(result)
    }

    fn commit<H: Host>(&mut self, host: &mut H) -> Result<(), VMError> {
        if let Some(part) = self.requested_part.take() {
            self.init_for_part(host, part)?;
        }
        if let Some(mark) = host.take_music_mark() {
            self.variables.set(VAR_MUS_MARK, mark);
        }
        self.threads.commit_requests();
        Ok(())
    }

    /// Writes the hero variables for this frame's input and queues its
    /// special keys for the next `BLIT`.
    pub fn update_player(&mut self, input: &PlayerInput) {
        let mut lr = 0i16;
        let mut ud = 0i16;
        let mut mask = 0i16;

        if input.right {
            lr = 1;
            mask |= 1;
        }
        if input.left {
            lr = -1;
            mask |= 2;
        }
        if input.down {
            ud = 1;
            mask |= 4;
        }
        self.variables
            .set(VAR_HERO_POS_UP_DOWN, if input.up { -1 } else { ud });
        if input.up {
            ud = -1;
            mask |= 8;
        }
        self.variables.set(VAR_HERO_POS_JUMP_DOWN, ud);
        self.variables.set(VAR_HERO_POS_LEFT_RIGHT, lr);
        self.variables.set(VAR_HERO_POS_MASK, mask);

        let mut action = 0i16;
        if input.fire {
            action = 1;
            mask |= 0x80;
        }
        self.variables.set(VAR_HERO_ACTION, action);
        self.variables.set(VAR_HERO_ACTION_POS_MASK, mask);

        if self.current_part == Some(GAME_PART_LAST) {
            let c = input.last_char;
            if c == 8 || c == 0 || c.is_ascii_lowercase() {
                self.variables.set(VAR_LAST_KEYCHAR, (c & !0x20) as i16);
            }
        }

        self.keys.code |= input.keys.code;
        self.keys.pause |= input.keys.pause;
    }

    /// Run phase: one slice for every runnable thread, lowest index first.
    pub fn host_frame<H: Host>(&mut self, host: &mut H) -> Result<(), VMError> {
        self.ensure_running()?;
        let result = self.run_threads(host);
        self.poison_on_fatal(result)
    }

    fn run_threads<H: Host>(&mut self, host: &mut H) -> Result<(), VMError> {
        self.profile = Default::default();
        for thread in 0..NUM_THREADS {
            if !self.threads.is_runnable(thread) {
                continue;
            }
            self.script.jump(self.threads.pc(thread));
            self.call_stack.reset_depth();
            self.profile.record_slice();

            self.execute_thread(host, thread)?;

            let pc = self.script.pc_u16()?;
            self.threads.set_pc(thread, pc);
        }
        debug!(
            "Frame done: {} instructions in {} slices",
            self.profile.total(),
            self.profile.slices()
        );
        Ok(())
    }

    /// Commit then run, without touching player input.
    pub fn run_frame<H: Host>(&mut self, host: &mut H) -> Result<(), VMError> {
        self.check_thread_requests(host)?;
        self.host_frame(host)
    }

    /// Commit, apply `input`, run.
    pub fn advance_frame<H: Host>(&mut self, host: &mut H, input: &PlayerInput) -> Result<(), VMError> {
        self.check_thread_requests(host)?;
        self.update_player(input);
        self.host_frame(host)
    }

    /// Consumes keys queued by [`update_player`](Self::update_player).
    pub(super) fn handle_special_keys(&mut self) {
        if self.keys.pause {
            debug!("Pause key acknowledged");
            self.keys.pause = false;
        }

        if self.keys.code {
            self.keys.code = false;
            let on_edge = matches!(self.current_part, Some(GAME_PART_FIRST | GAME_PART_LAST));
            if !on_edge {
                self.request_part_switch(GAME_PART_LAST);
            }
        }

        if self.variables.get(VAR_SPECIAL_KEY_CHECK) == 1 {
            warn!("Script set variable 0x{:02X} to 1", VAR_SPECIAL_KEY_CHECK);
        }
    }

    fn ensure_running(&self) -> Result<(), VMError> {
        if self.aborted {
            return Err(VMError::Aborted);
        }
        Ok(())
    }

    fn poison_on_fatal(&mut self, result: Result<(), VMError>) -> Result<(), VMError> {
        if let Err(err) = &result {
            if err.is_fatal() {
                error!("VM aborted: {}", err);
                self.aborted = true;
            }
        }
        result
    }
}
