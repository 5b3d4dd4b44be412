//! Bytecode interpreter.
//!
//! One [`VirtualMachine`] runs the script threads of the current part. The
//! interpreter executes one thread at a time until it yields (`PAUSE` or
//! `KILL`); [`frame`] drives the threads and [`snapshot`] saves and restores
//! everything the interpreter mutates. Variable arithmetic wraps on 16 bits.

mod context;
mod frame;
mod profile;
mod snapshot;
mod threads;
mod variables;


pub use context::{DEFAULT_INSTRUCTION_LIMIT, SpecialKeys, VmOptions};
pub use profile::ExecProfile;
pub use threads::{
    CALL_STACK_SIZE, CallStack, DEACTIVATE_REQUEST, INACTIVE_THREAD, NO_REQUEST, NUM_THREADS,
    ThreadTable,
};
pub use variables::*;

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::host::{Host, Point, PolygonSource};
use crate::virtual_machine::isa::{Instruction, OpCategory, POLY_A_BIT, POLY_B_BIT};
use crate::virtual_machine::program::Script;
use crate::warn;

/// First game part (protection screen).
pub const GAME_PART_FIRST: u16 = 0x3E80;
/// Last game part (password screen).
pub const GAME_PART_LAST: u16 = 0x3E89;

/// True when a resource id names a game part rather than a resource.
pub const fn is_part_id(id: u16) -> bool {
    id >= GAME_PART_FIRST && id <= GAME_PART_LAST
}

/// Color passed for every bytecode polygon draw.
pub const POLYGON_COLOR: u8 = 0xFF;
/// Zoom used when a polygon instruction does not specify one.
pub const DEFAULT_ZOOM: u16 = 0x40;
/// Lowest visible row; polygon variant A folds rows below it into x.
pub const SCREEN_MAX_Y: i16 = 199;

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        host = $host:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => exec_vm!(@call $vm, $host, $handler, $args),
            )*
        }
    }};

    // Handler that calls out to the host (semicolon separator)
    (@call $vm:ident, $host:ident, $handler:ident,
        (host; $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $vm, $kind)?; )*
        $vm.$handler($host, $( $field ),*)
    }};

    // Handler touching VM state only
    (@call $vm:ident, $host:ident, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $vm, $kind)?; )*
        $vm.$handler($( $field ),*)
    }};

    (@read $vm:ident, Var) => { $vm.script.fetch_byte() };
    (@read $vm:ident, Byte) => { $vm.script.fetch_byte() };
    (@read $vm:ident, Word) => { $vm.script.fetch_word() };
    (@read $vm:ident, Addr) => { $vm.script.fetch_word() };
}

/// Cooperative multi-threaded bytecode VM.
///
/// Owns the variable store, the thread table and the call stack. Collaborators
/// are passed into each entry point and never retained.
#[derive(Clone)]
pub struct VirtualMachine {
    /// Bytecode of the current part and the running thread's position in it.
    script: Script,
    variables: Variables,
    threads: ThreadTable,
    call_stack: CallStack,
    /// Part whose bytecode is loaded.
    current_part: Option<u16>,
    /// Part switch to perform at the start of the next frame.
    requested_part: Option<u16>,
    /// Keys consumed by the next `BLIT`.
    keys: SpecialKeys,
    /// Set by `PAUSE`/`KILL` to end the slice.
    yielded: bool,
    /// Offset of the instruction being executed.
    instr_offset: usize,
    /// Clock reading at the last `BLIT`, for pacing only.
    last_timestamp: u32,
    options: VmOptions,
    profile: ExecProfile,
    /// Set once a fatal error escaped a frame.
    aborted: bool,
}

impl Default for VirtualMachine {
    fn default() -> Self {
        Self::new(VmOptions::default())
    }
}

impl VirtualMachine {
    /// Creates a VM with initialized variables and no part loaded.
    pub fn new(options: VmOptions) -> Self {
        Self {
            script: Script::default(),
            variables: Variables::new(),
            threads: ThreadTable::new(),
            call_stack: CallStack::new(),
            current_part: None,
            requested_part: None,
            keys: SpecialKeys::default(),
            yielded: false,
            instr_offset: 0,
            last_timestamp: 0,
            options,
            profile: ExecProfile::new(),
            aborted: false,
        }
    }

    /// Resets variables, threads and the call stack to their init values.
    /// The loaded part is kept.
    pub fn init(&mut self) {
        self.variables.reset();
        self.threads = ThreadTable::new();
        self.call_stack.clear();
        self.requested_part = None;
        self.keys = SpecialKeys::default();
        self.aborted = false;
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut VmOptions {
        &mut self.options
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variable(&self, idx: u8) -> i16 {
        self.variables.get(idx)
    }

    /// Host-side write into the variable store.
    pub fn set_variable(&mut self, idx: u8, value: i16) {
        self.variables.set(idx, value);
    }

    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    pub fn current_part(&self) -> Option<u16> {
        self.current_part
    }

    pub fn requested_part(&self) -> Option<u16> {
        self.requested_part
    }

    /// Instruction counts for the last frame.
    pub fn profile(&self) -> &ExecProfile {
        &self.profile
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Runs the current thread until it yields.
    fn execute_thread<H: Host>(&mut self, host: &mut H, thread: usize) -> Result<(), VMError> {
        self.yielded = false;
        let limit = self.options.instruction_limit;
        let mut executed = 0u64;
        while !self.yielded {
            if executed >= limit {
                return Err(VMError::InstructionLimitExceeded { thread, limit });
            }
            executed += 1;
            self.step(host)?;
        }
        Ok(())
    }

    /// Decodes and executes one instruction.
    fn step<H: Host>(&mut self, host: &mut H) -> Result<(), VMError> {
        self.instr_offset = self.script.pc();
        let opcode = self.script.fetch_byte()?;

        if opcode & POLY_A_BIT != 0 {
            self.profile.record(OpCategory::Polygon);
            return self.op_draw_poly_background(host, opcode);
        }
        if opcode & POLY_B_BIT != 0 {
            self.profile.record(OpCategory::Polygon);
            return self.op_draw_poly_sprite(host, opcode);
        }

        let instr = Instruction::try_from(opcode).map_err(|_| VMError::InvalidInstruction {
            opcode,
            offset: self.instr_offset,
        })?;
        self.profile.record(instr.category());
        self.exec(instr, host)
    }

    /// Executes a single table instruction.
    fn exec<H: Host>(&mut self, instruction: Instruction, host: &mut H) -> Result<(), VMError> {
        exec_vm! {
            vm = self,
            host = host,
            instr = instruction,
            {
                // Variables
                MovConst => op_mov_const(dst: Var, value: Word),
                Mov => op_mov(dst: Var, src: Var),
                Add => op_add(dst: Var, src: Var),
                AddConst => op_add_const(dst: Var, value: Word),
                // Control flow
                Call => op_call(target: Addr),
                Ret => op_ret(),
                PauseThread => op_pause_thread(),
                Jmp => op_jmp(target: Addr),
                SetVec => op_set_vec(thread: Byte, target: Addr),
                Jnz => op_jnz(counter: Var, target: Addr),
                CondJmp => op_cond_jmp(),
                // Video
                SetPalette => op_set_palette(host; palette: Word),
                // Threads
                ResetThread => op_reset_thread(),
                // Video
                SelectPage => op_select_page(host; page: Byte),
                FillPage => op_fill_page(host; page: Byte, color: Byte),
                CopyPage => op_copy_page(host; src: Byte, dst: Byte),
                BlitFramebuffer => op_blit_framebuffer(host; page: Byte),
                KillThread => op_kill_thread(),
                DrawString => op_draw_string(host; string_id: Word, x: Byte, y: Byte, color: Byte),
                // Variables
                Sub => op_sub(dst: Var, src: Var),
                And => op_and(dst: Var, mask: Word),
                Or => op_or(dst: Var, mask: Word),
                Shl => op_shl(dst: Var, amount: Word),
                Shr => op_shr(dst: Var, amount: Word),
                // Audio / resources
                PlaySound => op_play_sound(host; resource: Word, frequency: Byte, volume: Byte, channel: Byte),
                UpdateResources => op_update_resources(host; resource: Word),
                PlayMusic => op_play_music(host; resource: Word, delay: Word, position: Byte),
            }
        }
    }

    // ==== Polygons ====

    /// Variant A: 15-bit offset split across the opcode and one byte, then
    /// unsigned x/y bytes.
    fn op_draw_poly_background<H: Host>(&mut self, host: &mut H, opcode: u8) -> Result<(), VMError> {
        let low = self.script.fetch_byte()?;
        let offset = (((opcode as u16) << 8) | low as u16).wrapping_mul(2);
        let mut x = self.script.fetch_byte()? as i16;
        let mut y = self.script.fetch_byte()? as i16;

        let overflow = y - SCREEN_MAX_Y;
        if overflow > 0 {
            y = SCREEN_MAX_Y;
            x += overflow;
        }

        host.draw_polygon(
            PolygonSource::Cinematic,
            offset,
            POLYGON_COLOR,
            DEFAULT_ZOOM,
            Point::new(x, y),
        );
        Ok(())
    }

    /// Variant B: opcode bits 5..0 pick the encoding of x, y and zoom.
    fn op_draw_poly_sprite<H: Host>(&mut self, host: &mut H, opcode: u8) -> Result<(), VMError> {
        let offset = self.script.fetch_word()?.wrapping_mul(2);

        let mut x = self.script.fetch_byte()? as i16;
        if opcode & 0x20 == 0 {
            if opcode & 0x10 == 0 {
                let low = self.script.fetch_byte()?;
                x = (((x as u16) << 8) | low as u16) as i16;
            } else {
                x = self.variables.get(x as u8);
            }
        } else if opcode & 0x10 != 0 {
            x += 0x100;
        }

        let mut y = self.script.fetch_byte()? as i16;
        if opcode & 0x08 == 0 {
            if opcode & 0x04 == 0 {
                let low = self.script.fetch_byte()?;
                y = (((y as u16) << 8) | low as u16) as i16;
            } else {
                y = self.variables.get(y as u8);
            }
        }

        let (zoom, source) = match opcode & 0x03 {
            0b00 => (DEFAULT_ZOOM, PolygonSource::Cinematic),
            0b01 => {
                let var = self.script.fetch_byte()?;
                (self.variables.get(var) as u16, PolygonSource::Cinematic)
            }
            0b10 => (self.script.fetch_byte()? as u16, PolygonSource::Cinematic),
            _ => (DEFAULT_ZOOM, PolygonSource::Alternate),
        };

        host.draw_polygon(source, offset, POLYGON_COLOR, zoom, Point::new(x, y));
        Ok(())
    }

    // ==== Variables ====

    fn op_mov_const(&mut self, dst: u8, value: u16) -> Result<(), VMError> {
        self.variables.set(dst, value as i16);
        Ok(())
    }

    fn op_mov(&mut self, dst: u8, src: u8) -> Result<(), VMError> {
        self.variables.set(dst, self.variables.get(src));
        Ok(())
    }

    fn op_add(&mut self, dst: u8, src: u8) -> Result<(), VMError> {
        let value = self.variables.get(dst).wrapping_add(self.variables.get(src));
        self.variables.set(dst, value);
        Ok(())
    }

    fn op_add_const(&mut self, dst: u8, value: u16) -> Result<(), VMError> {
        let value = self.variables.get(dst).wrapping_add(value as i16);
        self.variables.set(dst, value);
        Ok(())
    }

    fn op_sub(&mut self, dst: u8, src: u8) -> Result<(), VMError> {
        let value = self.variables.get(dst).wrapping_sub(self.variables.get(src));
        self.variables.set(dst, value);
        Ok(())
    }

    fn op_and(&mut self, dst: u8, mask: u16) -> Result<(), VMError> {
        self.variables.set(dst, (self.variables.get_u16(dst) & mask) as i16);
        Ok(())
    }

    fn op_or(&mut self, dst: u8, mask: u16) -> Result<(), VMError> {
        self.variables.set(dst, (self.variables.get_u16(dst) | mask) as i16);
        Ok(())
    }

    fn op_shl(&mut self, dst: u8, amount: u16) -> Result<(), VMError> {
        let value = self
            .variables
            .get_u16(dst)
            .checked_shl(amount as u32)
            .unwrap_or(0);
        self.variables.set(dst, value as i16);
        Ok(())
    }

    fn op_shr(&mut self, dst: u8, amount: u16) -> Result<(), VMError> {
        let value = self
            .variables
            .get_u16(dst)
            .checked_shr(amount as u32)
            .unwrap_or(0);
        self.variables.set(dst, value as i16);
        Ok(())
    }

    // ==== Control flow ====

    fn op_call(&mut self, target: u16) -> Result<(), VMError> {
        let return_to = self.script.pc_u16()?;
        self.call_stack.push(return_to, self.instr_offset)?;
        self.script.jump(target);
        Ok(())
    }

    fn op_ret(&mut self) -> Result<(), VMError> {
        let return_to = self.call_stack.pop(self.instr_offset)?;
        self.script.jump(return_to);
        Ok(())
    }

    fn op_jmp(&mut self, target: u16) -> Result<(), VMError> {
        self.script.jump(target);
        Ok(())
    }

    fn op_jnz(&mut self, counter: u8, target: u16) -> Result<(), VMError> {
        let value = self.variables.get(counter).wrapping_sub(1);
        self.variables.set(counter, value);
        if value != 0 {
            self.script.jump(target);
        }
        Ok(())
    }

    /// `JMP_IF`: condition byte, left variable, right operand, target.
    fn op_cond_jmp(&mut self) -> Result<(), VMError> {
        let cond = self.script.fetch_byte()?;
        let lhs = self.variables.get(self.script.fetch_byte()?);
        let rhs = if cond & 0x80 != 0 {
            let var = self.script.fetch_byte()?;
            self.variables.get(var)
        } else if cond & 0x40 != 0 {
            self.script.fetch_word()? as i16
        } else {
            self.script.fetch_byte()? as i16
        };
        let target = self.script.fetch_word()?;

        let taken = match cond & 7 {
            0 => lhs == rhs,
            1 => lhs != rhs,
            2 => lhs > rhs,
            3 => lhs >= rhs,
            4 => lhs < rhs,
            5 => lhs <= rhs,
            code => {
                warn!(
                    "JMP_IF at 0x{:04X}: unknown comparison {}",
                    self.instr_offset, code
                );
                false
            }
        };
        if taken {
            self.script.jump(target);
        }
        Ok(())
    }

    // ==== Threads ====

    fn op_pause_thread(&mut self) -> Result<(), VMError> {
        self.yielded = true;
        Ok(())
    }

    fn op_kill_thread(&mut self) -> Result<(), VMError> {
        self.script.jump(INACTIVE_THREAD);
        self.yielded = true;
        Ok(())
    }

    fn op_set_vec(&mut self, thread: u8, target: u16) -> Result<(), VMError> {
        self.threads.request_pc(thread, target)
    }

    /// `RESET_THREADS first, last, action` over `first..=last`. The action
    /// byte is not fetched for an empty range.
    fn op_reset_thread(&mut self) -> Result<(), VMError> {
        let first = self.script.fetch_byte()?;
        let last = self.script.fetch_byte()? & (NUM_THREADS as u8 - 1);
        if last < first {
            warn!(
                "RESET_THREADS at 0x{:04X}: empty range {}..={}",
                self.instr_offset, first, last
            );
            return Ok(());
        }
        let action = self.script.fetch_byte()?;
        for thread in first..=last {
            match action {
                0 | 1 => self.threads.request_pause(thread, action == 1)?,
                2 => self.threads.request_pc(thread, DEACTIVATE_REQUEST)?,
                _ => {
                    warn!(
                        "RESET_THREADS at 0x{:04X}: unknown action {}",
                        self.instr_offset, action
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    // ==== Video ====

    fn op_set_palette<H: Host>(&mut self, host: &mut H, palette: u16) -> Result<(), VMError> {
        host.set_palette((palette >> 8) as u8);
        Ok(())
    }

    fn op_select_page<H: Host>(&mut self, host: &mut H, page: u8) -> Result<(), VMError> {
        host.select_page(page);
        Ok(())
    }

    fn op_fill_page<H: Host>(&mut self, host: &mut H, page: u8, color: u8) -> Result<(), VMError> {
        host.fill_page(page, color);
        Ok(())
    }

    fn op_copy_page<H: Host>(&mut self, host: &mut H, src: u8, dst: u8) -> Result<(), VMError> {
        host.copy_page(src, dst, self.variables.get(VAR_SCROLL_Y));
        Ok(())
    }

    fn op_blit_framebuffer<H: Host>(&mut self, host: &mut H, page: u8) -> Result<(), VMError> {
        self.handle_special_keys();

        if self.options.pacing {
            let elapsed = host.timestamp().wrapping_sub(self.last_timestamp) as i64;
            let budget = self.variables.get(VAR_PAUSE_SLICES) as i64 * 20;
            let remaining = budget - elapsed;
            if remaining > 0 {
                host.wait(remaining as u32);
            }
        }
        self.last_timestamp = host.timestamp();

        self.variables.set(VAR_BLIT_FLAG, 0);
        if self.options.render {
            host.update_display(page);
        }
        Ok(())
    }

    fn op_draw_string<H: Host>(
        &mut self,
        host: &mut H,
        string_id: u16,
        x: u8,
        y: u8,
        color: u8,
    ) -> Result<(), VMError> {
        host.draw_string(string_id, x, y, color);
        Ok(())
    }

    // ==== Audio / resources ====

    fn op_play_sound<H: Host>(
        &mut self,
        host: &mut H,
        resource: u16,
        frequency: u8,
        volume: u8,
        channel: u8,
    ) -> Result<(), VMError> {
        host.play_sound(resource, frequency, volume, channel);
        Ok(())
    }

    fn op_play_music<H: Host>(
        &mut self,
        host: &mut H,
        resource: u16,
        delay: u16,
        position: u8,
    ) -> Result<(), VMError> {
        host.play_music(resource, delay, position);
        Ok(())
    }

    /// 0 drops every loaded resource, a part id schedules a part switch,
    /// anything else is loaded.
    fn op_update_resources<H: Host>(&mut self, host: &mut H, resource: u16) -> Result<(), VMError> {
        if resource == 0 {
            host.stop_all();
            host.invalidate_resources();
        } else if is_part_id(resource) {
            self.request_part_switch(resource);
        } else {
            host.load_resource(resource);
        }
        Ok(())
    }
}
