//! Frame-level facade over a VM and its host.

use crate::info;
use crate::savestate::file::StateFile;
use crate::savestate::{CURRENT_STATE_VERSION, Serializer, StateError};
use crate::types::hash::Hash;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::host::Host;
use crate::virtual_machine::input::PlayerInput;
use crate::virtual_machine::vm::{GAME_PART_FIRST, VirtualMachine, VmOptions};

/// A VM bound to the collaborators it runs against.
///
/// Generic over the host so test, headless and interactive collaborator sets
/// share one code path.
pub struct Engine<H: Host> {
    vm: VirtualMachine,
    host: H,
    /// Append the host's entries after the VM block in save states.
    host_state: bool,
}

impl<H: Host> Engine<H> {
    /// Creates an engine and loads `part` immediately.
    pub fn new(mut host: H, options: VmOptions, part: u16) -> Result<Self, VMError> {
        let mut vm = VirtualMachine::new(options);
        vm.init_for_part(&mut host, part)?;
        info!(
            "Engine started on part 0x{:04X} (instruction limit {})",
            part,
            vm.options().instruction_limit
        );
        Ok(Self {
            vm,
            host,
            host_state: false,
        })
    }

    /// Enables or disables the host block in save states.
    pub fn with_host_state(mut self, enabled: bool) -> Self {
        self.host_state = enabled;
        self
    }

    pub fn host_state_enabled(&self) -> bool {
        self.host_state
    }

    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut VirtualMachine {
        &mut self.vm
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    /// Re-initializes the VM and restarts on `part`. Clears an abort.
    pub fn reset(&mut self, part: u16) -> Result<(), VMError> {
        self.vm.init();
        self.vm.init_for_part(&mut self.host, part)
    }

    /// Parses `token` and advances one frame with it.
    ///
    /// A malformed token is rejected before anything runs.
    pub fn advance_state(&mut self, token: &str) -> Result<(), VMError> {
        let input: PlayerInput = token.parse()?;
        self.advance(&input)
    }

    /// Advances one frame with an already parsed input.
    pub fn advance(&mut self, input: &PlayerInput) -> Result<(), VMError> {
        self.vm.advance_frame(&mut self.host, input)
    }

    /// Advances one frame without touching the hero variables.
    pub fn run_frame(&mut self) -> Result<(), VMError> {
        self.vm.run_frame(&mut self.host)
    }

    pub fn request_part_switch(&mut self, part: u16) {
        self.vm.request_part_switch(part);
    }

    pub fn state_hash(&self) -> Hash {
        self.vm.state_hash()
    }

    /// Bytes a full state takes at `version`.
    pub fn state_size(&mut self, version: u16) -> usize {
        let vm_size = self.vm.state_size(version);
        vm_size + self.host_state_size(version)
    }

    fn host_state_size(&mut self, version: u16) -> usize {
        if !self.host_state {
            return 0;
        }
        Serializer::counter(version).measure(&self.host.state_entries())
    }

    /// Writes a full state at the current version and returns its size.
    /// Pass `None` to only compute the size.
    pub fn serialize_state(&mut self, buffer: Option<&mut [u8]>) -> Result<usize, StateError> {
        let needed = self.state_size(CURRENT_STATE_VERSION);
        let mut serializer = match buffer {
            Some(buffer) if buffer.len() < needed => {
                return Err(StateError::BufferTooSmall {
                    needed,
                    available: buffer.len(),
                });
            }
            Some(buffer) => Serializer::saver(buffer, CURRENT_STATE_VERSION),
            None => Serializer::counter(CURRENT_STATE_VERSION),
        };

        self.vm.save_or_load(&mut serializer)?;
        if self.host_state {
            serializer.save_or_load(&mut self.host.state_entries())?;
        }
        Ok(serializer.bytes_count())
    }

    /// Loads a full state written at the current version.
    pub fn deserialize_state(&mut self, buffer: &[u8]) -> Result<usize, StateError> {
        self.deserialize_state_version(buffer, CURRENT_STATE_VERSION)
    }

    /// Loads a full state written at `version`. Nothing is modified when the
    /// buffer does not hold exactly one state.
    pub fn deserialize_state_version(&mut self, buffer: &[u8], version: u16) -> Result<usize, StateError> {
        let vm_size = self.check_state(buffer, version)?;
        let (vm_block, host_block) = buffer.split_at(vm_size);
        let mut read = self.vm.deserialize_state_version(vm_block, version)?;
        if self.host_state {
            let mut serializer = Serializer::loader(host_block, version);
            serializer.save_or_load(&mut self.host.state_entries())?;
            read += serializer.bytes_count();
        }
        Ok(read)
    }

    /// Checks `buffer` against the layout at `version` and returns the size
    /// of its VM block.
    fn check_state(&mut self, buffer: &[u8], version: u16) -> Result<usize, StateError> {
        if version == 0 || version > CURRENT_STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                version,
                current: CURRENT_STATE_VERSION,
            });
        }
        let vm_size = self.vm.state_size(version);
        let expected = vm_size + self.host_state_size(version);
        if buffer.len() != expected {
            return Err(StateError::SizeMismatch {
                expected,
                actual: buffer.len(),
            });
        }
        Ok(vm_size)
    }

    /// Captures the current state with the part it belongs to.
    pub fn save_state_file(&mut self) -> Result<StateFile, StateError> {
        let mut payload = vec![0u8; self.state_size(CURRENT_STATE_VERSION)];
        self.serialize_state(Some(payload.as_mut_slice()))?;
        let part = self.vm.current_part().unwrap_or(GAME_PART_FIRST);
        Ok(StateFile::new(part, payload))
    }

    /// Restores a state file, switching parts first when it was taken on
    /// another part.
    ///
    /// The payload is checked before the switch. If the switch or the load
    /// still fails, the VM is put back as it was.
    pub fn load_state_file(&mut self, file: &StateFile) -> Result<(), VMError> {
        self.check_state(&file.payload, file.version)?;
        if self.vm.current_part() != Some(file.part) {
            let previous = self.vm.clone();
            let switched = self
                .vm
                .init_for_part(&mut self.host, file.part)
                .and_then(|()| {
                    self.deserialize_state_version(&file.payload, file.version)
                        .map_err(VMError::from)
                });
            if let Err(e) = switched {
                self.vm = previous;
                return Err(e);
            }
        } else {
            self.deserialize_state_version(&file.payload, file.version)?;
        }
        info!(
            "Loaded state for part 0x{:04X} (v{}, {})",
            file.part,
            file.version,
            file.payload_hash().short()
        );
        Ok(())
    }
}
