/// Default number of instructions a slice may run before it must yield.
pub const DEFAULT_INSTRUCTION_LIMIT: u64 = 1_000_000;

/// Runtime switches for a [`VirtualMachine`](super::VirtualMachine).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VmOptions {
    /// Instructions allowed per slice; exceeding it is fatal.
    pub instruction_limit: u64,
    /// Forward draw calls to the renderer. Off for headless re-recording.
    pub render: bool,
    /// Ask the clock to wait out `PAUSE_SLICES` between displayed frames.
    pub pacing: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
            render: true,
            pacing: false,
        }
    }
}

impl VmOptions {
    /// Options for replay tools: no rendering, no pacing.
    pub fn headless() -> Self {
        Self {
            render: false,
            ..Self::default()
        }
    }
}

/// Host keys consumed when a thread presents a frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SpecialKeys {
    /// Jump to the password screen.
    pub code: bool,
    /// Pause request. Acknowledged without blocking.
    pub pause: bool,
}
