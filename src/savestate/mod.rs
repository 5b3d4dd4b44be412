//! Versioned save states.
//!
//! A save state is produced by walking an ordered list of [`Entry`]
//! descriptors with a [`Serializer`]. Each entry names a field (scalar, fixed
//! array, or region-relative position), the width it is stored with, and the
//! range of format versions it belongs to. Entries outside the active version
//! are skipped in both directions, so older states load into newer code and
//! vice versa.
//!
//! # Modules
//!
//! - [`entry`]: typed field descriptors
//! - [`serializer`]: the save/load/count walker
//! - [`file`]: on-disk container with magic and version

pub mod entry;
pub mod file;
pub mod serializer;

pub use entry::{ElementSize, Entry, VersionRange};
pub use serializer::{Mode, Serializer};

use rawvm_derive::Error;

/// Format version written by this build.
pub const CURRENT_STATE_VERSION: u16 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// The buffer cannot hold the entries being walked. Checked before any
    /// byte is copied.
    #[error("state buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },
    /// A load consumed a different number of bytes than the buffer holds.
    #[error("state size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("unsupported state version {version} (this build writes {current})")]
    UnsupportedVersion { version: u16, current: u16 },
    #[error("position {position} lies before the region base {base}")]
    PositionBeforeBase { position: usize, base: usize },
    /// The offset from the base does not fit the 4 bytes a state stores.
    #[error("position offset {offset} does not fit in 32 bits")]
    PositionOutOfRange { offset: usize },
    #[error("corrupt state file: {reason}")]
    Corrupt { reason: String },
}
