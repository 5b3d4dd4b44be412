//! Engine-level types that tie the VM to its collaborators.
//!
//! - `Engine`: owns a VM and a host, advances frames from input tokens and
//!   saves/loads full states (VM block plus optional host block)
//! - `HeadlessHost`: collaborator set that serves a [`Program`] and records
//!   nothing but counters, used by the runner, the benchmark and replay tools
//!
//! [`Program`]: crate::virtual_machine::program::Program

pub mod engine;
pub mod headless;
