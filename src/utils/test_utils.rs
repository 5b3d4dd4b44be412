//! Test utilities shared by the engine-level tests.

#[cfg(test)]
pub mod utils {
    use crate::virtual_machine::assembler::assemble_source;
    use crate::virtual_machine::host::tests::RecordingHost;

    /// Assembles `source` and serves each of its parts from a recording host.
    pub fn recording_host(source: &str) -> RecordingHost {
        let program = assemble_source(source).expect("assembly failed");
        let mut host = RecordingHost::default();
        for part in program.parts {
            host.add_part(part.id, part.bytecode);
        }
        host
    }
}
