//! VM benchmark binary.
//!
//! Measures frame throughput for representative scripts and the cost of one
//! re-record cycle (load state, advance a frame, save state).
//! Run with: `cargo run --release --bin bench`

use std::fmt::Write;
use std::time::{Duration, Instant};

use rawvm::core::engine::Engine;
use rawvm::core::headless::HeadlessHost;
use rawvm::savestate::CURRENT_STATE_VERSION;
use rawvm::virtual_machine::assembler::assemble_source;
use rawvm::virtual_machine::vm::{GAME_PART_FIRST, NUM_THREADS, VmOptions};

// ---------------------------------------------------------------------------
// Benchmark harness
// ---------------------------------------------------------------------------

struct BenchResult {
    name: &'static str,
    iterations: u64,
    total: Duration,
    /// Instructions executed by the last run.
    instructions: u64,
}

impl BenchResult {
    fn avg(&self) -> Duration {
        self.total / self.iterations as u32
    }

    fn print(&self) {
        let avg = self.avg();
        let ns_per_op = avg.as_nanos();
        let ns_per_instr = if self.instructions > 0 {
            format!("{:>8.1}", ns_per_op as f64 / self.instructions as f64)
        } else {
            "       -".to_string()
        };
        println!(
            "  {:<30} {:>7} iters {:>10.3} us/iter {:>12} instr  {} ns/instr",
            self.name,
            self.iterations,
            ns_per_op as f64 / 1000.0,
            self.instructions,
            ns_per_instr,
        );
    }
}

/// Runs `f` for at least `min_duration`, returning aggregated results.
fn bench<F>(name: &'static str, min_duration: Duration, mut f: F) -> BenchResult
where
    F: FnMut() -> u64,
{
    // Warmup
    for _ in 0..5 {
        f();
    }

    let mut iterations = 0u64;
    let mut instructions = 0u64;
    let start = Instant::now();
    while start.elapsed() < min_duration {
        instructions = f();
        iterations += 1;
    }
    let total = start.elapsed();

    BenchResult {
        name,
        iterations,
        total,
        instructions,
    }
}

/// Assembles `source` and starts a headless engine on its first part.
fn engine(source: &str) -> Engine<HeadlessHost> {
    let program = assemble_source(source).expect("asm");
    Engine::new(HeadlessHost::new(program), VmOptions::headless(), GAME_PART_FIRST).expect("engine")
}

/// Runs one frame and returns the instructions it executed.
fn frame(engine: &mut Engine<HeadlessHost>) -> u64 {
    engine.run_frame().expect("frame");
    engine.vm().profile().total()
}

// ---------------------------------------------------------------------------
// Benchmark definitions
// ---------------------------------------------------------------------------

const TIGHT_LOOP_ASM: &str = r#"
loop:
    SET v1, 10000
inner:
    ADDI v2, 1
    DJNZ v1, inner
    PAUSE
    JMP loop
"#;

const ARITHMETIC_MIX_ASM: &str = r#"
    SET v2, 3
loop:
    SET v1, 2000
inner:
    ADD v3, v2
    SUB v4, v3
    AND v3, 0x7FFF
    OR v4, 1
    SHL v5, 3
    SHR v3, 1
    ADDI v2, 7
    DJNZ v1, inner
    PAUSE
    JMP loop
"#;

const BRANCH_HEAVY_ASM: &str = r#"
loop:
    SET v1, 5000
inner:
    JMP_IF v2 < v3, up
    ADDI v2, -1
    JMP next
up:
    ADDI v2, 1
    ADDI v3, 1
next:
    DJNZ v1, inner
    PAUSE
    JMP loop
"#;

const CALL_OVERHEAD_ASM: &str = r#"
loop:
    SET v1, 5000
inner:
    CALL noop
    DJNZ v1, inner
    PAUSE
    JMP loop
noop:
    RET
"#;

const POLYGON_ASM: &str = r#"
loop:
    SET v1, 200
draw:
    POLY 0x0010, v2, v3, v4
    POLY_BG 0x0020, 10, 20
    DJNZ v1, draw
    BLIT 0
    PAUSE
    JMP loop
"#;

/// Thread 0 starts every other thread on the same worker loop.
fn all_threads_asm() -> String {
    let mut source = String::new();
    for thread in 1..NUM_THREADS {
        let _ = writeln!(source, "    SET_VEC {thread}, worker");
    }
    source.push_str(
        r#"
main:
    PAUSE
    JMP main
worker:
    SET v1, 100
work:
    ADDI v2, 1
    DJNZ v1, work
    PAUSE
    JMP worker
"#,
    );
    source
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let min = Duration::from_secs(2);

    println!("VM Benchmarks (each runs for >= 2s)\n");
    println!(
        "  {:<30} {:>7}       {:>14} {:>12}  {:>10}",
        "benchmark", "iters", "avg time", "instr/run", "ns/instr"
    );
    println!("  {}", "-".repeat(82));

    let frame_benches: [(&'static str, String); 5] = [
        ("tight_loop(10K)", TIGHT_LOOP_ASM.to_string()),
        ("arithmetic_mix(2K)", ARITHMETIC_MIX_ASM.to_string()),
        ("branch_heavy(5K)", BRANCH_HEAVY_ASM.to_string()),
        ("call_overhead(5K)", CALL_OVERHEAD_ASM.to_string()),
        ("polygons(400)", POLYGON_ASM.to_string()),
    ];
    for (name, source) in &frame_benches {
        let mut engine = engine(source);
        let r = bench(*name, min, || frame(&mut engine));
        r.print();
    }

    // All 64 threads runnable; the first frame only schedules them.
    let threads_asm = all_threads_asm();
    let mut engine = self::engine(&threads_asm);
    frame(&mut engine);
    let r = bench("all_threads(64x100)", min, || frame(&mut engine));
    r.print();

    // Re-record cycle: restore, advance one input, save.
    let mut buffer = vec![0u8; engine.state_size(CURRENT_STATE_VERSION)];
    engine
        .serialize_state(Some(buffer.as_mut_slice()))
        .expect("save");
    let saved = buffer.clone();
    let r = bench("rerecord_cycle", min, || {
        engine.deserialize_state(&saved).expect("load");
        engine.advance_state("U..RF").expect("advance");
        engine
            .serialize_state(Some(buffer.as_mut_slice()))
            .expect("save");
        engine.vm().profile().total()
    });
    r.print();

    println!();
}
