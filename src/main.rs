//! Headless runner for assembled programs.
//!
//! Loads a program, plays an input file (or a number of frames with every
//! button released), and prints the variable store and the state hash.
//!
//! # Usage
//! ```text
//! rawvm <program> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program`: assembly source (`.asm`) or a program file from `assembler`
//!
//! # Options
//! - `--part <id>`: Part to start on (defaults to the first game part)
//! - `--frames <n>`: Frames to run when no input file is given
//! - `--inputs <file>`: One input token per line, e.g. `U..RF`
//! - `--load <file>`: State file to restore before running
//! - `--save <file>`: Write a state file after the last frame
//! - `--limit <n>`: Instructions a thread may run without yielding
//! - `--pacing`: Honor the display pacing hint
//! - `--no-render`: Skip display updates
//! - `--profile`: Print instruction counts per category
//! - `--verbose`: Enable debug logging

use rawvm::core::engine::Engine;
use rawvm::core::headless::HeadlessHost;
use rawvm::savestate::file::StateFile;
use rawvm::utils::log::set_verbose;
use rawvm::virtual_machine::assembler::assemble_file;
use rawvm::virtual_machine::errors::VMError;
use rawvm::virtual_machine::input::PlayerInput;
use rawvm::virtual_machine::program::Program;
use rawvm::virtual_machine::vm::{ExecProfile, GAME_PART_FIRST, NUM_VARIABLES, VmOptions};
use rawvm::{error, info};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

const DEFAULT_FRAMES: usize = 1;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let program_path = &args[1];
    let mut part = GAME_PART_FIRST;
    let mut frames: Option<usize> = None;
    let mut inputs_path: Option<String> = None;
    let mut load_path: Option<String> = None;
    let mut save_path: Option<String> = None;
    let mut options = VmOptions::default();
    let mut show_profile = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--part" | "--frames" | "--inputs" | "--load" | "--save" | "--limit") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                let value = &args[i];
                match k {
                    "--part" => {
                        part = parse_number(value).unwrap_or_else(|| {
                            error!("Invalid part id: {}", value);
                            process::exit(1);
                        })
                    }
                    "--frames" => {
                        frames = Some(value.parse().unwrap_or_else(|_| {
                            error!("Invalid frame count: {}", value);
                            process::exit(1);
                        }))
                    }
                    "--limit" => {
                        options.instruction_limit = value.parse().unwrap_or_else(|_| {
                            error!("Invalid instruction limit: {}", value);
                            process::exit(1);
                        })
                    }
                    "--inputs" => inputs_path = Some(value.clone()),
                    "--load" => load_path = Some(value.clone()),
                    _ => save_path = Some(value.clone()),
                }
                i += 1;
            }
            "--pacing" => {
                options.pacing = true;
                i += 1;
            }
            "--no-render" => {
                options.render = false;
                i += 1;
            }
            "--profile" => {
                show_profile = true;
                i += 1;
            }
            "--verbose" | "-v" => {
                set_verbose(true);
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let program = load_program(program_path).unwrap_or_else(|e| {
        error!("Failed to load {}: {}", program_path, e);
        process::exit(1);
    });

    let mut engine = Engine::new(HeadlessHost::new(program), options, part).unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1);
    });

    if let Some(path) = &load_path {
        let file = fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| StateFile::from_bytes(&bytes).map_err(|e| e.to_string()))
            .unwrap_or_else(|e| {
                error!("Failed to read state file {}: {}", path, e);
                process::exit(1);
            });
        if let Err(e) = engine.load_state_file(&file) {
            error!("Failed to load state file {}: {}", path, e);
            process::exit(1);
        }
    }

    let mut profile = ExecProfile::new();
    let played = match &inputs_path {
        Some(path) => play_inputs(&mut engine, path, &mut profile),
        None => run_released(&mut engine, frames.unwrap_or(DEFAULT_FRAMES), &mut profile),
    };
    let played = played.unwrap_or_else(|(frame, e)| {
        error!("Frame {}: {}", frame, e);
        process::exit(1);
    });

    if let Some(path) = &save_path {
        let file = engine.save_state_file().unwrap_or_else(|e| {
            error!("Failed to capture state: {}", e);
            process::exit(1);
        });
        if let Err(e) = fs::write(path, file.to_bytes()) {
            error!("Failed to write state file {}: {}", path, e);
            process::exit(1);
        }
        info!("Saved state to {} ({} bytes)", path, file.payload.len());
    }

    let stats = engine.host().stats();
    info!(
        "Ran {} frame(s): {} polygons, {} display updates",
        played, stats.polygons, stats.display_updates
    );

    if show_profile {
        print_profile(&profile);
    }
    print_variables(engine.vm().variables().as_slice());
    println!("hash: {}", engine.state_hash());
}

/// Assembles `.asm` sources; anything else is read as a program file.
fn load_program(path: &str) -> Result<Program, VMError> {
    let is_source = Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("asm"));
    if is_source {
        return assemble_file(path);
    }
    let bytes = fs::read(path).map_err(|e| VMError::IoError {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    Program::from_bytes(&bytes)
}

/// Advances one frame per token. Blank lines and `#` comments are skipped.
fn play_inputs(
    engine: &mut Engine<HeadlessHost>,
    path: &str,
    profile: &mut ExecProfile,
) -> Result<usize, (usize, VMError)> {
    let source = fs::read_to_string(path).map_err(|e| {
        (
            0,
            VMError::IoError {
                path: path.to_string(),
                message: e.to_string(),
            },
        )
    })?;

    let mut frame = 0;
    for line in source.lines() {
        let token = line.split('#').next().unwrap_or("").trim();
        if token.is_empty() {
            continue;
        }
        engine.advance_state(token).map_err(|e| (frame, e))?;
        profile.merge(engine.vm().profile());
        frame += 1;
    }
    Ok(frame)
}

fn run_released(
    engine: &mut Engine<HeadlessHost>,
    frames: usize,
    profile: &mut ExecProfile,
) -> Result<usize, (usize, VMError)> {
    let input = PlayerInput::released();
    for frame in 0..frames {
        engine.advance(&input).map_err(|e| (frame, e))?;
        profile.merge(engine.vm().profile());
    }
    Ok(frames)
}

/// Prints the variable store as a 16x16 table of signed values.
fn print_variables(variables: &[i16]) {
    print!("    ");
    for col in 0..16 {
        print!(" {:>6X}", col);
    }
    println!();
    for row in 0..NUM_VARIABLES / 16 {
        print!("{:02X}: ", row * 16);
        for value in &variables[row * 16..row * 16 + 16] {
            print!(" {:>6}", value);
        }
        println!();
    }
}

/// Prints instruction counts per category with their share of the total.
fn print_profile(profile: &ExecProfile) {
    let total_u = profile.total();
    let total = total_u as f64;

    let cat_w = 2 + profile
        .iter()
        .map(|(c, _)| c.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max("total".chars().count());

    let amt_w = profile
        .iter()
        .map(|(_, a)| format_with_commas(a).chars().count())
        .max()
        .unwrap_or(0)
        .max(format_with_commas(total_u).chars().count());

    let dash_w = cat_w + 1 + amt_w + 2 + "( 100.0%)".len();

    println!("Instruction Profile ({} slices):", profile.slices());
    println!("{}", "-".repeat(dash_w));

    for (category, amount) in profile.iter() {
        if amount == 0 {
            continue;
        }
        let percent = if total > 0.0 {
            (amount as f64 / total) * 100.0
        } else {
            0.0
        };
        println!(
            "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
            category.as_str(),
            format_with_commas(amount),
            percent,
        );
    }

    println!("{}", "-".repeat(dash_w));
    println!(
        "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
        "total",
        format_with_commas(total_u),
        100.0,
    );
}

fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// Decimal or `0x` hex.
fn parse_number(value: &str) -> Option<u16> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

const USAGE: &str = "\
Headless VM runner

USAGE:
    {program} <program> [OPTIONS]

ARGS:
    <program>          Assembly source (.asm) or assembled program file

OPTIONS:
    --part <id>        Part to start on (default 0x3E80)
    --frames <n>       Frames to run with no buttons held (default 1)
    --inputs <file>    Input tokens to play, one per line (UDLRF, '.' = released)
    --load <file>      State file to restore first
    --save <file>      State file to write after the last frame
    --limit <n>        Instructions a thread may run without yielding
    --pacing           Honor the display pacing hint
    --no-render        Skip display updates
    --profile          Print instruction counts per category
    -v, --verbose      Enable debug logging
    -h, --help         Print this help message

EXAMPLES:
    {program} intro.asm --frames 100
    {program} game.bin --inputs run.txt --save run.state
    {program} game.bin --load run.state --inputs tail.txt
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
