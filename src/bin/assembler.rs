//! Assembly to bytecode compiler CLI.
//!
//! Reads assembly source files and compiles them to program files, or prints
//! a listing of every part.
//!
//! # Usage
//! ```text
//! assembler <input> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `input`: Assembly source file to compile, or a program file with `--listing`
//!
//! # Options
//! - `-o, --output <file>`: Output file path (defaults to `<input>.bin`)
//! - `-l, --listing`: Print a disassembly listing instead of writing a file
//!
//! # Examples
//! ```text
//! assembler intro.asm
//! assembler intro.asm -o intro.bin
//! assembler intro.asm --listing
//! assembler intro.bin --listing
//! ```

use rawvm::virtual_machine::assembler::assemble_file;
use rawvm::virtual_machine::disasm::listing;
use rawvm::virtual_machine::program::Program;
use rawvm::{error, info};
use std::env;
use std::fs;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut output_path: Option<String> = None;
    let mut print_listing = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            k @ ("--output" | "-o") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                output_path = Some(args[i].clone());
                i += 1;
            }
            "--listing" | "-l" => {
                print_listing = true;
                i += 1;
            }
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let input = Path::new(input_path);
    if !input.exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }

    let is_source = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("asm"));
    let program = if is_source {
        assemble_file(input_path).unwrap_or_else(|e| {
            error!("Assembly failed: {}", e);
            process::exit(1);
        })
    } else {
        let bytes = fs::read(input_path).unwrap_or_else(|e| {
            error!("Failed to read {}: {}", input_path, e);
            process::exit(1);
        });
        Program::from_bytes(&bytes).unwrap_or_else(|e| {
            error!("Not a program file: {}", e);
            process::exit(1);
        })
    };

    if print_listing {
        for part in &program.parts {
            let text = listing(&part.bytecode).unwrap_or_else(|e| {
                error!("Part 0x{:04X}: {}", part.id, e);
                process::exit(1);
            });
            println!("[ part 0x{:04X} ]  # {} bytes", part.id, part.bytecode.len());
            print!("{text}");
            println!();
        }
        return;
    }

    if !is_source {
        error!("Input is already a program file; use --listing to inspect it");
        process::exit(1);
    }

    let output_path = output_path.unwrap_or_else(|| {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let parent = input.parent().unwrap_or(Path::new("."));
        parent
            .join(format!("{}.bin", stem))
            .to_string_lossy()
            .into_owned()
    });

    if let Some(parent) = Path::new(&output_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        error!("Output directory does not exist: {}", parent.display());
        process::exit(1);
    }

    let bytes = program.to_bytes();
    if let Err(e) = fs::write(&output_path, &bytes) {
        error!("Failed to write output file: {}", e);
        process::exit(1);
    }

    let code_size: usize = program.parts.iter().map(|part| part.bytecode.len()).sum();
    info!(
        "Compiled {} -> {} ({} part(s), {} bytes of bytecode, {} bytes total)",
        input_path,
        output_path,
        program.parts.len(),
        code_size,
        bytes.len()
    );
}

const USAGE: &str = "\
Bytecode assembler

USAGE:
    {program} <input> [OPTIONS]

ARGS:
    <input>                 Assembly source (.asm), or a program file with --listing

OPTIONS:
    -o, --output <file>     Output file path (defaults to <input>.bin)
    -l, --listing           Print a disassembly listing of every part
    -h, --help              Print this help message

EXAMPLES:
    {program} intro.asm
    {program} intro.asm -o build/intro.bin
    {program} intro.bin --listing
";

/// Prints usage information to stderr.
fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
