//! Bytecode assembler CLI.
//!
//! Reads assembly text from standard input and writes the assembled binary
//! function image to standard output in one piece. Lines starting with `//`
//! are comments and are stripped before assembly.
//!
//! # Usage
//! ```text
//! basm < program.asm > program.bin
//! ```
//!
//! On failure the cause is reported on stderr and the process exits with a
//! non-zero status; no output bytes are written.

use basm::assembler::encoder::assemble_source;
use basm::{error, info, warn};
use std::env;
use std::io::{self, Read, Write};
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() > 1 {
        if args[1] == "--help" || args[1] == "-h" {
            print_usage(&args[0]);
            process::exit(0);
        }
        error!("unexpected argument: {}", args[1]);
        print_usage(&args[0]);
        process::exit(1);
    }

    let mut source = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut source) {
        error!("failed to read stdin: {}", e);
        process::exit(1);
    }

    let cleaned = strip_comments(&source);
    if cleaned.trim().is_empty() {
        warn!("no instructions on stdin; emitting an empty function image");
    }

    let program = match assemble_source(&cleaned) {
        Ok(program) => program,
        Err(e) => {
            error!("assembly failed: {}", e);
            process::exit(1);
        }
    };

    let bytes = program.to_bytes();
    let mut stdout = io::stdout().lock();
    if let Err(e) = stdout.write_all(&bytes).and_then(|_| stdout.flush()) {
        error!("failed to write output: {}", e);
        process::exit(1);
    }

    info!(
        "assembled {} instruction(s) into {} bytes",
        program.root.words.len(),
        bytes.len()
    );
}

/// Drops comment lines (those whose trimmed form starts with `//`).
fn strip_comments(source: &str) -> String {
    source
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

const USAGE: &str = "\
Bytecode Assembler

USAGE:
    {program} < input.asm > output.bin

Reads assembly text on stdin, writes the binary function image to stdout.
Comment lines start with //.

OPTIONS:
    -h, --help    Print this help message
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
