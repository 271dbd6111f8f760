use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap_stdin::FileOrStdin;

/// Compile a module to 32-bit x86 assembly.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Source file, or `-` for stdin.
    input: FileOrStdin,

    /// Output file; assembly goes to stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let source = match args.input.contents() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let asm = match splc::compile(&source) {
        Ok(asm) => asm,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match args.output {
        Some(path) => {
            if let Err(e) = fs::write(&path, asm) {
                eprintln!("{}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        }
        None => print!("{}", asm),
    }
    ExitCode::SUCCESS
}
