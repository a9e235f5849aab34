pub mod codegen;
pub mod jit;
pub mod lexer;
pub mod parser;
pub mod terminal;

use std::{process::ExitCode, time::Instant};

use clap::Parser;
use colored::Colorize;

use crate::{
    codegen::codegen::Codegen, jit::Jit, lexer::lexer::Lexer, terminal::NoncanonicalMode,
};

/// Brainf**k compiler JIT'ing through LLVM
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The file to compile and run
    #[arg()]
    file: String,

    /// Print the parsed program and exit instead of running it
    #[arg(short, long)]
    dump_ast: bool,

    /// How many cells the tape has, the program starts in the middle of it
    #[arg(short, long, default_value_t = 1_000_000)]
    tape_size: usize,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let text = match std::fs::read_to_string(&args.file) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("{} {}: {}", "Failed to read".red(), args.file, err);
            return ExitCode::FAILURE;
        }
    };

    println!("Compiling {}", args.file);

    let now = Instant::now();
    let tokens: Vec<_> = Lexer::new(&text).collect();
    let program = match parser::parser::Parser::new(&tokens).parse_program() {
        Some(program) => program,
        // all the parser knows is that some `[` never found its `]`
        None => {
            eprintln!("{}", "Malformed program".red());
            return ExitCode::FAILURE;
        }
    };
    println!("{} {:.2?}", "Finished parsing in".green(), now.elapsed());

    if args.dump_ast {
        println!("{:#?}", program);
        return ExitCode::SUCCESS;
    }

    let context = inkwell::context::Context::create();

    let now = Instant::now();
    let module = Codegen::compile(&context, &program);
    println!("{} {:.2?}", "Finished codegen in".green(), now.elapsed());

    let jit = match Jit::new(&module) {
        Ok(jit) => jit,
        Err(err) => {
            eprintln!("{} {}", "Failed to set up the JIT:".red(), err);
            return ExitCode::FAILURE;
        }
    };

    // start in the middle so there is headroom on both sides
    let mut tape = vec![0u8; args.tape_size];
    let origin = tape.len() / 2;

    // raw mode only matters when somebody is actually typing at us,
    // piped input works as-is
    let _raw_mode = NoncanonicalMode::new().ok();

    println!("{}", "Running".blue());
    let now = Instant::now();
    if let Err(err) = jit.run(&mut tape, origin) {
        eprintln!("{} {}", "Failed to run:".red(), err);
        return ExitCode::FAILURE;
    }
    println!("{} {:.2?}", "Finished running in".green(), now.elapsed());

    ExitCode::SUCCESS
}
