use inkwell::{
    execution_engine::ExecutionEngine,
    module::Module,
    targets::{InitializationConfig, Target},
    OptimizationLevel,
};
use thiserror::Error;

use crate::codegen;

#[derive(Error, Debug)]
pub enum JitError {
    #[error("native target initialization failed: {0}")]
    Target(String),

    #[error("execution engine creation failed: {0}")]
    Engine(String),

    #[error("generated module has no entry routine: {0}")]
    MissingEntry(String),
}

/// Signature of the generated entry routine: one pointer into the tape,
/// no return value.
type Entry = unsafe extern "C" fn(*mut u8);

/// Compiles a generated module to native code and runs it.
///
/// The module's `putchar`/`getchar` declarations resolve against the
/// hosting process, so by default the program talks to the real stdio.
pub struct Jit<'ctx> {
    engine: ExecutionEngine<'ctx>,
}

impl<'ctx> Jit<'ctx> {
    pub fn new(module: &Module<'ctx>) -> Result<Jit<'ctx>, JitError> {
        Target::initialize_native(&InitializationConfig::default()).map_err(JitError::Target)?;

        let engine = module
            .create_jit_execution_engine(OptimizationLevel::None)
            .map_err(|err| JitError::Engine(err.to_string()))?;

        Ok(Jit { engine })
    }

    /// Runs the compiled program against `tape` with the cursor starting
    /// at `origin`. The program moves the cursor wherever it pleases;
    /// sizing the tape with enough headroom on both sides of `origin` is
    /// the caller's problem.
    pub fn run(&self, tape: &mut [u8], origin: usize) -> Result<(), JitError> {
        let entry = unsafe { self.engine.get_function::<Entry>(codegen::ENTRY) }
            .map_err(|err| JitError::MissingEntry(err.to_string()))?;

        unsafe { entry.call(tape.as_mut_ptr().add(origin)) };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use inkwell::context::Context;

    use crate::codegen::codegen::Codegen;
    use crate::lexer::lexer::Lexer;
    use crate::parser::parser::Parser;

    use super::*;

    // https://en.wikipedia.org/wiki/Brainfuck, prints "Hello World!\n"
    const HELLO_WORLD: &str =
        "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";

    static OUTPUT: Mutex<Vec<u8>> = Mutex::new(Vec::new());

    extern "C" fn capture_putchar(byte: i32) -> i32 {
        OUTPUT.lock().unwrap().push(byte as u8);
        byte
    }

    extern "C" fn feed_getchar() -> i32 {
        // deliberately wider than a cell, the low byte is an 'A'
        i32::from(b'A') + 256
    }

    /// Compiles and runs `source`, remapping the host routines so the
    /// test stays inside the process instead of touching real stdio.
    fn run(source: &str, tape: &mut [u8], origin: usize) {
        let tokens: Vec<_> = Lexer::new(source).collect();
        let program = Parser::new(&tokens).parse_program().unwrap();

        let context = Context::create();
        let module = Codegen::compile(&context, &program);
        let jit = Jit::new(&module).unwrap();

        // mappings have to be in place before the first entry lookup
        // triggers compilation
        if let Some(putchar) = module.get_function("putchar") {
            jit.engine
                .add_global_mapping(&putchar, capture_putchar as usize);
        }
        if let Some(getchar) = module.get_function("getchar") {
            jit.engine.add_global_mapping(&getchar, feed_getchar as usize);
        }

        jit.run(tape, origin).unwrap();
    }

    #[test]
    fn hello_world() {
        let mut tape = vec![0u8; 30_000];
        run(HELLO_WORLD, &mut tape, 1024);
        assert_eq!(OUTPUT.lock().unwrap().as_slice(), b"Hello World!\n");
    }

    #[test]
    fn cell_arithmetic_wraps_at_256() {
        let mut tape = vec![0u8; 64];
        run(&"+".repeat(256), &mut tape, 32);
        assert_eq!(tape[32], 0);
    }

    #[test]
    fn decrement_wraps_below_zero() {
        let mut tape = vec![0u8; 64];
        run("-", &mut tape, 32);
        assert_eq!(tape[32], 255);
    }

    #[test]
    fn loop_runs_once_per_countdown_step() {
        let mut tape = vec![0u8; 64];
        // each iteration bumps the neighbor, so it doubles as a loop counter
        run("+++[>+<-]", &mut tape, 32);
        assert_eq!(tape[32], 0);
        assert_eq!(tape[33], 3);
    }

    #[test]
    fn zero_cell_skips_the_loop_entirely() {
        let mut tape = vec![0u8; 64];
        run("[>+<]", &mut tape, 32);
        assert_eq!(tape[33], 0);
    }

    #[test]
    fn read_stores_the_low_byte() {
        let mut tape = vec![0u8; 64];
        run(",", &mut tape, 32);
        assert_eq!(tape[32], b'A');
    }
}
