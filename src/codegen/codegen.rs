use std::collections::HashMap;

use inkwell::{
    builder::Builder,
    context::Context,
    module::{Linkage, Module},
    types::FunctionType,
    values::{FunctionValue, PointerValue},
    AddressSpace, IntPredicate,
};

use crate::parser::{Instruction, Program};

use super::ENTRY;

/// Lowers an instruction tree into an LLVM module holding a single
/// `void bf(ptr)` routine. The argument is the initial tape cursor; the
/// routine reads and writes the tape only through it.
///
/// The cursor lives in a stack slot so every instruction loads it, works
/// on it and stores it back, leaving control flow free to branch between
/// the loop blocks without threading SSA values around.
///
/// Lowering assumes the tree came out of the parser and cannot fail;
/// builder errors only arise from malformed IR or exhausted resources and
/// are treated as fatal.
pub struct Codegen<'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,

    /// Stack slot holding the current tape cursor
    cursor: PointerValue<'ctx>,

    /// Host routines already declared in the module, keyed by symbol name
    host_routines: HashMap<&'static str, FunctionValue<'ctx>>,
}

impl<'ctx> Codegen<'ctx> {
    pub fn compile(context: &'ctx Context, program: &Program) -> Module<'ctx> {
        let module = context.create_module("bf");
        let builder = context.create_builder();

        let ptr_type = context.ptr_type(AddressSpace::default());
        let fn_type = context.void_type().fn_type(&[ptr_type.into()], false);
        let function = module.add_function(ENTRY, fn_type, None);

        let entry = context.append_basic_block(function, "entry");
        builder.position_at_end(entry);

        let cursor = builder.build_alloca(ptr_type, "cursor").unwrap();
        let arg = function.get_first_param().unwrap();
        builder.build_store(cursor, arg).unwrap();

        let mut codegen = Codegen {
            context,
            module,
            builder,
            cursor,
            host_routines: HashMap::new(),
        };

        codegen.emit_block(program);
        codegen.builder.build_return(None).unwrap();
        codegen.module
    }

    fn emit_block(&mut self, instructions: &[Instruction]) {
        for instruction in instructions {
            match instruction {
                Instruction::Add(delta) => self.emit_add(*delta),
                Instruction::Shift(offset) => self.emit_shift(*offset),
                Instruction::Print => self.emit_print(),
                Instruction::Read => self.emit_read(),
                Instruction::Loop(body) => self.emit_loop(body),
            }
        }
    }

    /// Loads the tape cursor out of its stack slot.
    fn load_cursor(&self) -> PointerValue<'ctx> {
        let ptr_type = self.context.ptr_type(AddressSpace::default());
        self.builder
            .build_load(ptr_type, self.cursor, "ptr")
            .unwrap()
            .into_pointer_value()
    }

    /// Declares a host routine the first time it is asked for and hands
    /// back the same declaration on every later request. Keyed on the
    /// symbol name so a module never ends up with duplicate declarations
    /// no matter how many call sites want the routine.
    fn host_routine(
        &mut self,
        name: &'static str,
        fn_type: FunctionType<'ctx>,
    ) -> FunctionValue<'ctx> {
        if let Some(&function) = self.host_routines.get(name) {
            return function;
        }

        let function = self
            .module
            .add_function(name, fn_type, Some(Linkage::External));
        self.host_routines.insert(name, function);
        function
    }

    fn emit_add(&mut self, delta: u8) {
        let i8_type = self.context.i8_type();
        let ptr = self.load_cursor();
        let cell = self
            .builder
            .build_load(i8_type, ptr, "cell")
            .unwrap()
            .into_int_value();
        // i8 addition wraps, which is exactly the mod-256 cell arithmetic
        let sum = self
            .builder
            .build_int_add(cell, i8_type.const_int(delta as u64, false), "sum")
            .unwrap();
        self.builder.build_store(ptr, sum).unwrap();
    }

    fn emit_shift(&mut self, offset: isize) {
        let ptr = self.load_cursor();
        let offset = self.context.i64_type().const_int(offset as u64, true);
        // one cell per unit, signed, and no bounds checks: keeping the
        // cursor inside the tape is the caller's contract
        let shifted = unsafe {
            self.builder
                .build_gep(self.context.i8_type(), ptr, &[offset], "shifted")
                .unwrap()
        };
        self.builder.build_store(self.cursor, shifted).unwrap();
    }

    fn emit_print(&mut self) {
        let i32_type = self.context.i32_type();
        let putchar = self.host_routine("putchar", i32_type.fn_type(&[i32_type.into()], false));

        let ptr = self.load_cursor();
        let cell = self
            .builder
            .build_load(self.context.i8_type(), ptr, "cell")
            .unwrap()
            .into_int_value();
        let widened = self
            .builder
            .build_int_z_extend(cell, i32_type, "widened")
            .unwrap();
        // the host routine's return value is of no use here
        self.builder
            .build_call(putchar, &[widened.into()], "putchar_call")
            .unwrap();
    }

    fn emit_read(&mut self) {
        let i32_type = self.context.i32_type();
        let getchar = self.host_routine("getchar", i32_type.fn_type(&[], false));

        let ptr = self.load_cursor();
        let call = self.builder.build_call(getchar, &[], "getchar_call").unwrap();
        let read = call.try_as_basic_value().left().unwrap().into_int_value();
        let narrowed = self
            .builder
            .build_int_truncate(read, self.context.i8_type(), "narrowed")
            .unwrap();
        self.builder.build_store(ptr, narrowed).unwrap();
    }

    /// A loop becomes three blocks: `loop_head` tests the cell at the
    /// cursor, branching to `after_loop` once it hits zero and into
    /// `loop_body` otherwise; the body falls back into `loop_head` when
    /// it is done. Nested loops recurse through [`Self::emit_block`], so
    /// by the time the remaining siblings are lowered the builder already
    /// sits in the inner loop's `after_loop`.
    fn emit_loop(&mut self, body: &[Instruction]) {
        let i8_type = self.context.i8_type();
        let function = self
            .builder
            .get_insert_block()
            .unwrap()
            .get_parent()
            .unwrap();

        let loop_head = self.context.append_basic_block(function, "loop_head");
        self.builder.build_unconditional_branch(loop_head).unwrap();
        self.builder.position_at_end(loop_head);

        let ptr = self.load_cursor();
        let cell = self
            .builder
            .build_load(i8_type, ptr, "cell")
            .unwrap()
            .into_int_value();
        let is_zero = self
            .builder
            .build_int_compare(IntPredicate::EQ, cell, i8_type.const_zero(), "is_zero")
            .unwrap();

        let loop_body = self.context.append_basic_block(function, "loop_body");
        let after_loop = self.context.append_basic_block(function, "after_loop");
        self.builder
            .build_conditional_branch(is_zero, after_loop, loop_body)
            .unwrap();

        self.builder.position_at_end(loop_body);
        self.emit_block(body);
        self.builder.build_unconditional_branch(loop_head).unwrap();

        self.builder.position_at_end(after_loop);
    }
}

#[cfg(test)]
mod tests {
    use inkwell::context::Context;

    use crate::lexer::lexer::Lexer;
    use crate::parser::parser::Parser;

    use super::*;

    fn compile<'ctx>(context: &'ctx Context, source: &str) -> Module<'ctx> {
        let tokens: Vec<_> = Lexer::new(source).collect();
        let program = Parser::new(&tokens).parse_program().unwrap();
        Codegen::compile(context, &program)
    }

    fn count_functions_named(module: &Module, name: &str) -> usize {
        module
            .get_functions()
            .filter(|function| function.get_name().to_bytes() == name.as_bytes())
            .count()
    }

    #[test]
    fn generated_module_verifies() {
        let context = Context::create();
        let module = compile(&context, "+-><.,[+[-]>]<");
        if let Err(err) = module.verify() {
            panic!("{}", err.to_string());
        }
    }

    #[test]
    fn host_routines_are_declared_at_most_once() {
        let context = Context::create();
        let module = compile(&context, "..,,..,,");
        assert_eq!(count_functions_named(&module, "putchar"), 1);
        assert_eq!(count_functions_named(&module, "getchar"), 1);
    }

    #[test]
    fn host_routines_are_only_declared_when_used() {
        let context = Context::create();
        let module = compile(&context, "+->><<-+");
        assert_eq!(count_functions_named(&module, "putchar"), 0);
        assert_eq!(count_functions_named(&module, "getchar"), 0);
    }

    #[test]
    fn each_loop_contributes_three_blocks() {
        let context = Context::create();
        let module = compile(&context, "[[]]");
        let entry = module.get_function(ENTRY).unwrap();
        // entry itself plus head/body/after per loop
        assert_eq!(entry.count_basic_blocks(), 7);
    }

    #[test]
    fn straight_line_programs_stay_in_one_block() {
        let context = Context::create();
        let module = compile(&context, "+.-,><");
        let entry = module.get_function(ENTRY).unwrap();
        assert_eq!(entry.count_basic_blocks(), 1);
    }
}
