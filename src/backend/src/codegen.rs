use {
    crate::{BackendConfig, BackendError},
    cranelift_codegen::{
        ir::{
            condcodes::IntCC, types, AbiParam, Block, FuncRef, InstBuilder, MemFlags, Type,
            UserFuncName, Value,
        },
        isa::OwnedTargetIsa,
        settings::{self, Configurable},
    },
    cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable},
    cranelift_module::{FuncId, Linkage, Module},
    middle::{
        ir::{self, Direction, ExitStatus, Extern, Operation, Terminator},
        Config, PointerPolicy,
    },
};

/*
generated function:

    i32 bf_main(env: *mut c_void)

`env` is passed through untouched as the first argument of every call to
`bf_write_byte(env, u8)` and `bf_read_byte(env) -> u8`, so the host can find
its I/O handler. The tape comes from `calloc` and is handed to `free` on the
way out; every exit goes through one block carrying the status code.
*/

pub(crate) fn host_isa(
    config: &BackendConfig,
    pic: bool,
) -> Result<OwnedTargetIsa, BackendError> {
    let mut flag_builder = settings::builder();
    flag_builder
        .set("opt_level", config.opt_level.setting())
        .map_err(|detail| BackendError::Isa {
            detail: detail.to_string(),
        })?;
    if pic {
        flag_builder
            .set("is_pic", "true")
            .map_err(|detail| BackendError::Isa {
                detail: detail.to_string(),
            })?;
    }
    let isa_builder = cranelift_native::builder().map_err(|detail| BackendError::Isa {
        detail: format!("host ISA not supported: {detail}"),
    })?;
    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|detail| BackendError::Isa {
            detail: detail.to_string(),
        })
}

struct Callees {
    write_byte: Option<FuncRef>,
    read_byte: Option<FuncRef>,
    calloc: FuncRef,
    free: FuncRef,
}

/// Declares the I/O primitives and the allocator, then defines the program's
/// function in `module`.
pub(crate) fn define<M: Module>(
    module: &mut M,
    program: &ir::Module,
) -> Result<FuncId, BackendError> {
    let ptr_ty = module.target_config().pointer_type();

    let mut main_sig = module.make_signature();
    main_sig.params.push(AbiParam::new(ptr_ty));
    main_sig.returns.push(AbiParam::new(types::I32));
    let main_id = module
        .declare_function(&program.function.name, Linkage::Export, &main_sig)
        .map_err(BackendError::module)?;

    let mut extern_ids = vec![];
    for &callee in &program.externs {
        let mut sig = module.make_signature();
        sig.params.push(AbiParam::new(ptr_ty));
        if callee.takes_byte() {
            sig.params.push(AbiParam::new(types::I8).uext());
        }
        if callee.returns_byte() {
            sig.returns.push(AbiParam::new(types::I8).uext());
        }
        let id = module
            .declare_function(callee.symbol(), Linkage::Import, &sig)
            .map_err(BackendError::module)?;
        extern_ids.push((callee, id));
    }

    let mut calloc_sig = module.make_signature();
    calloc_sig.params.push(AbiParam::new(ptr_ty));
    calloc_sig.params.push(AbiParam::new(ptr_ty));
    calloc_sig.returns.push(AbiParam::new(ptr_ty));
    let calloc_id = module
        .declare_function("calloc", Linkage::Import, &calloc_sig)
        .map_err(BackendError::module)?;

    let mut free_sig = module.make_signature();
    free_sig.params.push(AbiParam::new(ptr_ty));
    let free_id = module
        .declare_function("free", Linkage::Import, &free_sig)
        .map_err(BackendError::module)?;

    let mut context = module.make_context();
    context.func.signature = main_sig;
    context.func.name = UserFuncName::user(0, main_id.as_u32());

    let mut callee_ref = |wanted: Extern| {
        extern_ids
            .iter()
            .find(|&&(callee, _)| callee == wanted)
            .map(|&(_, id)| module.declare_func_in_func(id, &mut context.func))
    };
    let write_byte = callee_ref(Extern::WriteByte);
    let read_byte = callee_ref(Extern::ReadByte);
    let callees = Callees {
        write_byte,
        read_byte,
        calloc: module.declare_func_in_func(calloc_id, &mut context.func),
        free: module.declare_func_in_func(free_id, &mut context.func),
    };

    let mut builder_context = FunctionBuilderContext::new();
    let builder = FunctionBuilder::new(&mut context.func, &mut builder_context);
    lower_function(builder, program, &callees, ptr_ty)?;
    tracing::trace!("{}", context.func.display());

    module
        .define_function(main_id, &mut context)
        .map_err(BackendError::module)?;
    module.clear_context(&mut context);
    Ok(main_id)
}

struct FunctionLowering<'a, 'b> {
    builder: FunctionBuilder<'a>,
    callees: &'b Callees,
    config: Config,
    ptr_ty: Type,
    blocks: Vec<Block>,
    exit: Block,
    env: Value,
    pointer: Variable,
    tape: Option<Value>,
    accumulator: Option<Value>,
}

fn lower_function(
    mut builder: FunctionBuilder,
    program: &ir::Module,
    callees: &Callees,
    ptr_ty: Type,
) -> Result<(), BackendError> {
    let blocks: Vec<Block> = program
        .function
        .blocks
        .iter()
        .map(|_| builder.create_block())
        .collect();
    let Some(&entry) = blocks.first() else {
        return Err(BackendError::malformed("function has no blocks"));
    };
    let exit = builder.create_block();
    builder.append_block_param(exit, types::I32);

    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);
    let env = builder.block_params(entry)[0];
    let pointer = Variable::from_u32(0);
    builder.declare_var(pointer, ptr_ty);

    let mut lowering = FunctionLowering {
        builder,
        callees,
        config: program.config,
        ptr_ty,
        blocks,
        exit,
        env,
        pointer,
        tape: None,
        accumulator: None,
    };
    for (index, block) in program.function.blocks.iter().enumerate() {
        lowering.lower_block(index, block)?;
    }
    lowering.finish();
    Ok(())
}

impl FunctionLowering<'_, '_> {
    fn target(&self, id: ir::BlockId) -> Result<Block, BackendError> {
        self.blocks
            .get(id.0)
            .copied()
            .ok_or_else(|| BackendError::malformed(format!("jump to missing block {id}")))
    }

    fn accumulator(&self, block: &ir::BasicBlock) -> Result<Value, BackendError> {
        self.accumulator.ok_or_else(|| {
            BackendError::malformed(format!(
                "accumulator read before it was set in `{}`",
                block.name
            ))
        })
    }

    fn tape_len(&self) -> Result<i64, BackendError> {
        i64::try_from(self.config.tape_len.get())
            .map_err(|_| BackendError::malformed("tape length does not fit the target"))
    }

    fn lower_block(&mut self, index: usize, block: &ir::BasicBlock) -> Result<(), BackendError> {
        if index > 0 {
            self.builder.switch_to_block(self.blocks[index]);
        }
        // the accumulator never lives across a block boundary
        self.accumulator = None;
        for &operation in &block.operations {
            self.lower_operation(index, block, operation)?;
        }
        match block.terminator {
            Terminator::Jump(target) => {
                let target = self.target(target)?;
                self.builder.ins().jump(target, &[]);
            }
            Terminator::Branch { nonzero, zero } => {
                let condition = self.accumulator(block)?;
                let nonzero = self.target(nonzero)?;
                let zero = self.target(zero)?;
                self.builder.ins().brif(condition, nonzero, &[], zero, &[]);
            }
            Terminator::Return => self.exit_with(ExitStatus::Success),
        }
        Ok(())
    }

    fn lower_operation(
        &mut self,
        index: usize,
        block: &ir::BasicBlock,
        operation: Operation,
    ) -> Result<(), BackendError> {
        match operation {
            Operation::AllocTape => {
                if index != 0 || self.tape.is_some() {
                    return Err(BackendError::malformed(format!(
                        "tape allocated outside the entry block in `{}`",
                        block.name
                    )));
                }
                let len = self.tape_len()?;
                let count = self.builder.ins().iconst(self.ptr_ty, len);
                let size = self.builder.ins().iconst(self.ptr_ty, 1);
                let call = self.builder.ins().call(self.callees.calloc, &[count, size]);
                let tape = self.builder.inst_results(call)[0];
                let zero = self.builder.ins().iconst(self.ptr_ty, 0);
                self.builder.def_var(self.pointer, zero);
                let failed = self.builder.ins().icmp_imm(IntCC::Equal, tape, 0);
                self.exit_if(failed, ExitStatus::TapeAllocationFailed);
                self.tape = Some(tape);
            }
            Operation::Shift(direction) => self.lower_shift(direction)?,
            Operation::Load => {
                let address = self.cell_address(block)?;
                let value = self
                    .builder
                    .ins()
                    .load(types::I8, MemFlags::trusted(), address, 0);
                self.accumulator = Some(value);
            }
            Operation::Add(amount) => {
                let value = self.accumulator(block)?;
                let sum = self.builder.ins().iadd_imm(value, i64::from(amount));
                self.accumulator = Some(sum);
            }
            Operation::Sub(amount) => {
                let value = self.accumulator(block)?;
                let difference = self.builder.ins().iadd_imm(value, -i64::from(amount));
                self.accumulator = Some(difference);
            }
            Operation::Store => {
                let value = self.accumulator(block)?;
                let address = self.cell_address(block)?;
                self.builder
                    .ins()
                    .store(MemFlags::trusted(), value, address, 0);
            }
            Operation::Call(Extern::WriteByte) => {
                let callee = self.callees.write_byte.ok_or_else(|| {
                    BackendError::malformed("call to undeclared `bf_write_byte`")
                })?;
                let value = self.accumulator(block)?;
                self.builder.ins().call(callee, &[self.env, value]);
            }
            Operation::Call(Extern::ReadByte) => {
                let callee = self.callees.read_byte.ok_or_else(|| {
                    BackendError::malformed("call to undeclared `bf_read_byte`")
                })?;
                let call = self.builder.ins().call(callee, &[self.env]);
                self.accumulator = Some(self.builder.inst_results(call)[0]);
            }
        }
        Ok(())
    }

    fn lower_shift(&mut self, direction: Direction) -> Result<(), BackendError> {
        let len = self.tape_len()?;
        let pointer = self.builder.use_var(self.pointer);
        let moved = match (direction, self.config.pointer_policy) {
            (Direction::Right, PointerPolicy::Wrap) => {
                let next = self.builder.ins().iadd_imm(pointer, 1);
                let past_end = self.builder.ins().icmp_imm(IntCC::Equal, next, len);
                let start = self.builder.ins().iconst(self.ptr_ty, 0);
                self.builder.ins().select(past_end, start, next)
            }
            (Direction::Left, PointerPolicy::Wrap) => {
                let at_start = self.builder.ins().icmp_imm(IntCC::Equal, pointer, 0);
                let previous = self.builder.ins().iadd_imm(pointer, -1);
                let end = self.builder.ins().iconst(self.ptr_ty, len - 1);
                self.builder.ins().select(at_start, end, previous)
            }
            (Direction::Right, PointerPolicy::Trap) => {
                let next = self.builder.ins().iadd_imm(pointer, 1);
                let past_end = self.builder.ins().icmp_imm(IntCC::Equal, next, len);
                self.exit_if(past_end, ExitStatus::PointerOutOfBounds);
                next
            }
            (Direction::Left, PointerPolicy::Trap) => {
                let at_start = self.builder.ins().icmp_imm(IntCC::Equal, pointer, 0);
                self.exit_if(at_start, ExitStatus::PointerOutOfBounds);
                self.builder.ins().iadd_imm(pointer, -1)
            }
        };
        self.builder.def_var(self.pointer, moved);
        Ok(())
    }

    fn cell_address(&mut self, block: &ir::BasicBlock) -> Result<Value, BackendError> {
        let tape = self.tape.ok_or_else(|| {
            BackendError::malformed(format!(
                "cell accessed before the tape exists in `{}`",
                block.name
            ))
        })?;
        let pointer = self.builder.use_var(self.pointer);
        Ok(self.builder.ins().iadd(tape, pointer))
    }

    /// Leaves the function with `status` when `condition` holds, and keeps
    /// emitting into a fresh block otherwise.
    fn exit_if(&mut self, condition: Value, status: ExitStatus) {
        let code = self.builder.ins().iconst(types::I32, i64::from(status.code()));
        let continue_block = self.builder.create_block();
        self.builder
            .ins()
            .brif(condition, self.exit, &[code], continue_block, &[]);
        self.builder.switch_to_block(continue_block);
    }

    fn exit_with(&mut self, status: ExitStatus) {
        let code = self.builder.ins().iconst(types::I32, i64::from(status.code()));
        self.builder.ins().jump(self.exit, &[code]);
    }

    fn finish(mut self) {
        self.builder.switch_to_block(self.exit);
        let status = self.builder.block_params(self.exit)[0];
        if let Some(tape) = self.tape {
            self.builder.ins().call(self.callees.free, &[tape]);
        }
        self.builder.ins().return_(&[status]);
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }
}
