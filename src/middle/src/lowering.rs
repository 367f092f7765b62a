use {
    super::ir::{
        BasicBlock, BlockId, Direction, Extern, Function,
        Operation::{self, *},
        Terminator,
    },
    frontend::{MatchTable, Op, Program},
};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LoweringError {
    #[error("match table covers {table_len} instructions but the program has {program_len}")]
    LengthMismatch {
        program_len: usize,
        table_len: usize,
    },
    #[error("`[` at instruction {index} has no matching `]`")]
    UnpairedOpen { index: usize },
    #[error("`]` at instruction {index} does not close the innermost loop")]
    MismatchedClose { index: usize },
    #[error("block `{block}` was never terminated")]
    Unterminated { block: String },
}

struct PartialBlock {
    name: String,
    operations: Vec<Operation>,
    terminator: Option<Terminator>,
}

#[derive(Default)]
struct FunctionBuilder {
    blocks: Vec<PartialBlock>,
}

impl FunctionBuilder {
    fn create_block(&mut self, name: String) -> BlockId {
        self.blocks.push(PartialBlock {
            name,
            operations: vec![],
            terminator: None,
        });
        BlockId(self.blocks.len() - 1)
    }

    fn push(&mut self, block: BlockId, operations: impl IntoIterator<Item = Operation>) {
        self.blocks[block.0].operations.extend(operations);
    }

    fn terminate(&mut self, block: BlockId, terminator: Terminator) {
        let slot = &mut self.blocks[block.0].terminator;
        debug_assert!(slot.is_none(), "block {block} terminated twice");
        *slot = Some(terminator);
    }

    fn finish(self, name: &str) -> Result<Function, LoweringError> {
        let blocks = self
            .blocks
            .into_iter()
            .map(|block| match block.terminator {
                Some(terminator) => Ok(BasicBlock {
                    name: block.name,
                    operations: block.operations,
                    terminator,
                }),
                None => Err(LoweringError::Unterminated { block: block.name }),
            })
            .collect::<Result<_, _>>()?;
        Ok(Function {
            name: name.to_string(),
            blocks,
        })
    }
}

struct LoopFrame {
    open: usize,
    close: usize,
    cond: BlockId,
    exit: BlockId,
}

pub(super) fn lower(
    program: &Program,
    matches: &MatchTable,
    function_name: &str,
) -> Result<Function, LoweringError> {
    if matches.program_len() != program.len() {
        return Err(LoweringError::LengthMismatch {
            program_len: program.len(),
            table_len: matches.program_len(),
        });
    }

    let mut builder = FunctionBuilder::default();
    let entry = builder.create_block("entry".to_string());
    builder.push(entry, [AllocTape]);
    let mut current = builder.create_block("start".to_string());
    builder.terminate(entry, Terminator::Jump(current));

    let mut loops: Vec<LoopFrame> = vec![];
    let mut loop_count = 0;
    for (index, instruction) in program.iter().enumerate() {
        match instruction.op {
            Op::MovePointerRight => builder.push(current, [Shift(Direction::Right)]),
            Op::MovePointerLeft => builder.push(current, [Shift(Direction::Left)]),
            Op::IncrementCell => builder.push(current, [Load, Add(1), Store]),
            Op::DecrementCell => builder.push(current, [Load, Sub(1), Store]),
            Op::WriteByte => builder.push(current, [Load, Call(Extern::WriteByte)]),
            Op::ReadByte => builder.push(current, [Call(Extern::ReadByte), Store]),
            Op::LoopOpen => {
                let close = matches
                    .close_of(index)
                    .ok_or(LoweringError::UnpairedOpen { index })?;
                let cond = builder.create_block(format!("loop{loop_count}.cond"));
                let body = builder.create_block(format!("loop{loop_count}.body"));
                let exit = builder.create_block(format!("loop{loop_count}.exit"));
                loop_count += 1;

                builder.terminate(current, Terminator::Jump(cond));
                builder.push(cond, [Load]);
                builder.terminate(
                    cond,
                    Terminator::Branch {
                        nonzero: body,
                        zero: exit,
                    },
                );
                tracing::trace!(open = index, close, %cond, %body, %exit, "lowering loop");

                loops.push(LoopFrame {
                    open: index,
                    close,
                    cond,
                    exit,
                });
                current = body;
            }
            Op::LoopClose => {
                let frame = loops
                    .pop()
                    .filter(|frame| frame.close == index)
                    .ok_or(LoweringError::MismatchedClose { index })?;
                builder.terminate(current, Terminator::Jump(frame.cond));
                current = frame.exit;
            }
        }
    }
    if let Some(frame) = loops.last() {
        return Err(LoweringError::UnpairedOpen { index: frame.open });
    }
    builder.terminate(current, Terminator::Return);

    builder.finish(function_name)
}
