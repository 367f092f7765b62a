use {
    crate::{config::Config, io::IoHandler},
    derive_more::Display,
    std::fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("bb{_0}")]
pub struct BlockId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Direction {
    #[display("right")]
    Right,
    #[display("left")]
    Left,
}

/// The externally linked I/O primitives a module may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Extern {
    /// `bf_write_byte(u8)`
    #[display("bf_write_byte")]
    WriteByte,
    /// `bf_read_byte() -> u8`
    #[display("bf_read_byte")]
    ReadByte,
}

impl Extern {
    pub const ALL: [Extern; 2] = [Extern::WriteByte, Extern::ReadByte];

    pub fn symbol(self) -> &'static str {
        match self {
            Extern::WriteByte => "bf_write_byte",
            Extern::ReadByte => "bf_read_byte",
        }
    }

    pub fn takes_byte(self) -> bool {
        matches!(self, Extern::WriteByte)
    }

    pub fn returns_byte(self) -> bool {
        matches!(self, Extern::ReadByte)
    }
}

/// A straight-line operation. Everything but `AllocTape` and `Shift` works
/// through a single 8-bit accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Operation {
    /// Zero-initialized tape, pointer at cell 0.
    #[display("alloc_tape")]
    AllocTape,
    #[display("shift {_0}")]
    Shift(Direction),
    #[display("load")]
    Load,
    #[display("add {_0}")]
    Add(u8),
    #[display("sub {_0}")]
    Sub(u8),
    #[display("store")]
    Store,
    /// Writes the accumulator, or reads into it.
    #[display("call {_0}")]
    Call(Extern),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Jump(BlockId),
    /// Tests the accumulator.
    Branch { nonzero: BlockId, zero: BlockId },
    Return,
}

impl Terminator {
    pub fn successors(&self) -> impl Iterator<Item = BlockId> {
        let (first, second) = match *self {
            Terminator::Jump(target) => (Some(target), None),
            Terminator::Branch { nonzero, zero } => (Some(nonzero), Some(zero)),
            Terminator::Return => (None, None),
        };
        first.into_iter().chain(second)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub name: String,
    pub operations: Vec<Operation>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    /// `blocks[0]` is the entry block.
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub const ENTRY: BlockId = BlockId(0);

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.0)
    }

    fn block_name(&self, id: BlockId) -> String {
        self.block(id)
            .map_or_else(|| id.to_string(), |block| block.name.clone())
    }
}

/// The translation unit: one function plus the I/O primitives it calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub function: Function,
    pub externs: Vec<Extern>,
    pub config: Config,
}

impl Module {
    pub const ENTRY_POINT: &'static str = "bf_main";
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "define i32 @{}() {{", self.name)?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.name)?;
            for operation in &block.operations {
                writeln!(f, "    {operation}")?;
            }
            match block.terminator {
                Terminator::Jump(target) => {
                    writeln!(f, "    jump {}", self.block_name(target))?;
                }
                Terminator::Branch { nonzero, zero } => writeln!(
                    f,
                    "    branch {}, {}",
                    self.block_name(nonzero),
                    self.block_name(zero)
                )?,
                Terminator::Return => writeln!(f, "    return")?,
            }
        }
        write!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        writeln!(
            f,
            "; tape_len = {}, pointer_policy = {}",
            self.config.tape_len, self.config.pointer_policy
        )?;
        for callee in &self.externs {
            let param = if callee.takes_byte() { "u8" } else { "" };
            let ret = if callee.returns_byte() { "u8" } else { "void" };
            writeln!(f, "declare {ret} @{callee}({param})")?;
        }
        writeln!(f)?;
        writeln!(f, "{}", self.function)
    }
}

/// Value the compiled function returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum ExitStatus {
    #[default]
    #[display("success")]
    Success,
    #[display("pointer moved off the tape")]
    PointerOutOfBounds,
    #[display("tape allocation failed")]
    TapeAllocationFailed,
}

impl ExitStatus {
    pub const fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::PointerOutOfBounds => 1,
            ExitStatus::TapeAllocationFailed => 2,
        }
    }

    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ExitStatus::Success),
            1 => Some(ExitStatus::PointerOutOfBounds),
            2 => Some(ExitStatus::TapeAllocationFailed),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed module: {detail}")]
    Malformed { detail: String },
}

pub trait Execute {
    fn execute(&self, io: &mut dyn IoHandler) -> Result<MemoryState, ExecuteError>;
}

impl Execute for Module {
    fn execute(&self, io: &mut dyn IoHandler) -> Result<MemoryState, ExecuteError> {
        let state = self.interpret(io)?;
        io.flush()?;
        Ok(state)
    }
}

impl Module {
    fn interpret(&self, io: &mut dyn IoHandler) -> Result<MemoryState, ExecuteError> {
        let mut state = MemoryState::default();
        let mut accumulator = 0u8;
        let mut current = Function::ENTRY;
        loop {
            let block = self
                .function
                .block(current)
                .ok_or_else(|| malformed(format!("no block {current}")))?;
            for operation in &block.operations {
                match *operation {
                    Operation::AllocTape => {
                        let len = self.config.tape_len.get();
                        let mut tape = Vec::new();
                        if tape.try_reserve_exact(len).is_err() {
                            state.status = ExitStatus::TapeAllocationFailed;
                            return Ok(state);
                        }
                        tape.resize(len, 0);
                        state.tape = tape;
                        state.pointer = 0;
                    }
                    Operation::Shift(direction) => {
                        let Some(pointer) = self.config.step(state.pointer, direction) else {
                            state.status = ExitStatus::PointerOutOfBounds;
                            return Ok(state);
                        };
                        state.pointer = pointer;
                    }
                    Operation::Load => accumulator = *state.cell_mut()?,
                    Operation::Add(amount) => accumulator = accumulator.wrapping_add(amount),
                    Operation::Sub(amount) => accumulator = accumulator.wrapping_sub(amount),
                    Operation::Store => *state.cell_mut()? = accumulator,
                    Operation::Call(Extern::WriteByte) => io.write_byte(accumulator)?,
                    Operation::Call(Extern::ReadByte) => accumulator = io.read_byte()?,
                }
            }
            current = match block.terminator {
                Terminator::Jump(target) => target,
                Terminator::Branch { nonzero, zero } => {
                    if accumulator != 0 {
                        nonzero
                    } else {
                        zero
                    }
                }
                Terminator::Return => return Ok(state),
            };
        }
    }
}

fn malformed(detail: String) -> ExecuteError {
    ExecuteError::Malformed { detail }
}

/// Tape contents after a run of the reference interpreter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    pub tape: Vec<u8>,
    pub pointer: usize,
    pub status: ExitStatus,
}

impl MemoryState {
    pub fn cell(&self, index: usize) -> u8 {
        self.tape.get(index).copied().unwrap_or(0)
    }

    fn cell_mut(&mut self) -> Result<&mut u8, ExecuteError> {
        let pointer = self.pointer;
        self.tape
            .get_mut(pointer)
            .ok_or_else(|| malformed(format!("cell {pointer} accessed before the tape exists")))
    }
}

impl fmt::Display for MemoryState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "pointer: {}", self.pointer)?;
        writeln!(f, "status: {}", self.status)?;
        // trailing zero cells past the pointer are not interesting
        let used = self
            .tape
            .iter()
            .rposition(|&cell| cell != 0)
            .map_or(0, |last| last + 1)
            .max(self.pointer + 1)
            .min(self.tape.len());
        for (row, cells) in self.tape[..used].chunks(16).enumerate() {
            write!(f, "{:>6}:", row * 16)?;
            for cell in cells {
                write!(f, " {cell:3}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
