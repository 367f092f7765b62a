pub mod config;
pub mod io;
pub mod ir;
mod lowering;

pub use {
    config::{Config, PointerPolicy, DEFAULT_TAPE_LEN},
    io::{IoHandler, StreamIo},
    lowering::LoweringError,
};

use frontend::{MatchTable, Program, ValidatedProgram};

impl ir::Module {
    /// Generates the program's function and wraps it with the I/O declarations.
    pub fn build(
        program: &Program,
        matches: &MatchTable,
        config: &Config,
    ) -> Result<Self, LoweringError> {
        let function = lowering::lower(program, matches, Self::ENTRY_POINT)?;
        tracing::debug!(
            blocks = function.blocks.len(),
            tape_len = config.tape_len.get(),
            pointer_policy = %config.pointer_policy,
            "generated function"
        );
        Ok(ir::Module {
            name: "bf".to_string(),
            function,
            externs: ir::Extern::ALL.to_vec(),
            config: *config,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl TryFrom<&ValidatedProgram> for ir::Module {
    type Error = LoweringError;

    fn try_from(validated: &ValidatedProgram) -> Result<Self, Self::Error> {
        ir::Module::build(&validated.program, &validated.matches, &Config::default())
    }
}
