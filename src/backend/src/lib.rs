mod codegen;
pub mod jit;
pub mod object;

pub use {jit::JitEngine, object::serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    fn setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendConfig {
    pub opt_level: OptLevel,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("cannot build the host ISA: {detail}")]
    Isa { detail: String },
    #[error("Cranelift module error: {detail}")]
    Module { detail: String },
    #[error("object emission failed: {detail}")]
    ObjectEmit { detail: String },
    #[error("malformed module: {detail}")]
    Malformed { detail: String },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("compiled program returned unknown status {code}")]
    UnknownStatus { code: i32 },
}

impl BackendError {
    fn module(detail: impl std::fmt::Display) -> Self {
        BackendError::Module {
            detail: detail.to_string(),
        }
    }

    fn malformed(detail: impl Into<String>) -> Self {
        BackendError::Malformed {
            detail: detail.into(),
        }
    }
}
