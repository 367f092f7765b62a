use {
    crate::{codegen, BackendConfig, BackendError},
    cranelift_codegen::isa::OwnedTargetIsa,
    cranelift_jit::{JITBuilder, JITModule},
    middle::{
        ir::{self, ExitStatus, Extern},
        IoHandler,
    },
    std::{ffi::c_void, io},
};

/// What the generated code receives as `env`.
struct Env<'io> {
    io: &'io mut dyn IoHandler,
    error: Option<io::Error>,
}

extern "C" fn write_byte(env: *mut c_void, byte: u8) {
    // SAFETY: the only caller is code generated by `codegen::define`, which
    // passes back the `Env` pointer handed to it by `JitEngine::execute`.
    let env = unsafe { &mut *env.cast::<Env>() };
    if env.error.is_some() {
        return;
    }
    if let Err(error) = env.io.write_byte(byte) {
        env.error = Some(error);
    }
}

extern "C" fn read_byte(env: *mut c_void) -> u8 {
    // SAFETY: see `write_byte`.
    let env = unsafe { &mut *env.cast::<Env>() };
    if env.error.is_some() {
        return 0;
    }
    match env.io.read_byte() {
        Ok(byte) => byte,
        Err(error) => {
            env.error = Some(error);
            0
        }
    }
}

type EntryPoint = extern "C" fn(*mut c_void) -> i32;

/// Compiles modules to host machine code and runs them in-process.
///
/// The engine owns the target ISA. Every call to [`JitEngine::execute`] gets
/// its own code memory, released before the call returns.
pub struct JitEngine {
    isa: OwnedTargetIsa,
}

impl JitEngine {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let isa = codegen::host_isa(config, false)?;
        tracing::debug!(triple = %isa.triple(), "initialized JIT engine");
        Ok(JitEngine { isa })
    }

    /// Runs `module` to completion with its I/O routed to `io`.
    ///
    /// Once `io` fails, later writes are dropped and reads return 0 until the
    /// program ends; the first failure is then returned as
    /// [`BackendError::Io`].
    pub fn execute(
        &self,
        module: &ir::Module,
        io: &mut dyn IoHandler,
    ) -> Result<ExitStatus, BackendError> {
        let mut builder =
            JITBuilder::with_isa(self.isa.clone(), cranelift_module::default_libcall_names());
        builder.symbol(Extern::WriteByte.symbol(), write_byte as *const u8);
        builder.symbol(Extern::ReadByte.symbol(), read_byte as *const u8);
        let mut jit_module = JITModule::new(builder);

        let mut env = Env { io, error: None };
        let result = run(&mut jit_module, module, &mut env);
        // SAFETY: `run` has returned, so no pointer into the code memory is
        // still in use.
        unsafe { jit_module.free_memory() };

        let code = result?;
        if let Some(error) = env.error {
            return Err(BackendError::Io(error));
        }
        env.io.flush()?;
        let status = ExitStatus::from_code(code).ok_or(BackendError::UnknownStatus { code })?;
        tracing::debug!(%status, "program finished");
        Ok(status)
    }
}

fn run(
    jit_module: &mut JITModule,
    module: &ir::Module,
    env: &mut Env,
) -> Result<i32, BackendError> {
    let main_id = codegen::define(jit_module, module)?;
    jit_module
        .finalize_definitions()
        .map_err(BackendError::module)?;
    let code = jit_module.get_finalized_function(main_id);
    // SAFETY: `codegen::define` declares the function as `i32 (ptr)` in the
    // host calling convention.
    let entry = unsafe { std::mem::transmute::<*const u8, EntryPoint>(code) };
    Ok(entry((env as *mut Env).cast::<c_void>()))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        frontend::ValidatedProgram,
        middle::{Config, PointerPolicy, StreamIo},
        std::num::NonZeroUsize,
    };

    fn build(src: &str, config: Config) -> ir::Module {
        let validated = ValidatedProgram::try_from(src).unwrap();
        ir::Module::build(&validated.program, &validated.matches, &config).unwrap()
    }

    fn run_jit(src: &str, input: &[u8], config: Config) -> (ExitStatus, Vec<u8>) {
        let engine = JitEngine::new(&BackendConfig::default()).unwrap();
        let module = build(src, config);
        let mut output = Vec::new();
        let status = engine
            .execute(&module, &mut StreamIo::new(input, &mut output))
            .unwrap();
        (status, output)
    }

    fn run_default(src: &str, input: &[u8]) -> Vec<u8> {
        let (status, output) = run_jit(src, input, Config::default());
        assert_eq!(status, ExitStatus::Success);
        output
    }

    #[test]
    fn increment_then_print() {
        assert_eq!(run_default("+.", b""), [1]);
    }

    #[test]
    fn echo() {
        assert_eq!(run_default(",.", &[65]), b"A");
    }

    #[test]
    fn clear_loop_iterates_once_per_unit() {
        for start in [1u8, 7, 255] {
            let output = run_default(",[-.]", &[start]);
            assert_eq!(output.len(), usize::from(start));
            assert_eq!(output.last(), Some(&0));
        }
    }

    #[test]
    fn nested_loops_multiply() {
        assert_eq!(run_default("++[>++[>+<-]<-]>>.", b""), [4]);
    }

    #[test]
    fn cells_wrap() {
        assert_eq!(run_default("-.+.", b""), [255, 0]);
    }

    #[test]
    fn empty_program_succeeds_silently() {
        assert!(run_default("", b"").is_empty());
        assert!(run_default("[]", b"").is_empty());
    }

    #[test]
    fn pointer_wraps_to_the_last_cell() {
        let config = Config {
            tape_len: NonZeroUsize::new(3).unwrap(),
            pointer_policy: PointerPolicy::Wrap,
        };
        let (status, output) = run_jit("<+++>+<.>.", b"", config);
        assert_eq!(status, ExitStatus::Success);
        assert_eq!(output, [3, 1]);
    }

    #[test]
    fn trap_policy_returns_out_of_bounds() {
        let config = Config {
            tape_len: NonZeroUsize::new(2).unwrap(),
            pointer_policy: PointerPolicy::Trap,
        };
        let (status, output) = run_jit("+.<.", b"", config);
        assert_eq!(status, ExitStatus::PointerOutOfBounds);
        assert_eq!(output, [1]);

        let (status, _) = run_jit(">>", b"", config);
        assert_eq!(status, ExitStatus::PointerOutOfBounds);
    }

    #[test]
    fn one_engine_runs_many_modules() {
        let engine = JitEngine::new(&BackendConfig::default()).unwrap();
        for n in 1..=3u8 {
            let module = build(&("+".repeat(usize::from(n)) + "."), Config::default());
            let mut output = Vec::new();
            engine
                .execute(&module, &mut StreamIo::new(&b""[..], &mut output))
                .unwrap();
            assert_eq!(output, [n]);
        }
    }

    #[test]
    fn oversized_tape_reports_allocation_failure() {
        let config = Config {
            tape_len: NonZeroUsize::new(1 << 62).unwrap(),
            pointer_policy: PointerPolicy::Wrap,
        };
        let (status, output) = run_jit("+.", b"", config);
        assert_eq!(status, ExitStatus::TapeAllocationFailed);
        assert!(output.is_empty());
    }

    #[test]
    fn buffered_output_is_flushed_when_the_run_ends() {
        let engine = JitEngine::new(&BackendConfig::default()).unwrap();
        let module = build("+.+.", Config::default());
        let mut writer = io::BufWriter::new(Vec::new());
        engine
            .execute(&module, &mut StreamIo::new(&b""[..], &mut writer))
            .unwrap();
        assert!(writer.buffer().is_empty());
        assert_eq!(writer.get_ref(), &[1, 2]);
    }

    struct BrokenOutput;

    impl IoHandler for BrokenOutput {
        fn write_byte(&mut self, _byte: u8) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn read_byte(&mut self) -> io::Result<u8> {
            Ok(0)
        }
    }

    #[test]
    fn handler_errors_are_reported_after_the_run() {
        let engine = JitEngine::new(&BackendConfig::default()).unwrap();
        let module = build("+.+.", Config::default());
        let result = engine.execute(&module, &mut BrokenOutput);
        assert!(matches!(
            result,
            Err(BackendError::Io(error)) if error.kind() == io::ErrorKind::BrokenPipe
        ));
    }
}
