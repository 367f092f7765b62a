use {
    anyhow::Context,
    backend::{BackendConfig, JitEngine},
    clap::{Parser, Subcommand, ValueEnum},
    frontend::{SourceLocation, StructureError, ValidatedProgram},
    middle::{
        ir::{self, Execute, ExitStatus},
        Config, StreamIo, DEFAULT_TAPE_LEN,
    },
    std::{
        num::NonZeroUsize,
        path::{Path, PathBuf},
        process::ExitCode,
    },
    tracing::Level,
};

#[derive(Debug, Parser)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compile a program to an object file or textual IR
    Compile {
        /// Input source file
        input_path: PathBuf,

        #[command(flatten)]
        compile_options: CompileOptions,

        #[command(flatten)]
        tape_options: TapeOptions,
    },
    /// Run a program with stdin and stdout attached
    Run {
        /// Input source file
        input_path: PathBuf,

        #[command(flatten)]
        run_options: RunOptions,

        #[command(flatten)]
        tape_options: TapeOptions,
    },
}

#[derive(Debug, Parser)]
struct TapeOptions {
    /// Number of cells on the tape
    #[arg(long, default_value_t = DEFAULT_TAPE_LEN)]
    tape_len: NonZeroUsize,

    /// What happens when the pointer moves off either end of the tape
    #[arg(long, default_value = "wrap")]
    pointer_policy: PointerPolicy,
}

#[derive(Debug, Parser)]
struct CompileOptions {
    /// Output file [defaults to the input path with an `.o` or `.ir` extension]
    #[arg(short)]
    output_path: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "obj")]
    emit: Emit,

    /// Cranelift optimization level
    #[arg(long, default_value = "speed")]
    opt_level: OptLevel,
}

#[derive(Debug, Parser)]
struct RunOptions {
    /// Execution engine
    #[arg(long, default_value = "jit")]
    engine: Engine,

    /// Print the final memory state after execution [interp engine only]
    #[arg(long)]
    print_memory: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Emit {
    Obj,
    Ir,
}

impl Emit {
    fn extension(self) -> &'static str {
        match self {
            Emit::Obj => "o",
            Emit::Ir => "ir",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Engine {
    Jit,
    Interp,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PointerPolicy {
    Wrap,
    Trap,
}

impl From<PointerPolicy> for middle::PointerPolicy {
    fn from(policy: PointerPolicy) -> Self {
        match policy {
            PointerPolicy::Wrap => middle::PointerPolicy::Wrap,
            PointerPolicy::Trap => middle::PointerPolicy::Trap,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OptLevel {
    None,
    Speed,
    SpeedAndSize,
}

impl From<OptLevel> for backend::OptLevel {
    fn from(level: OptLevel) -> Self {
        match level {
            OptLevel::None => backend::OptLevel::None,
            OptLevel::Speed => backend::OptLevel::Speed,
            OptLevel::SpeedAndSize => backend::OptLevel::SpeedAndSize,
        }
    }
}

impl From<&TapeOptions> for Config {
    fn from(options: &TapeOptions) -> Self {
        Config {
            tape_len: options.tape_len,
            pointer_policy: options.pointer_policy.into(),
        }
    }
}

pub(crate) fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::WARN })
        .init();
    match cli.command {
        Command::Compile {
            input_path,
            compile_options,
            tape_options,
        } => {
            let module = load(&input_path, &Config::from(&tape_options))?;
            compile(&input_path, &module, &compile_options)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            input_path,
            run_options,
            tape_options,
        } => {
            let module = load(&input_path, &Config::from(&tape_options))?;
            let status = execute(&module, &run_options)?;
            if status != ExitStatus::Success {
                tracing::warn!(%status, "program stopped early");
            }
            Ok(ExitCode::from(u8::try_from(status.code()).unwrap_or(u8::MAX)))
        }
    }
}

/// Reads, validates and lowers the program at `path`.
fn load(path: &Path, config: &Config) -> anyhow::Result<ir::Module> {
    let bytes =
        std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    // comments may hold arbitrary bytes; only the eight instruction characters matter
    let src = String::from_utf8_lossy(&bytes);
    let validated = ValidatedProgram::try_from(&*src)
        .map_err(|error| structure_error(path, &src, error))?;
    tracing::debug!("program: {}", validated.program);
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("bf");
    let module = ir::Module::build(&validated.program, &validated.matches, config)
        .with_context(|| format!("cannot generate code for {}", path.display()))?
        .with_name(name);
    tracing::debug!("module:\n{module}");
    Ok(module)
}

fn structure_error(path: &Path, src: &str, error: StructureError) -> anyhow::Error {
    let location = SourceLocation::locate(src, error.offset());
    anyhow::anyhow!("{}:{location}: {error}", path.display())
}

fn compile(
    input_path: &Path,
    module: &ir::Module,
    options: &CompileOptions,
) -> anyhow::Result<()> {
    let output_path = options
        .output_path
        .clone()
        .unwrap_or_else(|| input_path.with_extension(options.emit.extension()));
    let (bytes, kind) = match options.emit {
        Emit::Obj => {
            let config = BackendConfig {
                opt_level: options.opt_level.into(),
            };
            (backend::serialize(module, &config)?, "object file")
        }
        Emit::Ir => (module.to_string().into_bytes(), "IR"),
    };
    std::fs::write(&output_path, bytes)
        .with_context(|| format!("cannot write {}", output_path.display()))?;
    println!("wrote {kind} to {}", output_path.display());
    Ok(())
}

fn execute(module: &ir::Module, options: &RunOptions) -> anyhow::Result<ExitStatus> {
    let mut io = StreamIo::stdio();
    match options.engine {
        Engine::Jit => {
            if options.print_memory {
                tracing::warn!("--print-memory is only supported by the interp engine");
            }
            let engine = JitEngine::new(&BackendConfig::default())?;
            Ok(engine.execute(module, &mut io)?)
        }
        Engine::Interp => {
            let final_state = module.execute(&mut io)?;
            if options.print_memory {
                eprintln!("final memory state:\n{final_state}");
            }
            Ok(final_state.status)
        }
    }
}
