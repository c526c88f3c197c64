use anyhow::Context as _;
use clap::Parser;
use inkwell::context::Context;
use koi_compiler::passes::{run_frontend, CompileOptions};
use std::path::PathBuf;

/// Koi compiler driver: parses a source file, runs the Pass 0-4 middle-end,
/// and emits the resulting LLVM IR. Linking and object-code generation are
/// external collaborators left to the host toolchain.
#[derive(Parser)]
#[command(name = "koi")]
#[command(version = "0.1.0")]
#[command(about = "Koi Programming Language Compiler", long_about = None)]
struct Cli {
    /// Input .koi source file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output path for the emitted LLVM IR (defaults to stdout)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Print the generated LLVM IR to stdout even when -o is given
    #[arg(long)]
    emit_llvm: bool,

    /// Print the parsed AST (debug form) and stop before the middle-end
    #[arg(long)]
    emit_ast: bool,

    /// Target triple forwarded to the module's data layout
    #[arg(long, value_name = "TRIPLE")]
    target: Option<String>,

    /// Keep going after Pass 2 (type validation) warnings instead of
    /// treating them as fatal
    #[arg(long)]
    keep_going: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let source = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let module_name = cli
        .input
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("koi_module");

    log::info!("parsing {}", cli.input.display());
    let mut program = koi_parser::parse(&source)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("parsing {}", cli.input.display()))?;

    if cli.emit_ast {
        println!("{:#?}", program);
        return Ok(());
    }

    let mut options = CompileOptions::default();
    options.keep_going_after_warnings = cli.keep_going;
    if let Some(triple) = cli.target {
        options.target_triple = triple;
    }

    let (tables, diagnostics) =
        run_frontend(&mut program, &options).map_err(|e| anyhow::anyhow!("{e}"))?;

    for diag in diagnostics.diagnostics() {
        eprintln!("{diag}");
    }

    let context = Context::create();
    let module = koi_compiler::passes::codegen::run(&context, module_name, &program, &tables)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("LLVM IR emission")?;

    module
        .verify()
        .map_err(|e| anyhow::anyhow!("module verification failed: {}", e.to_string()))?;

    let ir_text = module.print_to_string().to_string();

    if let Some(path) = &cli.output {
        std::fs::write(path, &ir_text).with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote LLVM IR to {}", path.display());
    }
    if cli.emit_llvm || cli.output.is_none() {
        println!("{ir_text}");
    }

    Ok(())
}
