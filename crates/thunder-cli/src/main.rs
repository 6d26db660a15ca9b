use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use tracing_subscriber::filter::LevelFilter;

use thunder::ir::{CallableId, dump_function};
use thunder::{BackendOptions, Generate, LinkageUnit, OptLevel, OutputContent, Stage, Target};

/// Thunder: shader IR cross-compiler
#[derive(Parser)]
#[command(name = "thunder", version, about)]
struct Cli {
    /// Input function stream
    input: PathBuf,

    /// Target backend: glsl, cpp, spirv, jit or asm
    #[arg(short, long, default_value = "glsl")]
    target: String,

    /// Pipeline stage (vertex, fragment, compute, task, mesh, rgen, rchit, rahit, rmiss, rint)
    #[arg(short, long, default_value = "vertex", value_parser = parse_stage)]
    stage: Stage,

    /// Function to link; repeat for several entries (default: every function)
    #[arg(short, long)]
    entry: Vec<String>,

    /// Output path (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Optimization level: 0, 1, or 2
    #[arg(long, default_value = "1", value_parser = parse_opt_level)]
    opt_level: OptLevel,

    /// GLSL `#version` to generate
    #[arg(long, default_value_t = 460)]
    glsl_version: u32,

    /// Dump the linked unit's assembly to stderr before generation
    #[arg(long)]
    emit_asm: bool,

    /// Write assembly, GLSL and Graphviz dumps of every function here
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_opt_level(s: &str) -> Result<OptLevel, String> {
    match s {
        "0" => Ok(OptLevel::O0),
        "1" => Ok(OptLevel::O1),
        "2" => Ok(OptLevel::O2),
        _ => Err(format!(
            "invalid optimization level '{s}', expected 0, 1, or 2"
        )),
    }
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    Stage::from_str(s).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> miette::Result<()> {
    // 1. Read the function stream.
    let mut ctx = LinkageUnit::read(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", cli.input.display()))?;

    // 2. Optimize.
    thunder::optimize(&mut ctx, cli.opt_level)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("optimization failed")?;

    // 3. Link the requested entries.
    let entries = if cli.entry.is_empty() {
        ctx.functions().map(|f| f.id).collect::<Vec<CallableId>>()
    } else {
        cli.entry
            .iter()
            .map(|name| {
                ctx.find(name).map(|f| f.id).ok_or_else(|| {
                    let known: Vec<_> = ctx.functions().map(|f| f.name.as_str()).collect();
                    miette::miette!("no function named '{name}' (available: {})", known.join(", "))
                })
            })
            .collect::<miette::Result<_>>()?
    };
    let unit = thunder::link(&ctx, entries)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("linking failed")?;

    let opts = BackendOptions {
        stage: cli.stage,
        glsl_version: cli.glsl_version,
        opt_level: match cli.opt_level {
            OptLevel::O0 => 0,
            OptLevel::O1 => 1,
            OptLevel::O2 => 2,
        },
        ..BackendOptions::default()
    };

    // 4. Optional dumps.
    if cli.emit_asm {
        eprintln!("{}", unit.write_assembly());
    }
    if let Some(dir) = &cli.dump_dir {
        dump(&ctx, &unit, dir, &opts)?;
    }

    // 5. Backend dispatch.
    let registry = thunder::registry();
    let backend = registry.find(&cli.target).ok_or_else(|| {
        let available = registry.list_targets().join(", ");
        miette::miette!("unknown target '{}' (available: {})", cli.target, available)
    })?;

    let output = backend
        .compile(&unit, &opts)
        .map_err(|e| miette::miette!("{e}"))
        .wrap_err("backend compilation failed")?;
    log::info!(
        "{} function(s), {} aggregate(s) -> {} via {} ({output})",
        unit.functions().len(),
        unit.aggregates().len(),
        cli.target,
        backend.name()
    );

    // 6. Print diagnostics.
    for diag in &output.diagnostics {
        eprintln!("{:?}: {}", diag.level, diag.message);
    }

    // 7. Write output.
    for file in &output.files {
        match (&cli.output, &file.content) {
            (None, OutputContent::Text(text)) => print!("{text}"),
            (_, OutputContent::Native(code)) => {
                for symbol in code.symbols() {
                    println!("{symbol}");
                }
            }
            (Some(path), content) => {
                let bytes = content.to_bytes().unwrap_or_default();
                std::fs::write(path, bytes)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            }
            (None, _) => {
                return Err(miette::miette!(
                    "backend produced binary output but no --output path was specified"
                ));
            }
        }
    }

    Ok(())
}

/// Writes `<name>.asm` and `<name>.dot` for every linked function and
/// `<name>.glsl` for the unit each function roots.
fn dump(
    ctx: &thunder::ir::Context,
    unit: &LinkageUnit<'_>,
    dir: &Path,
    opts: &BackendOptions,
) -> miette::Result<()> {
    std::fs::create_dir_all(dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to create {}", dir.display()))?;
    let write = |name: String, contents: String| -> miette::Result<()> {
        let path = dir.join(name);
        std::fs::write(&path, contents)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to write {}", path.display()))
    };

    for function in unit.functions() {
        write(format!("{}.asm", function.name), dump_function(function))?;
        write(
            format!("{}.dot", function.name),
            function.buffer.graphviz(&function.name),
        )?;

        let glsl = thunder::link(ctx, [function.id])
            .map_err(thunder::BackendError::from)
            .and_then(|single| single.generate_with(Target::Glsl, opts));
        match glsl {
            Ok(output) => {
                if let Some(OutputContent::Text(text)) = output.files.first().map(|f| &f.content) {
                    write(format!("{}.glsl", function.name), text.clone())?;
                }
            }
            Err(err) => log::warn!("no GLSL dump for `{}`: {err}", function.name),
        }
    }
    log::info!("wrote dumps of {} function(s) to {}", unit.functions().len(), dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_levels() {
        assert_eq!(parse_opt_level("0"), Ok(OptLevel::O0));
        assert_eq!(parse_opt_level("2"), Ok(OptLevel::O2));
        assert!(parse_opt_level("3").unwrap_err().contains("expected 0, 1, or 2"));
    }

    #[test]
    fn stages() {
        assert_eq!(parse_stage("fragment"), Ok(Stage::Fragment));
        assert_eq!(parse_stage("comp"), Ok(Stage::Compute));
        assert!(parse_stage("geometry").is_err());
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["thunder", "unit.thunder"]);
        assert_eq!(cli.target, "glsl");
        assert_eq!(cli.stage, Stage::Vertex);
        assert_eq!(cli.opt_level, OptLevel::O1);
        assert!(cli.entry.is_empty());
    }
}
