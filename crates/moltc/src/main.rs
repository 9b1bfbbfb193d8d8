//! Molt compiler executable.
//!
//! Thin front-end over `libmolt`: argument parsing, logging setup, report
//! rendering and exit codes. The pipeline itself lives in the library.
//!
//! ```text
//! moltc transpile examples/greet.py -o out/greet
//! moltc parse examples/greet.py
//! moltc test examples/greet.py --run
//! ```
//!
//! Exit codes: 0 on success, 1 when transpilation reports diagnostics,
//! 2 on invalid arguments (clap's default).

use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};
use libmolt::error::{CodeSpanReportGenerator, CompileError, PlainReportGenerator, ReportGenerator};
use libmolt::{compile, dump_tir, load_inputs, parse_sources, CompileOptions};
use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

#[derive(Parser, Debug)]
#[command(name = "moltc", version, about = "Transpiles an annotated Python subset to idiomatic Rust")]
struct Cli {
    /// Verbose output: debug logging and rich diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transpile a file or directory into a Cargo project
    Transpile {
        /// Input file or directory
        input: PathBuf,
        /// Output directory for the generated project
        #[arg(short, long)]
        output: PathBuf,
        /// Project name; inferred from the input when omitted
        #[arg(short = 'n', long)]
        name: Option<String>,
        /// Additional stub package directories (repeatable)
        #[arg(long)]
        stubs: Vec<PathBuf>,
    },
    /// Print the typed intermediate representation of the input
    Parse {
        /// Input file or directory
        input: PathBuf,
    },
    /// Transpile, then build the result with cargo
    Test {
        /// Input file or directory
        input: PathBuf,
        /// Also execute the produced binary
        #[arg(long)]
        run: bool,
        /// Additional stub package directories (repeatable)
        #[arg(long)]
        stubs: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto);

    let code = match cli.command {
        Command::Transpile { input, output, name, stubs } => transpile(input, output, name, stubs, cli.verbose),
        Command::Parse { input } => parse(input, cli.verbose),
        Command::Test { input, run, stubs } => test(input, run, stubs, cli.verbose),
    };
    exit(code);
}

fn report(error: CompileError, verbose: bool) -> i32 {
    match error {
        CompileError::Report(diagnostics) => {
            if verbose {
                CodeSpanReportGenerator::generate(&diagnostics);
            } else {
                PlainReportGenerator::generate(&diagnostics);
            }
        }
        other => eprintln!("{other}"),
    }
    1
}

fn transpile(input: PathBuf, output: PathBuf, name: Option<String>, stubs: Vec<PathBuf>, verbose: bool) -> i32 {
    let options = CompileOptions {
        project_name: name.or_else(|| Some(libmolt::project::infer_project_name(&input))),
        stub_dirs: stubs,
        ..CompileOptions::default()
    };

    let result = load_inputs(&input)
        .and_then(|sources| compile(sources, &options))
        .and_then(|project| {
            project.write_to(&output)?;
            Ok(project)
        });

    match result {
        Ok(project) => {
            println!("transpiled {} module(s) into {}", project.modules.len(), output.display());
            0
        }
        Err(error) => report(error, verbose),
    }
}

fn parse(input: PathBuf, verbose: bool) -> i32 {
    let result = load_inputs(&input).and_then(|sources| {
        let asts = parse_sources(&sources)?;
        let tir = libmolt::build_tir(&asts)?;
        Ok(dump_tir(&tir))
    });

    match result {
        Ok(dump) => {
            print!("{dump}");
            0
        }
        Err(error) => report(error, verbose),
    }
}

fn test(input: PathBuf, run: bool, stubs: Vec<PathBuf>, verbose: bool) -> i32 {
    let out_dir = std::env::temp_dir().join(format!("moltc-test-{}", std::process::id()));
    let code = transpile(input, out_dir.clone(), None, stubs, verbose);
    if code != 0 {
        return code;
    }

    let manifest = out_dir.join("Cargo.toml");
    let subcommand = if run { "run" } else { "build" };
    let status = std::process::Command::new("cargo")
        .arg(subcommand)
        .arg("--manifest-path")
        .arg(&manifest)
        .status();

    match status {
        Ok(status) if status.success() => 0,
        Ok(status) => {
            eprintln!("cargo {subcommand} failed with {status}");
            1
        }
        Err(error) => {
            eprintln!("failed to invoke cargo: {error}");
            1
        }
    }
}
