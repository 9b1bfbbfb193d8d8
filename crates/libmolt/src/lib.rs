//! Molt: a transpiler from an annotated Python subset to idiomatic Rust.
//!
//! The library exposes the whole lowering pipeline:
//!
//! 1. **Lexing & parsing** ([`lexer`], [`parser`]): indentation-aware
//!    tokenizing with nom, then recursive descent into a surface AST.
//! 2. **IR building** ([`tir::builder`]): the AST is lowered into the typed
//!    intermediate representation, with node identities for every statement
//!    and expression.
//! 3. **Semantic analysis** ([`tir::analyzer`]): type and effect inference,
//!    mutability and borrow hints, stub resolution, async classification —
//!    all recorded in side tables ([`tir::annotations`]).
//! 4. **Emission** ([`emit`]): annotated TIR becomes Rust source text plus
//!    the imports and Cargo dependencies it needs.
//! 5. **Assembly** ([`project`]): modules, entry point and manifest land on
//!    disk as a buildable Cargo project.
//!
//! The [`compile`] function runs stages 1-4 and returns a
//! [`project::TranspiledProject`]; writing it out is the caller's move.
//!
//! # Example
//!
//! ```ignore
//! use libmolt::{compile, CompileOptions, file::SourceFile};
//!
//! let source = SourceFile::new(
//!     vec!["main".into()],
//!     "def main() -> None:\n    print(\"hi\")\n".to_string(),
//! );
//! let project = compile(vec![source], &CompileOptions::default())?;
//! project.write_to(std::path::Path::new("out"))?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};

use crate::ast::ModuleAst;
use crate::error::{CompileError, Diagnostics};
use crate::file::SourceFile;
use crate::nom_tools::State;
use crate::project::TranspiledProject;
use crate::stubs::StubRegistry;
use crate::tir::TirModule;

pub mod ast;
pub mod emit;
pub mod error;
pub mod file;
pub mod lexer;
pub mod nom_tools;
pub mod parser;
pub mod project;
pub mod stubs;
pub mod tir;

#[cfg(test)]
mod tests;

/// Cooperative cancellation between pipeline stages.
///
/// Stages are atomic; a cancellation request is honored before the next
/// stage begins.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), CompileError> {
        if self.is_cancelled() {
            Err(CompileError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Parameters of one transpilation run.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Project name; inferred from the input path when absent
    pub project_name: Option<String>,
    /// Extra stub package directories, searched in order
    pub stub_dirs: Vec<PathBuf>,
    pub cancel: CancelFlag,
}

/// Reads the input file or directory into source files.
///
/// Directory inputs are walked recursively; every `*.py` file becomes a
/// module named by its stem. Paths are sorted so module order (and thus
/// emission) is deterministic.
pub fn load_inputs(input: &Path) -> Result<Vec<SourceFile>, CompileError> {
    let mut paths = Vec::new();
    if input.is_dir() {
        collect_python_files(input, &mut paths)?;
        paths.sort();
    } else {
        paths.push(input.to_path_buf());
    }

    let mut sources = Vec::new();
    for path in paths {
        let code = std::fs::read_to_string(&path).map_err(|error| CompileError::io(&path, error))?;
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "main".to_string());
        sources.push(SourceFile::new(vec![stem], code));
    }
    Ok(sources)
}

fn collect_python_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), CompileError> {
    let entries = std::fs::read_dir(dir).map_err(|error| CompileError::io(dir, error))?;
    for entry in entries {
        let entry = entry.map_err(|error| CompileError::io(dir, error))?;
        let path = entry.path();
        if path.is_dir() {
            collect_python_files(&path, paths)?;
        } else if path.extension().map(|ext| ext == "py").unwrap_or(false) {
            paths.push(path);
        }
    }
    Ok(())
}

/// Parses every source file, collecting diagnostics across all of them.
pub fn parse_sources(sources: &[SourceFile]) -> Result<Vec<ModuleAst>, Diagnostics> {
    let mut modules = Vec::new();
    let mut diagnostics = Diagnostics::default();
    for source in sources {
        let state = State::new(source.clone());
        match parser::parse(&state) {
            Ok(module) => modules.push(module),
            Err(diagnostic) => diagnostics.push(diagnostic),
        }
    }
    if diagnostics.is_empty() {
        Ok(modules)
    } else {
        Err(diagnostics)
    }
}

/// Lowers parsed modules into TIR, with one id space across all of them.
pub fn build_tir(modules: &[ModuleAst]) -> Result<Vec<TirModule>, Diagnostics> {
    let mut counter = 0;
    let mut lowered = Vec::new();
    let mut diagnostics = Diagnostics::default();
    for module in modules {
        let (tir, module_diagnostics) = tir::builder::lower_module(module, &mut counter);
        diagnostics.extend(module_diagnostics);
        lowered.push(tir);
    }
    if diagnostics.is_empty() {
        Ok(lowered)
    } else {
        Err(diagnostics)
    }
}

/// A textual dump of the TIR, used by the `parse` subcommand.
pub fn dump_tir(modules: &[TirModule]) -> String {
    format!("{modules:#?}\n")
}

/// Runs the full pipeline short of writing to disk.
pub fn compile(sources: Vec<SourceFile>, options: &CompileOptions) -> Result<TranspiledProject, CompileError> {
    options.cancel.check()?;

    let asts = parse_sources(&sources)?;
    options.cancel.check()?;

    let tir_modules = build_tir(&asts)?;
    options.cancel.check()?;

    let mut registry = StubRegistry::with_builtins();
    for dir in &options.stub_dirs {
        registry.load_directory(dir).map_err(Diagnostics::from)?;
    }

    let annotations = tir::analyzer::analyze(&tir_modules, &registry)?;
    options.cancel.check()?;

    let project_name = options.project_name.clone().unwrap_or_else(|| {
        tir_modules
            .iter()
            .find(|module| module.is_entry())
            .or(tir_modules.first())
            .map(|module| module.name.replace('_', "-"))
            .unwrap_or_else(|| "transpiled".to_string())
    });
    let emit_options = emit::EmitOptions {
        project_name: project_name.clone(),
    };

    let mut emitted = Vec::new();
    for module in &tir_modules {
        emitted.push(emit::emit_module(module, &tir_modules, &annotations, &registry, &emit_options));
        debug!("module '{}' emitted", module.name);
    }

    let requirements = registry.collect_requirements();
    info!(
        "compiled {} module(s) into project '{}' with {} dependency requirement(s)",
        emitted.len(),
        project_name,
        requirements.len()
    );

    Ok(TranspiledProject {
        name: project_name,
        modules: emitted,
        requirements,
    })
}
