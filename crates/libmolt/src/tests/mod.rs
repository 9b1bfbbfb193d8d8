//! Integration-level tests over the whole pipeline.
//!
//! The submodules group tests by the stage whose behavior they pin down;
//! `scenarios` holds the end-to-end programs with literal expected output
//! fragments.

use crate::error::{CompileError, DiagnosticKind, Diagnostics};
use crate::file::SourceFile;
use crate::project::TranspiledProject;
use crate::{compile, CompileOptions};

mod analyzer;
mod emitter;
mod scenarios;

/// Compiles named modules; the one defining `main` becomes the entry.
pub(crate) fn compile_modules(sources: &[(&str, &str)]) -> Result<TranspiledProject, CompileError> {
    let sources = sources
        .iter()
        .map(|(name, code)| SourceFile::new(vec![name.to_string()], code.to_string()))
        .collect();
    compile(sources, &CompileOptions::default())
}

/// Compiles a single module named `main`.
pub(crate) fn compile_one(code: &str) -> TranspiledProject {
    match compile_modules(&[("main", code)]) {
        Ok(project) => project,
        Err(CompileError::Report(diagnostics)) => panic!("unexpected diagnostics:\n{diagnostics}"),
        Err(other) => panic!("unexpected error: {other}"),
    }
}

/// The emitted text of the entry module.
pub(crate) fn entry_text(code: &str) -> String {
    let project = compile_one(code);
    project
        .modules
        .iter()
        .find(|module| module.is_entry)
        .or_else(|| project.modules.first())
        .expect("at least one module")
        .text
        .clone()
}

/// The diagnostics a failing compilation reports.
pub(crate) fn compile_err(code: &str) -> Diagnostics {
    match compile_modules(&[("main", code)]) {
        Err(CompileError::Report(diagnostics)) => diagnostics,
        Ok(_) => panic!("expected diagnostics, compilation succeeded"),
        Err(other) => panic!("unexpected error: {other}"),
    }
}

/// The kinds of all reported diagnostics, in order.
pub(crate) fn error_kinds(code: &str) -> Vec<DiagnosticKind> {
    compile_err(code).iter().map(|diagnostic| diagnostic.kind).collect()
}

mod pipeline {
    use pretty_assertions::assert_eq;

    use crate::error::CompileError;
    use crate::file::SourceFile;
    use crate::{compile, CancelFlag, CompileOptions};

    #[test]
    fn cancellation_is_honored_between_stages() {
        let cancel = CancelFlag::default();
        cancel.cancel();
        let options = CompileOptions {
            cancel,
            ..CompileOptions::default()
        };
        let source = SourceFile::new(vec!["main".into()], "def main() -> None:\n    pass\n".to_string());
        let error = compile(vec![source], &options).unwrap_err();
        assert!(matches!(error, CompileError::Cancelled));
    }

    #[test]
    fn project_name_comes_from_entry_module() {
        let project = super::compile_one("def main() -> None:\n    pass\n");
        assert_eq!(project.name, "main");
    }

    #[test]
    fn explicit_project_name_wins() {
        let source = SourceFile::new(vec!["main".into()], "def main() -> None:\n    pass\n".to_string());
        let options = CompileOptions {
            project_name: Some("greeter".to_string()),
            ..CompileOptions::default()
        };
        let project = compile(vec![source], &options).unwrap();
        assert_eq!(project.name, "greeter");
    }

    #[test]
    fn load_inputs_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "def main() -> None:\n    pass\n").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/worker.py"), "def work() -> None:\n    pass\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let sources = crate::load_inputs(dir.path()).unwrap();
        assert_eq!(sources.len(), 2);
        let names: Vec<_> = sources.iter().map(|source| source.module_name().to_string()).collect();
        assert!(names.contains(&"main".to_string()));
        assert!(names.contains(&"worker".to_string()));
    }

    #[test]
    fn multi_module_project_links_through_imports() {
        let project = super::compile_modules(&[
            (
                "main",
                "from utils import helper\n\ndef main() -> None:\n    print(helper(2))\n",
            ),
            ("utils", "def helper(x: int) -> int:\n    return x * 2\n"),
        ])
        .unwrap();

        let entry = project.modules.iter().find(|module| module.is_entry).unwrap();
        assert!(entry.text.contains("use main::utils::helper;"), "entry was:\n{}", entry.text);
        let utils = project.modules.iter().find(|module| module.name == "utils").unwrap();
        assert!(utils.text.contains("pub fn helper(x: i64) -> i64 {"), "utils was:\n{}", utils.text);
    }
}
