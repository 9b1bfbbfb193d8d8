//! Diagnostics and error reporting for the Molt transpiler.
//!
//! Every user-facing failure is a [`Diagnostic`]: a stable kind code, a byte
//! span into the offending [`SourceFile`], a primary message and optional
//! notes. Diagnostics from one invocation are collected into a
//! [`Diagnostics`] report; a single fatal diagnostic prevents emission but
//! analysis keeps going to surface more of them.
//!
//! Two renderers are provided, mirroring the teacher's report-generator
//! split: [`PlainReportGenerator`] prints one `path:line:col: KIND: message`
//! line per diagnostic, and [`CodeSpanReportGenerator`] produces rich
//! labeled output through `codespan-reporting` for verbose runs.

use std::ops::Range;
use std::path::PathBuf;

use codespan_reporting::{
    diagnostic::{Diagnostic as CodeSpanDiagnostic, Label},
    files::SimpleFiles,
    term::{
        self,
        termcolor::{ColorChoice, StandardStream},
    },
};
use strum_macros::{Display, EnumIs};

use crate::file::SourceFile;

/// Stable diagnostic codes.
///
/// The serialized form (`E_PARSE`, …) is the code printed in reports and
/// matched by tests; it must never change for an existing kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIs)]
pub enum DiagnosticKind {
    /// Surface syntax is not readable at all
    #[strum(serialize = "E_PARSE")]
    Parse,
    /// A parameter or return type lacks an annotation
    #[strum(serialize = "E_MISSING_ANNOTATION")]
    MissingAnnotation,
    /// A local's type cannot be inferred and is not annotated
    #[strum(serialize = "E_UNINFERABLE_LOCAL")]
    UninferableLocal,
    /// Operation applied to incompatible types
    #[strum(serialize = "E_TYPE_MISMATCH")]
    TypeMismatch,
    /// Identifier neither defined locally nor resolvable via stubs
    #[strum(serialize = "E_UNKNOWN_SYMBOL")]
    UnknownSymbol,
    /// An await expression appears outside an async function
    #[strum(serialize = "E_AWAIT_OUTSIDE_ASYNC")]
    AwaitOutsideAsync,
    /// A syntactic form outside the accepted subset
    #[strum(serialize = "E_UNSUPPORTED_CONSTRUCT")]
    UnsupportedConstruct,
    /// A stub package is malformed
    #[strum(serialize = "E_STUB_LOAD")]
    StubLoad,
    /// Input read or output write failed
    #[strum(serialize = "E_IO")]
    Io,
}

/// A single diagnostic with its source location.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// The stable kind code
    pub kind: DiagnosticKind,
    /// File the diagnostic points into
    pub file: SourceFile,
    /// Byte span of the offending source
    pub position: Range<usize>,
    /// Primary message
    pub message: String,
    /// Optional follow-up notes
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, file: SourceFile, position: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            kind,
            file,
            position,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    /// Attaches a note, returning the diagnostic for chaining.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (line, col) = self.file.line_col(self.position.start);
        write!(f, "{}:{}:{}: {}: {}", self.file.display_path(), line, col, self.kind, self.message)
    }
}

/// The diagnostics collected by one invocation.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Wraps the collection into a [`CompileError`] if anything was reported.
    pub fn into_result(self) -> Result<(), CompileError> {
        if self.items.is_empty() {
            Ok(())
        } else {
            Err(CompileError::Report(self))
        }
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self { items: vec![diagnostic] }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, item) in self.items.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

/// Library-level error type.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// One or more diagnostics were reported
    #[error("{0}")]
    Report(Diagnostics),
    /// File system failure outside any single source span
    #[error("E_IO: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The invocation was cancelled between pipeline stages
    #[error("cancelled")]
    Cancelled,
}

impl CompileError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

impl From<Diagnostic> for CompileError {
    fn from(diagnostic: Diagnostic) -> Self {
        Self::Report(diagnostic.into())
    }
}

impl From<Diagnostics> for CompileError {
    fn from(diagnostics: Diagnostics) -> Self {
        Self::Report(diagnostics)
    }
}

/// Trait for turning a diagnostics report into user-visible output.
pub trait ReportGenerator {
    fn generate(diagnostics: &Diagnostics);
}

/// One `path:line:col: KIND: message` line per diagnostic on stderr.
pub struct PlainReportGenerator;

impl ReportGenerator for PlainReportGenerator {
    fn generate(diagnostics: &Diagnostics) {
        for diagnostic in diagnostics.iter() {
            eprintln!("{diagnostic}");
            for note in &diagnostic.notes {
                eprintln!("    note: {note}");
            }
        }
    }
}

/// Rich labeled report through `codespan-reporting`.
pub struct CodeSpanReportGenerator;

impl ReportGenerator for CodeSpanReportGenerator {
    fn generate(diagnostics: &Diagnostics) {
        let mut files = SimpleFiles::new();
        let mut rendered = Vec::new();

        for diagnostic in diagnostics.iter() {
            let file_id = files.add(diagnostic.file.display_path(), diagnostic.file.code().to_string());
            let mut position = diagnostic.position.clone();
            if position.end > diagnostic.file.code().len() {
                position.end = diagnostic.file.code().len();
            }
            if position.start > position.end {
                position.start = position.end;
            }

            let mut entry = CodeSpanDiagnostic::error()
                .with_code(diagnostic.kind.to_string())
                .with_message(diagnostic.message.clone())
                .with_labels(vec![Label::primary(file_id, position)]);
            for note in &diagnostic.notes {
                entry = entry.with_note(note.clone());
            }
            rendered.push(entry);
        }

        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();
        for entry in rendered {
            let _ = term::emit(&mut writer.lock(), &config, &files, &entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{Diagnostic, DiagnosticKind, Diagnostics};
    use crate::file::SourceFile;

    #[test]
    fn diagnostic_line_format() {
        let file = SourceFile::new(vec!["main".into()], "x = 1\ny = foo\n".to_string());
        let diagnostic = Diagnostic::new(DiagnosticKind::UnknownSymbol, file, 10..13, "'foo' is not defined");
        assert_eq!(diagnostic.to_string(), "main.py:2:5: E_UNKNOWN_SYMBOL: 'foo' is not defined");
    }

    #[test]
    fn kind_codes_are_stable() {
        assert_eq!(DiagnosticKind::Parse.to_string(), "E_PARSE");
        assert_eq!(DiagnosticKind::MissingAnnotation.to_string(), "E_MISSING_ANNOTATION");
        assert_eq!(DiagnosticKind::UninferableLocal.to_string(), "E_UNINFERABLE_LOCAL");
        assert_eq!(DiagnosticKind::TypeMismatch.to_string(), "E_TYPE_MISMATCH");
        assert_eq!(DiagnosticKind::UnknownSymbol.to_string(), "E_UNKNOWN_SYMBOL");
        assert_eq!(DiagnosticKind::AwaitOutsideAsync.to_string(), "E_AWAIT_OUTSIDE_ASYNC");
        assert_eq!(DiagnosticKind::UnsupportedConstruct.to_string(), "E_UNSUPPORTED_CONSTRUCT");
        assert_eq!(DiagnosticKind::StubLoad.to_string(), "E_STUB_LOAD");
        assert_eq!(DiagnosticKind::Io.to_string(), "E_IO");
    }

    #[test]
    fn report_collects_multiple() {
        let file = SourceFile::new(vec!["main".into()], "a\nb\n".to_string());
        let mut diagnostics = Diagnostics::default();
        diagnostics.push(Diagnostic::new(DiagnosticKind::TypeMismatch, file.clone(), 0..1, "first"));
        diagnostics.push(Diagnostic::new(DiagnosticKind::UnknownSymbol, file, 2..3, "second"));
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.clone().into_result().is_err());
        let text = diagnostics.to_string();
        assert!(text.contains("E_TYPE_MISMATCH"));
        assert!(text.contains("E_UNKNOWN_SYMBOL"));
    }
}
