//! Source file representation for the Molt transpiler.
//!
//! A [`SourceFile`] couples a module path with the Python source text it was
//! read from. The struct is cheap to clone (both fields are `Arc`s) and is
//! threaded through every pipeline stage so diagnostics can point back into
//! the original text.

use std::{path::PathBuf, sync::Arc};

/// A Python source file with its module path and contents.
///
/// The path is stored as components relative to the input root; `["sub",
/// "worker"]` names the module `sub.worker` read from `sub/worker.py`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    /// Module path components relative to the input root
    pub path: Arc<Vec<String>>,
    /// The Python source text
    pub code: Arc<String>,
}

impl SourceFile {
    /// Creates a new source file from path components and source text.
    pub fn new(path: Vec<String>, code: String) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
        }
    }

    /// Returns the module path components.
    pub fn path(&self) -> &Vec<String> {
        &self.path
    }

    /// Returns the source text.
    pub fn code(&self) -> &String {
        self.code.as_ref()
    }

    /// The module name, i.e. the last path component.
    pub fn module_name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("<memory>")
    }

    /// The dotted module path (`sub.worker`).
    pub fn module_path(&self) -> String {
        self.path.join(".")
    }

    /// The on-disk style path used in diagnostic lines (`sub/worker.py`).
    pub fn display_path(&self) -> String {
        let buffer = PathBuf::from_iter(self.path.iter());
        format!("{}.py", buffer.to_string_lossy())
    }

    /// Converts a byte offset into a 1-based `(line, column)` pair.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.code.len());
        let mut line = 1;
        let mut col = 1;
        for (index, ch) in self.code.char_indices() {
            if index >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }
}

impl std::fmt::Display for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_path())
    }
}

#[cfg(test)]
mod tests {
    use super::SourceFile;

    #[test]
    fn line_col_test() {
        let file = SourceFile::new(vec!["main".into()], "abc\ndef\n".to_string());
        assert_eq!(file.line_col(0), (1, 1));
        assert_eq!(file.line_col(2), (1, 3));
        assert_eq!(file.line_col(4), (2, 1));
        assert_eq!(file.line_col(6), (2, 3));
    }

    #[test]
    fn display_path_test() {
        let file = SourceFile::new(vec!["sub".into(), "worker".into()], String::new());
        assert_eq!(file.display_path(), "sub/worker.py");
        assert_eq!(file.module_path(), "sub.worker");
        assert_eq!(file.module_name(), "worker");
    }
}
