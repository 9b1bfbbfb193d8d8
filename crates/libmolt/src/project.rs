//! Project assembler.
//!
//! Takes the emitted modules and lays out a buildable Cargo project:
//! `src/main.rs` for the entry module, `src/lib.rs` declaring the others,
//! one file per module, and a synthesized `Cargo.toml` carrying the
//! accumulated build requirements.
//!
//! The output directory is only created here, after analysis and emission
//! succeeded, so a failing run leaves no partial tree behind. If a write
//! fails midway the partial output stays in place and the error reports
//! which path broke.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info};

use crate::emit::EmittedModule;
use crate::error::CompileError;
use crate::stubs::BuildRequirement;

/// A transpiled project ready to be written to disk.
#[derive(Debug, Clone)]
pub struct TranspiledProject {
    pub name: String,
    pub modules: Vec<EmittedModule>,
    pub requirements: Vec<BuildRequirement>,
}

impl TranspiledProject {
    /// The synthesized `Cargo.toml`.
    pub fn manifest(&self) -> String {
        let mut text = String::new();
        text.push_str("[package]\n");
        text.push_str(&format!("name = \"{}\"\n", self.name));
        text.push_str("version = \"0.1.0\"\n");
        text.push_str("edition = \"2021\"\n");

        text.push_str("\n[dependencies]\n");
        for (name, (version, features)) in self.merged_requirements() {
            if features.is_empty() {
                text.push_str(&format!("{name} = \"{version}\"\n"));
            } else {
                let features: Vec<_> = features.iter().map(|feature| format!("\"{feature}\"")).collect();
                text.push_str(&format!(
                    "{name} = {{ version = \"{version}\", features = [{}] }}\n",
                    features.join(", ")
                ));
            }
        }

        // stubbed channel operations return ignorable results, and the
        // index-cast rule can produce casts the target type already implies
        text.push_str("\n[lints.rust]\n");
        text.push_str("unused_must_use = \"allow\"\n");
        text.push_str("\n[lints.clippy]\n");
        text.push_str("unnecessary_cast = \"allow\"\n");
        text
    }

    /// Requirements deduplicated by crate, feature sets unioned.
    fn merged_requirements(&self) -> IndexMap<String, (String, Vec<String>)> {
        let mut merged: IndexMap<String, (String, Vec<String>)> = IndexMap::new();
        for requirement in &self.requirements {
            let entry = merged
                .entry(requirement.crate_name.clone())
                .or_insert_with(|| (requirement.version.clone(), Vec::new()));
            for feature in &requirement.features {
                if !entry.1.contains(feature) {
                    entry.1.push(feature.clone());
                }
            }
        }
        merged
    }

    /// Whether the project needs a `lib.rs` with module declarations.
    fn is_multi_module(&self) -> bool {
        self.modules.len() > 1
    }

    fn entry(&self) -> Option<&EmittedModule> {
        self.modules.iter().find(|module| module.is_entry).or(self.modules.first())
    }

    /// Writes the project tree under `out_dir`.
    pub fn write_to(&self, out_dir: &Path) -> Result<(), CompileError> {
        let src_dir = out_dir.join("src");
        std::fs::create_dir_all(&src_dir).map_err(|error| CompileError::io(&src_dir, error))?;

        let entry_name = self.entry().map(|module| module.name.clone()).unwrap_or_default();

        for module in &self.modules {
            let path = if module.name == entry_name {
                src_dir.join("main.rs")
            } else {
                src_dir.join(format!("{}.rs", module.name))
            };
            write_file(&path, &module.text)?;
        }

        if self.is_multi_module() {
            let mut lib = String::new();
            for module in &self.modules {
                if module.name != entry_name {
                    lib.push_str(&format!("pub mod {};\n", module.name));
                }
            }
            write_file(&src_dir.join("lib.rs"), &lib)?;
        }

        write_file(&out_dir.join("Cargo.toml"), &self.manifest())?;
        info!("project '{}' written to {}", self.name, out_dir.display());
        Ok(())
    }
}

fn write_file(path: &PathBuf, content: &str) -> Result<(), CompileError> {
    debug!("writing {}", path.display());
    std::fs::write(path, content).map_err(|error| CompileError::io(path, error))
}

/// Derives a project name from the input path when none was given.
pub fn infer_project_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "transpiled".to_string())
        .replace(['.', ' '], "-")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{infer_project_name, TranspiledProject};
    use crate::emit::EmittedModule;
    use crate::stubs::BuildRequirement;

    fn module(name: &str, is_entry: bool) -> EmittedModule {
        EmittedModule {
            name: name.to_string(),
            is_entry,
            text: format!("// {name}\n"),
            requirements: Vec::new(),
        }
    }

    #[test]
    fn manifest_contains_lints_and_dependencies() {
        let project = TranspiledProject {
            name: "demo".to_string(),
            modules: vec![module("main", true)],
            requirements: vec![
                BuildRequirement::new("tokio", "1", &["full"]),
                BuildRequirement::new("tokio", "1", &["sync"]),
                BuildRequirement::new("tempfile", "3", &[]),
            ],
        };
        let manifest = project.manifest();
        assert!(manifest.contains("name = \"demo\""));
        assert!(manifest.contains("tokio = { version = \"1\", features = [\"full\", \"sync\"] }"));
        assert!(manifest.contains("tempfile = \"3\""));
        assert!(manifest.contains("unused_must_use = \"allow\""));
        assert!(manifest.contains("unnecessary_cast = \"allow\""));
    }

    #[test]
    fn single_module_layout() {
        let dir = tempfile::tempdir().unwrap();
        let project = TranspiledProject {
            name: "single".to_string(),
            modules: vec![module("main", true)],
            requirements: Vec::new(),
        };
        project.write_to(dir.path()).unwrap();
        assert!(dir.path().join("src/main.rs").exists());
        assert!(dir.path().join("Cargo.toml").exists());
        assert!(!dir.path().join("src/lib.rs").exists());
    }

    #[test]
    fn directory_layout_declares_modules() {
        let dir = tempfile::tempdir().unwrap();
        let project = TranspiledProject {
            name: "multi".to_string(),
            modules: vec![module("main", true), module("utils", false)],
            requirements: Vec::new(),
        };
        project.write_to(dir.path()).unwrap();
        assert!(dir.path().join("src/main.rs").exists());
        assert!(dir.path().join("src/utils.rs").exists());
        let lib = std::fs::read_to_string(dir.path().join("src/lib.rs")).unwrap();
        assert_eq!(lib, "pub mod utils;\n");
    }

    #[test]
    fn project_name_inference() {
        assert_eq!(infer_project_name(std::path::Path::new("examples/greet.py")), "greet");
        assert_eq!(infer_project_name(std::path::Path::new("My Tool.py")), "my-tool");
    }
}
