//! Stub registry: discovery, loading, caching, lookup.
//!
//! The registry maps external Python names to their Rust replacements. It is
//! consulted twice per invocation: by the semantic analyzer for signatures
//! and result types, and by the emitter for template expansion, imports and
//! build requirements.
//!
//! Discovery walks the stub search directories given on the command line;
//! every `*.json` file in one is a [`StubPackage`]. The built-in package is
//! always loaded first, so disk packages shadow it name-by-name. A directory
//! that cannot be read is not fatal by itself; unresolved references surface
//! later as `E_UNKNOWN_SYMBOL` at their use sites.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::file::SourceFile;
use crate::tir::Type;

pub mod builtins;
pub mod package;

pub use package::{ArgForm, BuildRequirement, StubCallable, StubPackage, TypeRepr};

/// The per-invocation stub registry.
///
/// Lookups are cached per name; requirements noted during emission
/// accumulate for the manifest. Interior mutability keeps the lookup API
/// `&self` — the whole pipeline is single-threaded.
pub struct StubRegistry {
    packages: Vec<StubPackage>,
    callable_cache: RefCell<IndexMap<String, Option<Rc<StubCallable>>>>,
    method_cache: RefCell<IndexMap<String, Option<Rc<StubCallable>>>>,
    requirements: RefCell<IndexSet<BuildRequirement>>,
}

impl StubRegistry {
    /// Registry holding only the built-in package.
    pub fn with_builtins() -> Self {
        Self {
            packages: vec![builtins::builtin_package()],
            callable_cache: RefCell::new(IndexMap::new()),
            method_cache: RefCell::new(IndexMap::new()),
            requirements: RefCell::new(IndexSet::new()),
        }
    }

    /// Registry without the built-ins; used by tests.
    pub fn empty() -> Self {
        Self {
            packages: Vec::new(),
            callable_cache: RefCell::new(IndexMap::new()),
            method_cache: RefCell::new(IndexMap::new()),
            requirements: RefCell::new(IndexSet::new()),
        }
    }

    /// Adds an already-built package; later packages shadow earlier ones.
    pub fn add_package(&mut self, package: StubPackage) {
        debug!("stub package '{}' registered", package.name);
        self.packages.push(package);
        self.callable_cache.borrow_mut().clear();
        self.method_cache.borrow_mut().clear();
    }

    /// Loads every `*.json` package in `dir`.
    ///
    /// A malformed package is `E_STUB_LOAD`; an unreadable directory is
    /// reported the same way since the caller named it explicitly.
    pub fn load_directory(&mut self, dir: &Path) -> Result<(), Diagnostic> {
        let entries = std::fs::read_dir(dir).map_err(|error| {
            stub_load_error(dir, format!("cannot read stub directory: {error}"))
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        paths.sort();

        for path in paths {
            let content = std::fs::read_to_string(&path)
                .map_err(|error| stub_load_error(&path, format!("cannot read stub package: {error}")))?;
            let package: StubPackage = serde_json::from_str(&content)
                .map_err(|error| stub_load_error(&path, format!("malformed stub package: {error}")))?;
            self.add_package(package);
        }
        Ok(())
    }

    /// Looks up an external type by name.
    pub fn lookup_type(&self, name: &str) -> Option<Type> {
        self.packages
            .iter()
            .rev()
            .find_map(|package| package.types.get(name))
            .map(TypeRepr::to_type)
    }

    /// Looks up a stubbed free function or dotted path.
    pub fn lookup_callable(&self, path: &str) -> Option<Rc<StubCallable>> {
        if let Some(cached) = self.callable_cache.borrow().get(path) {
            return cached.clone();
        }
        let found = self
            .packages
            .iter()
            .rev()
            .find_map(|package| package.functions.get(path))
            .cloned()
            .map(Rc::new);
        self.callable_cache.borrow_mut().insert(path.to_string(), found.clone());
        found
    }

    /// Looks up a method by receiver type and name.
    ///
    /// Dispatch is nominal: the receiver's stub key (its `Named` path) plus
    /// the method name form the table key.
    pub fn lookup_method(&self, receiver: &Type, name: &str) -> Option<Rc<StubCallable>> {
        let key = format!("{}.{name}", receiver.stub_key()?);
        if let Some(cached) = self.method_cache.borrow().get(&key) {
            return cached.clone();
        }
        let found = self
            .packages
            .iter()
            .rev()
            .find_map(|package| package.methods.get(&key))
            .cloned()
            .map(Rc::new);
        self.method_cache.borrow_mut().insert(key, found.clone());
        found
    }

    /// Records a build requirement encountered during emission.
    pub fn note_requirement(&self, requirement: BuildRequirement) {
        self.requirements.borrow_mut().insert(requirement);
    }

    /// The build requirements accumulated during this run.
    pub fn collect_requirements(&self) -> Vec<BuildRequirement> {
        self.requirements.borrow().iter().cloned().collect()
    }
}

fn stub_load_error(path: &Path, message: String) -> Diagnostic {
    let file = SourceFile::new(vec![path.to_string_lossy().into_owned()], String::new());
    Diagnostic::new(DiagnosticKind::StubLoad, file, 0..0, message)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::StubRegistry;
    use crate::tir::Type;

    #[test]
    fn builtin_channel_is_resolvable() {
        let registry = StubRegistry::with_builtins();
        let channel = registry.lookup_callable("mpsc_channel").unwrap();
        assert!(channel.template.contains("mpsc::channel"));
        assert_eq!(channel.imports, vec!["tokio::sync::mpsc".to_string()]);
        assert_eq!(channel.requires.as_ref().unwrap().crate_name, "tokio");
    }

    #[test]
    fn method_dispatch_is_nominal() {
        let registry = StubRegistry::with_builtins();
        let receiver = Type::named("Receiver");
        let recv = registry.lookup_method(&receiver, "recv").unwrap();
        assert!(recv.is_async);
        assert!(recv.exclusive_receiver);
        assert!(registry.lookup_method(&Type::Int, "recv").is_none());
    }

    #[test]
    fn lookup_misses_are_cached() {
        let registry = StubRegistry::with_builtins();
        assert!(registry.lookup_callable("not_a_stub").is_none());
        assert!(registry.callable_cache.borrow().contains_key("not_a_stub"));
    }

    #[test]
    fn later_packages_shadow_builtins() {
        let mut registry = StubRegistry::with_builtins();
        let mut package = super::builtins::builtin_package();
        package.name = "override".into();
        let mut channel = package.functions.get("mpsc_channel").unwrap().clone();
        channel.template = "custom::channel({arg0})".into();
        package.functions.insert("mpsc_channel".into(), channel);
        registry.add_package(package);

        let resolved = registry.lookup_callable("mpsc_channel").unwrap();
        assert_eq!(resolved.template, "custom::channel({arg0})");
    }

    #[test]
    fn load_directory_reports_malformed_package() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let mut registry = StubRegistry::with_builtins();
        let error = registry.load_directory(dir.path()).unwrap_err();
        assert_eq!(error.kind, crate::error::DiagnosticKind::StubLoad);
    }

    #[test]
    fn load_directory_accepts_valid_package() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("extra.json"),
            r#"{
                "name": "extra",
                "functions": {
                    "now_ms": {
                        "returns": "int",
                        "template": "chrono::Utc::now().timestamp_millis()",
                        "requires": { "crate": "chrono", "version": "0.4" }
                    }
                }
            }"#,
        )
        .unwrap();
        let mut registry = StubRegistry::with_builtins();
        registry.load_directory(dir.path()).unwrap();
        assert!(registry.lookup_callable("now_ms").is_some());
    }
}
