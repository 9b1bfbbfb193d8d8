//! Built-in stub set.
//!
//! Covers the external surface the transpiler supports out of the box:
//! tokio channels, task spawning, async sleep, and temporary directories.
//! Disk packages loaded later shadow these entries name-by-name.
//!
//! Core builtins with dedicated TIR nodes (`print`, `len`, `range`,
//! `Arc`, `Mutex`, `Ok`/`Err`) are not stubs; the builder and emitter
//! handle them directly.

use indexmap::IndexMap;

use super::package::{BuildRequirement, StubCallable, StubPackage, TypeRepr};

fn tokio_requirement() -> BuildRequirement {
    BuildRequirement::new("tokio", "1", &["full"])
}

/// The package compiled into every invocation.
pub fn builtin_package() -> StubPackage {
    let mut functions = IndexMap::new();
    let mut methods = IndexMap::new();
    let mut types = IndexMap::new();

    types.insert("Sender".to_string(), TypeRepr::named("Sender"));
    types.insert("Receiver".to_string(), TypeRepr::named("Receiver"));
    types.insert("JoinHandle".to_string(), TypeRepr::named("JoinHandle"));
    types.insert("TempDir".to_string(), TypeRepr::named("TempDir"));

    functions.insert(
        "mpsc_channel".to_string(),
        StubCallable {
            params: vec![TypeRepr::Int],
            returns: TypeRepr::Tuple(vec![TypeRepr::named("Sender"), TypeRepr::named("Receiver")]),
            is_async: false,
            template: "mpsc::channel({arg0} as usize)".to_string(),
            imports: vec!["tokio::sync::mpsc".to_string()],
            requires: Some(tokio_requirement()),
            arg_forms: Vec::new(),
            exclusive_receiver: false,
        },
    );

    functions.insert(
        "spawn".to_string(),
        StubCallable {
            params: vec![TypeRepr::named("Future")],
            returns: TypeRepr::named("JoinHandle"),
            is_async: false,
            template: "tokio::spawn({arg0})".to_string(),
            imports: Vec::new(),
            requires: Some(tokio_requirement()),
            arg_forms: Vec::new(),
            exclusive_receiver: false,
        },
    );

    functions.insert(
        "asyncio.sleep".to_string(),
        StubCallable {
            params: vec![TypeRepr::Float],
            returns: TypeRepr::Unit,
            is_async: true,
            template: "tokio::time::sleep(std::time::Duration::from_secs_f64({arg0} as f64))".to_string(),
            imports: Vec::new(),
            requires: Some(tokio_requirement()),
            arg_forms: Vec::new(),
            exclusive_receiver: false,
        },
    );

    functions.insert(
        "TemporaryDirectory".to_string(),
        StubCallable {
            params: Vec::new(),
            returns: TypeRepr::named("TempDir"),
            is_async: false,
            template: "tempfile::tempdir().expect(\"failed to create temporary directory\")".to_string(),
            imports: Vec::new(),
            requires: Some(BuildRequirement::new("tempfile", "3", &[])),
            arg_forms: Vec::new(),
            exclusive_receiver: false,
        },
    );

    methods.insert(
        "Sender.send".to_string(),
        StubCallable {
            params: vec![TypeRepr::named("T")],
            returns: TypeRepr::Fallible(Box::new(TypeRepr::Unit), Box::new(TypeRepr::named("SendError"))),
            is_async: true,
            template: "{self}.send({arg0})".to_string(),
            imports: Vec::new(),
            requires: None,
            arg_forms: Vec::new(),
            exclusive_receiver: false,
        },
    );

    methods.insert(
        "Receiver.recv".to_string(),
        StubCallable {
            params: Vec::new(),
            returns: TypeRepr::Optional(Box::new(TypeRepr::named("T"))),
            is_async: true,
            template: "{self}.recv()".to_string(),
            imports: Vec::new(),
            requires: None,
            arg_forms: Vec::new(),
            exclusive_receiver: true,
        },
    );

    StubPackage {
        name: "molt-builtins".to_string(),
        types,
        functions,
        methods,
    }
}
