//! On-disk stub package format.
//!
//! A stub package declares external Python names together with the Rust that
//! replaces them: a type table, callables (free functions and methods) with
//! signatures, substitution templates, required imports, and Cargo build
//! requirements. Packages are JSON documents; the built-in set in
//! [`super::builtins`] uses the same data model.
//!
//! Templates are pure textual substitution. `{self}` stands for the
//! receiver, `{arg0}`, `{arg1}`, … for the positional arguments. Expanded
//! templates never re-enter the parser.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::tir::Type;

/// Serializable spelling of the TIR type constructors.
///
/// Unit variants serialize as bare strings (`"int"`), the rest as
/// single-key objects (`{"seq": "int"}`, `{"map": ["str", "int"]}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRepr {
    Bool,
    Int,
    Float,
    Str,
    Unit,
    Never,
    Seq(Box<TypeRepr>),
    Map(Box<TypeRepr>, Box<TypeRepr>),
    Set(Box<TypeRepr>),
    Tuple(Vec<TypeRepr>),
    Optional(Box<TypeRepr>),
    Fallible(Box<TypeRepr>, Box<TypeRepr>),
    Named {
        path: String,
        #[serde(default)]
        generics: Vec<TypeRepr>,
    },
    Shared(Box<TypeRepr>),
    Guarded(Box<TypeRepr>),
}

impl TypeRepr {
    pub fn named(path: impl Into<String>) -> Self {
        TypeRepr::Named {
            path: path.into(),
            generics: Vec::new(),
        }
    }

    /// Converts to the analyzer's type universe.
    pub fn to_type(&self) -> Type {
        match self {
            TypeRepr::Bool => Type::Bool,
            TypeRepr::Int => Type::Int,
            TypeRepr::Float => Type::Float,
            TypeRepr::Str => Type::String,
            TypeRepr::Unit => Type::Unit,
            TypeRepr::Never => Type::Never,
            TypeRepr::Seq(inner) => Type::Sequence(Box::new(inner.to_type())),
            TypeRepr::Map(key, value) => Type::Mapping(Box::new(key.to_type()), Box::new(value.to_type())),
            TypeRepr::Set(inner) => Type::Set(Box::new(inner.to_type())),
            TypeRepr::Tuple(items) => Type::Tuple(items.iter().map(TypeRepr::to_type).collect()),
            TypeRepr::Optional(inner) => Type::Optional(Box::new(inner.to_type())),
            TypeRepr::Fallible(ok, err) => Type::Fallible(Box::new(ok.to_type()), Box::new(err.to_type())),
            TypeRepr::Named { path, generics } => Type::Named {
                path: path.clone(),
                generics: generics.iter().map(TypeRepr::to_type).collect(),
            },
            TypeRepr::Shared(inner) => Type::Shared(Box::new(inner.to_type())),
            TypeRepr::Guarded(inner) => Type::Guarded(Box::new(inner.to_type())),
        }
    }
}

/// A Cargo dependency a stub expansion pulls into the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildRequirement {
    /// Crate name as it appears under `[dependencies]`
    #[serde(rename = "crate")]
    pub crate_name: String,
    pub version: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl BuildRequirement {
    pub fn new(crate_name: impl Into<String>, version: impl Into<String>, features: &[&str]) -> Self {
        Self {
            crate_name: crate_name.into(),
            version: version.into(),
            features: features.iter().map(|feature| feature.to_string()).collect(),
        }
    }
}

/// Declared passing form of a stub argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgForm {
    Value,
    Borrow,
    BorrowMut,
}

/// A stubbed function or method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StubCallable {
    /// Parameter types; a `{"named": {"path": "Future"}}` parameter accepts
    /// an un-awaited async call (the `spawn` case)
    #[serde(default)]
    pub params: Vec<TypeRepr>,
    #[serde(default = "TypeRepr::unit")]
    pub returns: TypeRepr,
    #[serde(default)]
    pub is_async: bool,
    /// Rust replacement with `{self}` / `{argN}` placeholders
    pub template: String,
    /// `use` lines (without the keyword) the expansion needs
    #[serde(default)]
    pub imports: Vec<String>,
    /// Cargo dependency the expansion needs
    #[serde(default)]
    pub requires: Option<BuildRequirement>,
    /// Per-argument passing forms; missing entries default to `Value`
    #[serde(default)]
    pub arg_forms: Vec<ArgForm>,
    /// The receiver needs exclusive (`&mut`) access
    #[serde(default)]
    pub exclusive_receiver: bool,
}

impl TypeRepr {
    fn unit() -> TypeRepr {
        TypeRepr::Unit
    }
}

/// One stub package: a named set of types, functions and methods.
///
/// Method keys are `Receiver.method`, matching the receiver's nominal path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StubPackage {
    pub name: String,
    #[serde(default)]
    pub types: IndexMap<String, TypeRepr>,
    #[serde(default)]
    pub functions: IndexMap<String, StubCallable>,
    #[serde(default)]
    pub methods: IndexMap<String, StubCallable>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{StubPackage, TypeRepr};

    #[test]
    fn package_round_trips_through_json() {
        let source = r#"{
            "name": "demo-stubs",
            "types": {
                "Sender": { "named": { "path": "Sender" } }
            },
            "functions": {
                "mpsc_channel": {
                    "params": ["int"],
                    "returns": { "tuple": [ { "named": { "path": "Sender" } }, { "named": { "path": "Receiver" } } ] },
                    "template": "mpsc::channel({arg0} as usize)",
                    "imports": ["tokio::sync::mpsc"],
                    "requires": { "crate": "tokio", "version": "1", "features": ["full"] }
                }
            },
            "methods": {
                "Receiver.recv": {
                    "returns": { "optional": { "named": { "path": "T" } } },
                    "is_async": true,
                    "template": "{self}.recv()",
                    "exclusive_receiver": true
                }
            }
        }"#;

        let package: StubPackage = serde_json::from_str(source).unwrap();
        assert_eq!(package.name, "demo-stubs");
        let channel = package.functions.get("mpsc_channel").unwrap();
        assert_eq!(channel.params, vec![TypeRepr::Int]);
        assert_eq!(channel.requires.as_ref().unwrap().crate_name, "tokio");
        let recv = package.methods.get("Receiver.recv").unwrap();
        assert!(recv.is_async);
        assert!(recv.exclusive_receiver);

        let serialized = serde_json::to_string(&package).unwrap();
        let reparsed: StubPackage = serde_json::from_str(&serialized).unwrap();
        assert_eq!(reparsed, package);
    }

    #[test]
    fn type_repr_converts_to_tir_types() {
        use crate::tir::Type;
        let repr: TypeRepr = serde_json::from_str(r#"{ "map": ["str", { "seq": "int" }] }"#).unwrap();
        assert_eq!(
            repr.to_type(),
            Type::Mapping(Box::new(Type::String), Box::new(Type::Sequence(Box::new(Type::Int))))
        );
    }
}
