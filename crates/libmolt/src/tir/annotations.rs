//! Annotation tables written by the semantic analyzer.
//!
//! TIR nodes stay immutable after building; everything the analyzer learns
//! lives here, keyed by [`NodeId`]. The emitter only ever reads these
//! tables, which is what makes emission idempotent.

use indexmap::{IndexMap, IndexSet};

use crate::stubs::package::BuildRequirement;
use crate::tir::{NodeId, Type};

/// How an argument is passed at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentMode {
    /// Pass as-is
    Value,
    /// Shared borrow (`&x`)
    Borrow,
    /// Exclusive borrow (`&mut x`)
    BorrowMut,
    /// Clone at the call site (`x.clone()`) so the local stays usable
    CloneValue,
    /// String literal promoted to owned (`"...".to_string()`)
    ToOwned,
}

/// A stub resolution captured for the emitter.
#[derive(Debug, Clone)]
pub struct ResolvedStub {
    /// The Rust template with `{self}` / `{argN}` placeholders
    pub template: String,
    /// Imports the expansion needs in its module
    pub imports: Vec<String>,
    /// Cargo dependency the expansion needs in the manifest
    pub requirement: Option<BuildRequirement>,
    /// Whether the call must be awaited
    pub is_async: bool,
    /// The receiver needs exclusive access
    pub exclusive_receiver: bool,
}

/// Facts about one binding introduced by an assignment statement.
#[derive(Debug, Clone)]
pub struct BindingInfo {
    pub name: String,
    pub ty: Type,
    /// Set when a later statement reassigns or mutates the local
    pub mutable: bool,
    /// Render the type annotation in the emitted `let`
    pub annotated: bool,
}

/// Everything the analyzer records about a program.
///
/// One instance covers all modules of an invocation.
#[derive(Debug, Default)]
pub struct Annotations {
    /// Inferred type of every expression
    pub types: IndexMap<NodeId, Type>,
    /// Assignment statements that introduce a binding, with its facts.
    /// Assignments absent from this map are reassignments.
    pub bindings: IndexMap<NodeId, BindingInfo>,
    /// Name targets inside tuple destructurings and `for` loops that
    /// introduce bindings, keyed by the target's id
    pub target_bindings: IndexMap<NodeId, BindingInfo>,
    /// Parameters reassigned in their function body (`mut` in the signature)
    pub mutable_params: IndexSet<NodeId>,
    /// Subscript expressions whose index needs an `as usize` cast
    pub index_casts: IndexSet<NodeId>,
    /// Integer-typed operands compared against `len(..)`, cast to `usize`
    pub usize_casts: IndexSet<NodeId>,
    /// Call expressions lowered with the `?` propagation operator
    pub propagations: IndexSet<NodeId>,
    /// Argument passing modes, keyed by argument expression id
    pub argument_modes: IndexMap<NodeId, ArgumentMode>,
    /// Calls resolved through the stub registry
    pub stub_calls: IndexMap<NodeId, ResolvedStub>,
    /// Methods that need `&mut self` (function ids)
    pub exclusive_methods: IndexSet<NodeId>,
    /// For-loop statements iterating a sequence by reference
    pub borrowed_iterations: IndexSet<NodeId>,
    /// The entry module's `main` is async (attach `#[tokio::main]`)
    pub async_main: bool,
    /// A pass-through attribute already supplies the entry attribute
    pub entry_attribute_supplied: bool,
}

impl Annotations {
    /// Type of an expression node; `Unknown` if never recorded.
    pub fn type_of(&self, id: NodeId) -> Type {
        self.types.get(&id).cloned().unwrap_or(Type::Unknown)
    }

    /// Whether the assignment statement introduces a binding.
    pub fn is_binding(&self, id: NodeId) -> bool {
        self.bindings.contains_key(&id)
    }

    pub fn binding(&self, id: NodeId) -> Option<&BindingInfo> {
        self.bindings.get(&id)
    }
}
