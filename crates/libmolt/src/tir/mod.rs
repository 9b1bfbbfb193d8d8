//! Typed intermediate representation (TIR).
//!
//! The TIR sits between the surface AST and the Rust emitter. The
//! [`builder`] lowers a parsed module into these nodes, assigning every
//! statement and expression a [`NodeId`]; the [`analyzer`] then walks the
//! tree bottom-up and records everything it learns in side tables keyed by
//! those ids (see [`annotations`]). TIR nodes are never mutated after the
//! builder produces them.
//!
//! Lowering already performed by the builder:
//! - augmented assignments are plain assignments of a binary operation,
//! - `len(x)` and `range(a, b)` are distinguished nodes,
//! - `Arc(x)` / `Mutex(x)` become the shared / guarded constructors,
//! - dataclasses carry a synthetic constructor description,
//! - calls through imported modules are resolved to dotted paths.

use std::ops::Range;

use crate::file::SourceFile;

pub mod analyzer;
pub mod annotations;
pub mod builder;
pub mod types;

pub use types::Type;

/// Identity of a TIR node, the key of every annotation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Placeholder id for nodes synthesized outside the builder.
    pub const SYNTHETIC: NodeId = NodeId(usize::MAX);
}

/// A lowered module.
#[derive(Debug, Clone)]
pub struct TirModule {
    /// Module name (last path component)
    pub name: String,
    /// Dotted module path relative to the input root
    pub path: String,
    pub file: SourceFile,
    pub imports: Vec<TirImport>,
    pub constants: Vec<TirConstant>,
    pub classes: Vec<TirClass>,
    pub functions: Vec<TirFunction>,
    /// Bare top-level statements (e.g. the `asyncio.run(main())` idiom)
    pub top_level: Vec<TirStatement>,
}

impl TirModule {
    /// Whether this module defines the program entry point.
    pub fn is_entry(&self) -> bool {
        self.functions.iter().any(|function| function.name == "main")
    }
}

/// `import module` / `from module import name, …`
#[derive(Debug, Clone)]
pub struct TirImport {
    pub id: NodeId,
    pub module: String,
    pub names: Vec<String>,
    pub position: Range<usize>,
}

/// A top-level constant, emitted as a static item.
#[derive(Debug, Clone)]
pub struct TirConstant {
    pub id: NodeId,
    pub name: String,
    pub declared: Option<Type>,
    pub value: TirExpression,
    pub position: Range<usize>,
}

/// A function or method.
#[derive(Debug, Clone)]
pub struct TirFunction {
    pub id: NodeId,
    pub name: String,
    pub is_async: bool,
    pub params: Vec<TirParam>,
    /// Declared return type; `None` when the annotation is missing
    pub ret: Option<Type>,
    pub body: Vec<TirStatement>,
    /// Pass-through attributes emitted verbatim above the item
    pub attributes: Vec<String>,
    /// True for methods taking `self`
    pub has_receiver: bool,
    pub position: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct TirParam {
    pub id: NodeId,
    pub name: String,
    /// Declared type; `None` when the annotation is missing
    pub ty: Option<Type>,
    pub default: Option<TirExpression>,
    pub position: Range<usize>,
}

/// A class lowered to a record plus associated functions.
#[derive(Debug, Clone)]
pub struct TirClass {
    pub id: NodeId,
    pub name: String,
    pub is_dataclass: bool,
    /// Base-class names; inheritance is rejected by the analyzer
    pub bases: Vec<String>,
    pub fields: Vec<TirField>,
    /// `__init__` lowered to the `new` constructor, when present
    pub constructor: Option<TirFunction>,
    pub methods: Vec<TirFunction>,
    pub attributes: Vec<String>,
    pub position: Range<usize>,
}

#[derive(Debug, Clone)]
pub struct TirField {
    pub id: NodeId,
    pub name: String,
    pub ty: Type,
    pub default: Option<TirExpression>,
    pub attributes: Vec<String>,
    pub position: Range<usize>,
}

/// A statement with its node identity.
#[derive(Debug, Clone)]
pub struct TirStatement {
    pub id: NodeId,
    pub kind: TirStatementKind,
    pub position: Range<usize>,
}

#[derive(Debug, Clone)]
pub enum TirStatementKind {
    /// Binding or reassignment; the analyzer decides which
    Assign {
        target: TirTarget,
        declared: Option<Type>,
        value: TirExpression,
    },
    Expression(TirExpression),
    Return(Option<TirExpression>),
    If {
        branches: Vec<(TirExpression, Vec<TirStatement>)>,
        else_body: Option<Vec<TirStatement>>,
    },
    While {
        condition: TirExpression,
        body: Vec<TirStatement>,
    },
    For {
        target: TirTarget,
        iterable: TirExpression,
        body: Vec<TirStatement>,
    },
    /// `with resource as binding:` lowered to a lexical block
    Scoped {
        resource: TirExpression,
        binding: Option<String>,
        body: Vec<TirStatement>,
    },
    Break,
    Continue,
    Pass,
}

/// Assignment and loop targets.
#[derive(Debug, Clone)]
pub enum TirTarget {
    Name {
        id: NodeId,
        name: String,
        position: Range<usize>,
    },
    Tuple(Vec<TirTarget>),
    Attribute {
        object: TirExpression,
        field: String,
    },
    Index {
        object: TirExpression,
        index: TirExpression,
    },
}

/// An expression with its node identity.
#[derive(Debug, Clone)]
pub struct TirExpression {
    pub id: NodeId,
    pub kind: TirExpressionKind,
    pub position: Range<usize>,
}

/// What a call applies to.
#[derive(Debug, Clone)]
pub enum TirCallee {
    /// A free function or dotted external path (`greet`, `asyncio.sleep`)
    Function { path: String, position: Range<usize> },
    /// A method on an explicit receiver
    Method {
        receiver: Box<TirExpression>,
        name: String,
        position: Range<usize>,
    },
}

#[derive(Debug, Clone)]
pub enum TirExpressionKind {
    Integer(i64),
    Float(f64),
    /// `owned` marks boundary positions where the literal becomes a `String`
    StringLiteral { value: String, owned: bool },
    FString(Vec<TirFStringPart>),
    Bool(bool),
    NoneLiteral,
    Name(String),
    Call {
        callee: TirCallee,
        args: Vec<TirExpression>,
    },
    Attribute {
        object: Box<TirExpression>,
        field: String,
    },
    Index {
        object: Box<TirExpression>,
        index: Box<TirExpression>,
    },
    Unary {
        op: crate::ast::UnaryOperator,
        operand: Box<TirExpression>,
    },
    Binary {
        op: crate::ast::BinaryOperator,
        left: Box<TirExpression>,
        right: Box<TirExpression>,
    },
    BoolOp {
        op: crate::ast::BoolOperator,
        left: Box<TirExpression>,
        right: Box<TirExpression>,
    },
    Compare {
        op: crate::ast::CompareOperator,
        left: Box<TirExpression>,
        right: Box<TirExpression>,
    },
    Membership {
        negated: bool,
        item: Box<TirExpression>,
        container: Box<TirExpression>,
    },
    Conditional {
        condition: Box<TirExpression>,
        then_value: Box<TirExpression>,
        else_value: Box<TirExpression>,
    },
    Tuple(Vec<TirExpression>),
    List(Vec<TirExpression>),
    Dict(Vec<(TirExpression, TirExpression)>),
    SetDisplay(Vec<TirExpression>),
    Await(Box<TirExpression>),
    /// `len(x)`, kept distinct for the usize-cast comparison rule
    Len(Box<TirExpression>),
    /// `range(start, end)`; `start` is zero when absent in the source
    RangeLiteral {
        start: Box<TirExpression>,
        end: Box<TirExpression>,
    },
    /// `Arc(x)`
    SharedNew(Box<TirExpression>),
    /// `Mutex(x)`
    GuardedNew(Box<TirExpression>),
    /// `Ok(x)` / `Err(x)`
    ResultLiteral {
        is_ok: bool,
        value: Box<TirExpression>,
    },
    Comprehension {
        element: Box<TirExpression>,
        variable: String,
        iterable: Box<TirExpression>,
        condition: Option<Box<TirExpression>>,
    },
}

#[derive(Debug, Clone)]
pub enum TirFStringPart {
    Literal(String),
    Interpolation {
        expression: TirExpression,
        spec: Option<String>,
    },
}
