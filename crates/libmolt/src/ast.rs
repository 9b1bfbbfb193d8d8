//! Surface AST for the annotated Python subset.
//!
//! The parser produces these nodes; the TIR builder consumes them. Every
//! node keeps the byte range it was parsed from so later stages can report
//! precise locations. String contents are owned: escape processing during
//! lexing already detached them from the source text.

use std::ops::Range;

use strum_macros::EnumIs;

use crate::file::SourceFile;

/// An identifier with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub position: Range<usize>,
}

impl Ident {
    pub fn new(name: impl Into<String>, position: Range<usize>) -> Self {
        Self { name: name.into(), position }
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// A parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleAst {
    pub file: SourceFile,
    pub items: Vec<ItemAst>,
}

/// Top-level items of a module.
#[derive(Debug, Clone, PartialEq, EnumIs)]
pub enum ItemAst {
    Function(FunctionAst),
    Class(ClassAst),
    Constant(ConstantAst),
    Import(ImportAst),
    /// A bare top-level statement, e.g. the `asyncio.run(main())` idiom
    Statement(StatementAst),
}

/// A function or method definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionAst {
    pub name: Ident,
    pub params: Vec<ParamAst>,
    pub ret: Option<TypeAst>,
    pub body: Vec<StatementAst>,
    pub is_async: bool,
    /// Pass-through attribute comments lifted onto this definition
    pub attributes: Vec<String>,
    pub position: Range<usize>,
}

/// A single parameter, annotation optional at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamAst {
    pub name: Ident,
    pub annotation: Option<TypeAst>,
    pub default: Option<ExpressionAst>,
}

/// A class definition.
///
/// `fields` are the annotated class-level attributes; `methods` the `def`s
/// in the class body. The `@dataclass` marker sets `is_dataclass` and is the
/// only decorator the subset accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassAst {
    pub name: Ident,
    pub bases: Vec<Ident>,
    pub is_dataclass: bool,
    pub fields: Vec<FieldAst>,
    pub methods: Vec<FunctionAst>,
    pub attributes: Vec<String>,
    pub position: Range<usize>,
}

/// An annotated class attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAst {
    pub name: Ident,
    pub annotation: TypeAst,
    pub default: Option<ExpressionAst>,
    pub attributes: Vec<String>,
}

/// A top-level constant binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantAst {
    pub name: Ident,
    pub annotation: Option<TypeAst>,
    pub value: ExpressionAst,
    pub position: Range<usize>,
}

/// `import module` or `from module import a, b`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportAst {
    pub module: Ident,
    /// Imported names; empty for a whole-module import
    pub names: Vec<Ident>,
    pub position: Range<usize>,
}

/// A type annotation as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAst {
    pub kind: TypeAstKind,
    pub position: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeAstKind {
    /// `int`, `str`, `MyClass`, `None`, …
    Name(String),
    /// `list[int]`, `dict[str, int]`, `Result[int, str]`, …
    Generic { base: String, args: Vec<TypeAst> },
    /// `T | None`
    Union(Vec<TypeAst>),
}

/// A statement with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementAst {
    pub kind: StatementAstKind,
    pub position: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, EnumIs)]
pub enum StatementAstKind {
    /// `target = value`, possibly annotated; first assignment introduces
    /// the binding, later ones reassign
    Assign {
        target: TargetAst,
        annotation: Option<TypeAst>,
        value: ExpressionAst,
    },
    /// `target op= value`
    AugAssign {
        target: TargetAst,
        op: BinaryOperator,
        value: ExpressionAst,
    },
    Expression(ExpressionAst),
    Return(Option<ExpressionAst>),
    If {
        /// `(condition, body)` for the `if` and each `elif`
        branches: Vec<(ExpressionAst, Vec<StatementAst>)>,
        else_body: Option<Vec<StatementAst>>,
    },
    While {
        condition: ExpressionAst,
        body: Vec<StatementAst>,
    },
    For {
        target: TargetAst,
        iterable: ExpressionAst,
        body: Vec<StatementAst>,
    },
    /// `with resource as binding:` for the supported scoped resources
    With {
        resource: ExpressionAst,
        binding: Option<Ident>,
        body: Vec<StatementAst>,
    },
    Break,
    Continue,
    Pass,
}

/// Assignment / loop targets.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetAst {
    Name(Ident),
    Tuple(Vec<TargetAst>),
    Attribute { object: Box<ExpressionAst>, field: Ident },
    Index { object: Box<ExpressionAst>, index: Box<ExpressionAst> },
}

impl TargetAst {
    pub fn position(&self) -> Range<usize> {
        match self {
            TargetAst::Name(ident) => ident.position.clone(),
            TargetAst::Tuple(items) => {
                let start = items.first().map(|item| item.position().start).unwrap_or(0);
                let end = items.last().map(|item| item.position().end).unwrap_or(start);
                start..end
            }
            TargetAst::Attribute { object, field } => object.position.start..field.position.end,
            TargetAst::Index { object, index } => object.position.start..index.position.end,
        }
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl BinaryOperator {
    /// The Rust spelling of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::FloorDiv => "/",
            BinaryOperator::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOperator {
    And,
    Or,
}

/// Comparison operators; `Is`/`IsNot` are only accepted against `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Is,
    IsNot,
}

impl CompareOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOperator::Eq => "==",
            CompareOperator::NotEq => "!=",
            CompareOperator::Lt => "<",
            CompareOperator::LtEq => "<=",
            CompareOperator::Gt => ">",
            CompareOperator::GtEq => ">=",
            CompareOperator::Is => "is",
            CompareOperator::IsNot => "is not",
        }
    }
}

/// An expression with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionAst {
    pub kind: ExpressionAstKind,
    pub position: Range<usize>,
}

impl ExpressionAst {
    pub fn new(kind: ExpressionAstKind, position: Range<usize>) -> Self {
        Self { kind, position }
    }
}

/// One part of an f-string after interpolation parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPartAst {
    Literal(String),
    Interpolation {
        expression: ExpressionAst,
        /// Format specifier, preserved verbatim
        spec: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, EnumIs)]
pub enum ExpressionAstKind {
    Integer(i64),
    Float(f64),
    Str(String),
    FString(Vec<FStringPartAst>),
    Bool(bool),
    NoneLiteral,
    Name(String),
    Call {
        function: Box<ExpressionAst>,
        args: Vec<ExpressionAst>,
    },
    Attribute {
        object: Box<ExpressionAst>,
        field: Ident,
    },
    Subscript {
        object: Box<ExpressionAst>,
        index: Box<ExpressionAst>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<ExpressionAst>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<ExpressionAst>,
        right: Box<ExpressionAst>,
    },
    BoolOp {
        op: BoolOperator,
        left: Box<ExpressionAst>,
        right: Box<ExpressionAst>,
    },
    Compare {
        op: CompareOperator,
        left: Box<ExpressionAst>,
        right: Box<ExpressionAst>,
    },
    /// `item in container` / `item not in container`
    Membership {
        negated: bool,
        item: Box<ExpressionAst>,
        container: Box<ExpressionAst>,
    },
    /// `then_value if condition else else_value`
    Conditional {
        condition: Box<ExpressionAst>,
        then_value: Box<ExpressionAst>,
        else_value: Box<ExpressionAst>,
    },
    Tuple(Vec<ExpressionAst>),
    List(Vec<ExpressionAst>),
    Dict(Vec<(ExpressionAst, ExpressionAst)>),
    SetDisplay(Vec<ExpressionAst>),
    Await(Box<ExpressionAst>),
    /// Single-clause comprehension: `[element for variable in iterable if condition]`
    Comprehension {
        element: Box<ExpressionAst>,
        variable: Ident,
        iterable: Box<ExpressionAst>,
        condition: Option<Box<ExpressionAst>>,
    },
}
