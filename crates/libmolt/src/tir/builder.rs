//! Lowering from the surface AST to TIR.
//!
//! The builder is purely structural: it assigns node ids, rewrites sugar
//! (augmented assignment, `len`/`range`/`Arc`/`Mutex`/`Ok`/`Err` calls,
//! module-qualified call paths), canonicalizes string literals at ownership
//! boundaries and converts annotations into the TIR type universe. Anything
//! requiring symbol or type knowledge is left to the analyzer; the only
//! diagnostics raised here are for annotation forms the subset cannot
//! express.

use crate::ast::{
    BinaryOperator, ClassAst, ConstantAst, ExpressionAst, ExpressionAstKind, FStringPartAst, FunctionAst, ImportAst,
    ItemAst, ModuleAst, StatementAst, StatementAstKind, TargetAst, TypeAst, TypeAstKind,
};
use crate::error::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::file::SourceFile;
use indexmap::IndexSet;

use super::{
    NodeId, TirCallee, TirClass, TirConstant, TirExpression, TirExpressionKind, TirField, TirFStringPart, TirFunction,
    TirImport, TirModule, TirParam, TirStatement, TirStatementKind, TirTarget, Type,
};

/// Lowers one parsed module.
pub fn lower_module(ast: &ModuleAst, counter: &mut usize) -> (TirModule, Diagnostics) {
    let mut builder = Builder {
        file: ast.file.clone(),
        counter,
        module_imports: IndexSet::new(),
        diagnostics: Diagnostics::default(),
    };
    let module = builder.lower(ast);
    (module, builder.diagnostics)
}

struct Builder<'c> {
    file: SourceFile,
    counter: &'c mut usize,
    /// Whole-module imports (`import asyncio`), used to turn attribute
    /// calls on them into dotted function paths
    module_imports: IndexSet<String>,
    diagnostics: Diagnostics,
}

impl Builder<'_> {
    fn next_id(&mut self) -> NodeId {
        let id = NodeId(*self.counter);
        *self.counter += 1;
        id
    }

    fn unsupported(&mut self, position: std::ops::Range<usize>, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::new(DiagnosticKind::UnsupportedConstruct, self.file.clone(), position, message));
    }

    fn lower(&mut self, ast: &ModuleAst) -> TirModule {
        let mut imports = Vec::new();
        let mut constants = Vec::new();
        let mut classes = Vec::new();
        let mut functions = Vec::new();
        let mut top_level = Vec::new();

        // collect module imports first so any item can call through them
        for item in &ast.items {
            if let ItemAst::Import(import) = item {
                if import.names.is_empty() {
                    self.module_imports.insert(import.module.name.clone());
                }
            }
        }

        for item in &ast.items {
            match item {
                ItemAst::Import(import) => imports.push(self.lower_import(import)),
                ItemAst::Constant(constant) => constants.push(self.lower_constant(constant)),
                ItemAst::Class(class) => classes.push(self.lower_class(class)),
                ItemAst::Function(function) => functions.push(self.lower_function(function, false)),
                ItemAst::Statement(statement) => top_level.push(self.lower_statement(statement)),
            }
        }

        TirModule {
            name: ast.file.module_name().to_string(),
            path: ast.file.module_path(),
            file: ast.file.clone(),
            imports,
            constants,
            classes,
            functions,
            top_level,
        }
    }

    fn lower_import(&mut self, import: &ImportAst) -> TirImport {
        TirImport {
            id: self.next_id(),
            module: import.module.name.clone(),
            names: import.names.iter().map(|name| name.name.clone()).collect(),
            position: import.position.clone(),
        }
    }

    fn lower_constant(&mut self, constant: &ConstantAst) -> TirConstant {
        let declared = constant.annotation.as_ref().map(|annotation| self.lower_type(annotation));
        TirConstant {
            id: self.next_id(),
            name: constant.name.name.clone(),
            declared,
            value: self.lower_expression(&constant.value, true),
            position: constant.position.clone(),
        }
    }

    fn lower_class(&mut self, class: &ClassAst) -> TirClass {
        let id = self.next_id();
        let fields = class
            .fields
            .iter()
            .map(|field| TirField {
                id: self.next_id(),
                name: field.name.name.clone(),
                ty: self.lower_type(&field.annotation),
                default: field.default.as_ref().map(|default| self.lower_expression(default, true)),
                attributes: field.attributes.clone(),
                position: field.name.position.clone(),
            })
            .collect();

        let mut constructor = None;
        let mut methods = Vec::new();
        for method in &class.methods {
            if method.name.name == "__init__" {
                let mut lowered = self.lower_function(method, true);
                lowered.name = "new".to_string();
                constructor = Some(lowered);
            } else {
                methods.push(self.lower_function(method, true));
            }
        }

        TirClass {
            id,
            name: class.name.name.clone(),
            is_dataclass: class.is_dataclass,
            bases: class.bases.iter().map(|base| base.name.clone()).collect(),
            fields,
            constructor,
            methods,
            attributes: class.attributes.clone(),
            position: class.position.clone(),
        }
    }

    fn lower_function(&mut self, function: &FunctionAst, in_class: bool) -> TirFunction {
        let id = self.next_id();
        let has_receiver = in_class && function.params.first().map(|param| param.name.name == "self").unwrap_or(false);

        let params = function
            .params
            .iter()
            .skip(if has_receiver { 1 } else { 0 })
            .map(|param| TirParam {
                id: self.next_id(),
                name: param.name.name.clone(),
                ty: param.annotation.as_ref().map(|annotation| self.lower_type(annotation)),
                default: param.default.as_ref().map(|default| self.lower_expression(default, true)),
                position: param.name.position.clone(),
            })
            .collect();

        let ret = function.ret.as_ref().map(|annotation| self.lower_type(annotation));
        let body = function.body.iter().map(|statement| self.lower_statement(statement)).collect();

        TirFunction {
            id,
            name: function.name.name.clone(),
            is_async: function.is_async,
            params,
            ret,
            body,
            attributes: function.attributes.clone(),
            has_receiver,
            position: function.position.clone(),
        }
    }

    // --- statements --------------------------------------------------------

    fn lower_statement(&mut self, statement: &StatementAst) -> TirStatement {
        let id = self.next_id();
        let kind = match &statement.kind {
            StatementAstKind::Assign { target, annotation, value } => TirStatementKind::Assign {
                target: self.lower_target(target),
                declared: annotation.as_ref().map(|annotation| self.lower_type(annotation)),
                value: self.lower_expression(value, true),
            },
            StatementAstKind::AugAssign { target, op, value } => {
                // `x += v` is plain `x = x + v` in TIR
                let left = self.target_as_expression(target);
                let right = self.lower_expression(value, false);
                let position = statement.position.clone();
                let value = TirExpression {
                    id: self.next_id(),
                    kind: TirExpressionKind::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                    position,
                };
                TirStatementKind::Assign {
                    target: self.lower_target(target),
                    declared: None,
                    value,
                }
            }
            StatementAstKind::Expression(expression) => {
                TirStatementKind::Expression(self.lower_expression(expression, false))
            }
            StatementAstKind::Return(value) => {
                TirStatementKind::Return(value.as_ref().map(|value| self.lower_expression(value, true)))
            }
            StatementAstKind::If { branches, else_body } => TirStatementKind::If {
                branches: branches
                    .iter()
                    .map(|(condition, body)| {
                        (
                            self.lower_expression(condition, false),
                            body.iter().map(|statement| self.lower_statement(statement)).collect(),
                        )
                    })
                    .collect(),
                else_body: else_body
                    .as_ref()
                    .map(|body| body.iter().map(|statement| self.lower_statement(statement)).collect()),
            },
            StatementAstKind::While { condition, body } => TirStatementKind::While {
                condition: self.lower_expression(condition, false),
                body: body.iter().map(|statement| self.lower_statement(statement)).collect(),
            },
            StatementAstKind::For { target, iterable, body } => TirStatementKind::For {
                target: self.lower_target(target),
                iterable: self.lower_expression(iterable, false),
                body: body.iter().map(|statement| self.lower_statement(statement)).collect(),
            },
            StatementAstKind::With { resource, binding, body } => TirStatementKind::Scoped {
                resource: self.lower_expression(resource, false),
                binding: binding.as_ref().map(|ident| ident.name.clone()),
                body: body.iter().map(|statement| self.lower_statement(statement)).collect(),
            },
            StatementAstKind::Break => TirStatementKind::Break,
            StatementAstKind::Continue => TirStatementKind::Continue,
            StatementAstKind::Pass => TirStatementKind::Pass,
        };
        TirStatement {
            id,
            kind,
            position: statement.position.clone(),
        }
    }

    fn lower_target(&mut self, target: &TargetAst) -> TirTarget {
        match target {
            TargetAst::Name(ident) => TirTarget::Name {
                id: self.next_id(),
                name: ident.name.clone(),
                position: ident.position.clone(),
            },
            TargetAst::Tuple(items) => TirTarget::Tuple(items.iter().map(|item| self.lower_target(item)).collect()),
            TargetAst::Attribute { object, field } => TirTarget::Attribute {
                object: self.lower_expression(object, false),
                field: field.name.clone(),
            },
            TargetAst::Index { object, index } => TirTarget::Index {
                object: self.lower_expression(object, false),
                index: self.lower_expression(index, false),
            },
        }
    }

    fn target_as_expression(&mut self, target: &TargetAst) -> TirExpression {
        let id = self.next_id();
        match target {
            TargetAst::Name(ident) => TirExpression {
                id,
                kind: TirExpressionKind::Name(ident.name.clone()),
                position: ident.position.clone(),
            },
            TargetAst::Attribute { object, field } => TirExpression {
                id,
                kind: TirExpressionKind::Attribute {
                    object: Box::new(self.lower_expression(object, false)),
                    field: field.name.clone(),
                },
                position: target.position(),
            },
            TargetAst::Index { object, index } => TirExpression {
                id,
                kind: TirExpressionKind::Index {
                    object: Box::new(self.lower_expression(object, false)),
                    index: Box::new(self.lower_expression(index, false)),
                },
                position: target.position(),
            },
            TargetAst::Tuple(_) => {
                self.unsupported(target.position(), "augmented assignment to a tuple is outside the supported subset");
                TirExpression {
                    id,
                    kind: TirExpressionKind::NoneLiteral,
                    position: target.position(),
                }
            }
        }
    }

    // --- expressions -------------------------------------------------------

    /// Lowers an expression.
    ///
    /// `owned` is true at ownership boundaries (arguments, returns, binding
    /// values, container elements); string literals there become owned
    /// strings, everywhere else they stay slices.
    fn lower_expression(&mut self, expression: &ExpressionAst, owned: bool) -> TirExpression {
        let id = self.next_id();
        let position = expression.position.clone();
        let kind = match &expression.kind {
            ExpressionAstKind::Integer(value) => TirExpressionKind::Integer(*value),
            ExpressionAstKind::Float(value) => TirExpressionKind::Float(*value),
            ExpressionAstKind::Str(value) => TirExpressionKind::StringLiteral {
                value: value.clone(),
                owned,
            },
            ExpressionAstKind::Bool(value) => TirExpressionKind::Bool(*value),
            ExpressionAstKind::NoneLiteral => TirExpressionKind::NoneLiteral,
            ExpressionAstKind::Name(name) => TirExpressionKind::Name(name.clone()),
            ExpressionAstKind::FString(parts) => TirExpressionKind::FString(
                parts
                    .iter()
                    .map(|part| match part {
                        FStringPartAst::Literal(text) => TirFStringPart::Literal(text.clone()),
                        FStringPartAst::Interpolation { expression, spec } => TirFStringPart::Interpolation {
                            expression: self.lower_expression(expression, false),
                            spec: spec.clone(),
                        },
                    })
                    .collect(),
            ),
            ExpressionAstKind::Call { function, args } => return self.lower_call(id, function, args, position),
            ExpressionAstKind::Attribute { object, field } => TirExpressionKind::Attribute {
                object: Box::new(self.lower_expression(object, false)),
                field: field.name.clone(),
            },
            ExpressionAstKind::Subscript { object, index } => TirExpressionKind::Index {
                object: Box::new(self.lower_expression(object, false)),
                index: Box::new(self.lower_expression(index, false)),
            },
            ExpressionAstKind::Unary { op, operand } => TirExpressionKind::Unary {
                op: *op,
                operand: Box::new(self.lower_expression(operand, false)),
            },
            ExpressionAstKind::Binary { op, left, right } => TirExpressionKind::Binary {
                op: *op,
                left: Box::new(self.lower_expression(left, false)),
                right: Box::new(self.lower_expression(right, false)),
            },
            ExpressionAstKind::BoolOp { op, left, right } => TirExpressionKind::BoolOp {
                op: *op,
                left: Box::new(self.lower_expression(left, false)),
                right: Box::new(self.lower_expression(right, false)),
            },
            ExpressionAstKind::Compare { op, left, right } => TirExpressionKind::Compare {
                op: *op,
                left: Box::new(self.lower_expression(left, false)),
                right: Box::new(self.lower_expression(right, false)),
            },
            ExpressionAstKind::Membership { negated, item, container } => TirExpressionKind::Membership {
                negated: *negated,
                item: Box::new(self.lower_expression(item, false)),
                container: Box::new(self.lower_expression(container, false)),
            },
            ExpressionAstKind::Conditional {
                condition,
                then_value,
                else_value,
            } => TirExpressionKind::Conditional {
                condition: Box::new(self.lower_expression(condition, false)),
                then_value: Box::new(self.lower_expression(then_value, owned)),
                else_value: Box::new(self.lower_expression(else_value, owned)),
            },
            ExpressionAstKind::Tuple(items) => {
                TirExpressionKind::Tuple(items.iter().map(|item| self.lower_expression(item, true)).collect())
            }
            ExpressionAstKind::List(items) => {
                TirExpressionKind::List(items.iter().map(|item| self.lower_expression(item, true)).collect())
            }
            ExpressionAstKind::Dict(entries) => TirExpressionKind::Dict(
                entries
                    .iter()
                    .map(|(key, value)| (self.lower_expression(key, true), self.lower_expression(value, true)))
                    .collect(),
            ),
            ExpressionAstKind::SetDisplay(items) => {
                TirExpressionKind::SetDisplay(items.iter().map(|item| self.lower_expression(item, true)).collect())
            }
            ExpressionAstKind::Await(inner) => {
                TirExpressionKind::Await(Box::new(self.lower_expression(inner, false)))
            }
            ExpressionAstKind::Comprehension {
                element,
                variable,
                iterable,
                condition,
            } => TirExpressionKind::Comprehension {
                element: Box::new(self.lower_expression(element, true)),
                variable: variable.name.clone(),
                iterable: Box::new(self.lower_expression(iterable, false)),
                condition: condition
                    .as_ref()
                    .map(|condition| Box::new(self.lower_expression(condition, false))),
            },
        };
        TirExpression { id, kind, position }
    }

    /// Lowers a call, recognizing the distinguished builtins.
    fn lower_call(
        &mut self,
        id: NodeId,
        function: &ExpressionAst,
        args: &[ExpressionAst],
        position: std::ops::Range<usize>,
    ) -> TirExpression {
        let kind = match &function.kind {
            ExpressionAstKind::Name(name) => match (name.as_str(), args.len()) {
                ("len", 1) => TirExpressionKind::Len(Box::new(self.lower_expression(&args[0], false))),
                ("range", 1) => {
                    let end = self.lower_expression(&args[0], false);
                    let start = TirExpression {
                        id: self.next_id(),
                        kind: TirExpressionKind::Integer(0),
                        position: position.start..position.start,
                    };
                    TirExpressionKind::RangeLiteral {
                        start: Box::new(start),
                        end: Box::new(end),
                    }
                }
                ("range", 2) => TirExpressionKind::RangeLiteral {
                    start: Box::new(self.lower_expression(&args[0], false)),
                    end: Box::new(self.lower_expression(&args[1], false)),
                },
                ("range", _) => {
                    self.unsupported(position.clone(), "'range' with a step is outside the supported subset");
                    TirExpressionKind::NoneLiteral
                }
                ("Arc", 1) => TirExpressionKind::SharedNew(Box::new(self.lower_expression(&args[0], true))),
                ("Mutex", 1) => TirExpressionKind::GuardedNew(Box::new(self.lower_expression(&args[0], true))),
                ("Ok", 1) => TirExpressionKind::ResultLiteral {
                    is_ok: true,
                    value: Box::new(self.lower_expression(&args[0], true)),
                },
                ("Err", 1) => TirExpressionKind::ResultLiteral {
                    is_ok: false,
                    value: Box::new(self.lower_expression(&args[0], true)),
                },
                _ => TirExpressionKind::Call {
                    callee: TirCallee::Function {
                        path: name.clone(),
                        position: function.position.clone(),
                    },
                    args: self.lower_args(args),
                },
            },
            ExpressionAstKind::Attribute { object, field } => {
                // a call through a whole-module import is a dotted path,
                // everything else is a method on its receiver
                if let ExpressionAstKind::Name(module) = &object.kind {
                    if self.module_imports.contains(module.as_str()) {
                        return TirExpression {
                            id,
                            kind: TirExpressionKind::Call {
                                callee: TirCallee::Function {
                                    path: format!("{module}.{}", field.name),
                                    position: function.position.clone(),
                                },
                                args: self.lower_args(args),
                            },
                            position,
                        };
                    }
                }
                TirExpressionKind::Call {
                    callee: TirCallee::Method {
                        receiver: Box::new(self.lower_expression(object, false)),
                        name: field.name.clone(),
                        position: field.position.clone(),
                    },
                    args: self.lower_args(args),
                }
            }
            _ => {
                self.unsupported(function.position.clone(), "calling a computed expression is outside the supported subset");
                TirExpressionKind::NoneLiteral
            }
        };
        TirExpression { id, kind, position }
    }

    fn lower_args(&mut self, args: &[ExpressionAst]) -> Vec<TirExpression> {
        args.iter().map(|arg| self.lower_expression(arg, true)).collect()
    }

    // --- annotations -------------------------------------------------------

    /// Converts a written annotation into the TIR type universe.
    fn lower_type(&mut self, annotation: &TypeAst) -> Type {
        match &annotation.kind {
            TypeAstKind::Name(name) => match name.as_str() {
                "int" => Type::Int,
                "float" => Type::Float,
                "str" => Type::String,
                "bool" => Type::Bool,
                "None" => Type::Unit,
                other => Type::named(other),
            },
            TypeAstKind::Generic { base, args } => {
                let mut lowered: Vec<Type> = args.iter().map(|arg| self.lower_type(arg)).collect();
                match (base.as_str(), lowered.len()) {
                    ("list", 1) => Type::Sequence(Box::new(lowered.remove(0))),
                    ("set", 1) => Type::Set(Box::new(lowered.remove(0))),
                    ("dict", 2) => {
                        let value = lowered.pop().expect("two dict arguments");
                        let key = lowered.pop().expect("two dict arguments");
                        Type::Mapping(Box::new(key), Box::new(value))
                    }
                    ("tuple", _) => Type::Tuple(lowered),
                    ("Optional", 1) => Type::Optional(Box::new(lowered.remove(0))),
                    ("Result", 2) => {
                        let err = lowered.pop().expect("two Result arguments");
                        let ok = lowered.pop().expect("two Result arguments");
                        Type::Fallible(Box::new(ok), Box::new(err))
                    }
                    ("Arc" | "Shared", 1) => Type::Shared(Box::new(lowered.remove(0))),
                    ("Mutex" | "Guarded", 1) => Type::Guarded(Box::new(lowered.remove(0))),
                    (other, _) => Type::Named {
                        path: other.to_string(),
                        generics: lowered,
                    },
                }
            }
            TypeAstKind::Union(members) => {
                // only `T | None` can be expressed; it is `Optional[T]`
                let mut inner = None;
                let mut has_none = false;
                for member in members {
                    if matches!(&member.kind, TypeAstKind::Name(name) if name == "None") {
                        has_none = true;
                    } else if inner.is_none() {
                        inner = Some(self.lower_type(member));
                    } else {
                        self.unsupported(
                            annotation.position.clone(),
                            "union annotations other than 'T | None' are outside the supported subset",
                        );
                        return Type::Unknown;
                    }
                }
                match (inner, has_none) {
                    (Some(inner), true) => Type::Optional(Box::new(inner)),
                    (Some(inner), false) => inner,
                    (None, _) => Type::Optional(Box::new(Type::Unknown)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::file::SourceFile;
    use crate::nom_tools::State;
    use crate::tir::{TirExpressionKind, TirStatementKind, Type};

    fn lower(code: &str) -> crate::tir::TirModule {
        let state = State::new(SourceFile::new(vec!["main".into()], code.to_string()));
        let ast = crate::parser::parse(&state).unwrap();
        let mut counter = 0;
        let (module, diagnostics) = super::lower_module(&ast, &mut counter);
        assert!(diagnostics.is_empty(), "unexpected diagnostics: {diagnostics}");
        module
    }

    #[test]
    fn augmented_assignment_becomes_binary() {
        let module = lower("def f() -> int:\n    x: int = 0\n    x += 2\n    return x\n");
        let function = &module.functions[0];
        let TirStatementKind::Assign { value, .. } = &function.body[1].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(&value.kind, TirExpressionKind::Binary { .. }));
    }

    #[test]
    fn len_and_range_are_distinguished() {
        let module = lower("def f(values: list[int]) -> None:\n    n: int = len(values)\n    for i in range(10):\n        print(i)\n");
        let function = &module.functions[0];
        let TirStatementKind::Assign { value, .. } = &function.body[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(&value.kind, TirExpressionKind::Len(_)));
        let TirStatementKind::For { iterable, .. } = &function.body[1].kind else {
            panic!("expected for");
        };
        assert!(matches!(&iterable.kind, TirExpressionKind::RangeLiteral { .. }));
    }

    #[test]
    fn module_import_calls_become_dotted_paths() {
        let module = lower("import asyncio\nasync def main() -> None:\n    await asyncio.sleep(1.0)\n");
        let function = &module.functions[0];
        let TirStatementKind::Expression(expression) = &function.body[0].kind else {
            panic!("expected expression statement");
        };
        let TirExpressionKind::Await(inner) = &expression.kind else {
            panic!("expected await");
        };
        let TirExpressionKind::Call { callee, .. } = &inner.kind else {
            panic!("expected call");
        };
        assert!(matches!(
            callee,
            crate::tir::TirCallee::Function { path, .. } if path == "asyncio.sleep"
        ));
    }

    #[test]
    fn string_literals_own_at_boundaries() {
        let module = lower("def f(name: str) -> str:\n    return \"x\"\n");
        let function = &module.functions[0];
        let TirStatementKind::Return(Some(value)) = &function.body[0].kind else {
            panic!("expected return");
        };
        assert!(matches!(
            &value.kind,
            TirExpressionKind::StringLiteral { owned: true, .. }
        ));

        let module = lower("def f(flag: str) -> bool:\n    return flag == \"x\"\n");
        let function = &module.functions[0];
        let TirStatementKind::Return(Some(value)) = &function.body[0].kind else {
            panic!("expected return");
        };
        let TirExpressionKind::Compare { right, .. } = &value.kind else {
            panic!("expected comparison");
        };
        assert!(matches!(
            &right.kind,
            TirExpressionKind::StringLiteral { owned: false, .. }
        ));
    }

    #[test]
    fn init_becomes_constructor() {
        let module = lower(
            "class Counter:\n    count: int\n    def __init__(self, start: int) -> None:\n        self.count = start\n    def bump(self) -> None:\n        self.count += 1\n",
        );
        let class = &module.classes[0];
        let constructor = class.constructor.as_ref().unwrap();
        assert_eq!(constructor.name, "new");
        assert_eq!(constructor.params.len(), 1);
        assert!(class.methods[0].has_receiver);
    }

    #[test]
    fn annotations_lower_structurally() {
        let module = lower("def f(a: dict[str, list[int]], b: int | None, c: Arc[Mutex[int]]) -> None:\n    pass\n");
        let params = &module.functions[0].params;
        assert_eq!(
            params[0].ty.as_ref().unwrap(),
            &Type::Mapping(Box::new(Type::String), Box::new(Type::Sequence(Box::new(Type::Int))))
        );
        assert_eq!(params[1].ty.as_ref().unwrap(), &Type::Optional(Box::new(Type::Int)));
        assert_eq!(
            params[2].ty.as_ref().unwrap(),
            &Type::Shared(Box::new(Type::Guarded(Box::new(Type::Int))))
        );
    }
}
