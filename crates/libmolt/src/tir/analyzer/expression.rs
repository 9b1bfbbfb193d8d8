//! Expression inference.
//!
//! Every expression node gets its type recorded in the annotation table.
//! Call inference is where the stub registry is consulted, borrow hints are
//! decided, and the await discipline is enforced.

use std::ops::Range;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{BinaryOperator, CompareOperator, UnaryOperator};
use crate::error::DiagnosticKind;
use crate::stubs::{ArgForm, StubCallable, TypeRepr};
use crate::tir::annotations::{ArgumentMode, ResolvedStub};
use crate::tir::{TirCallee, TirExpression, TirExpressionKind, TirFStringPart, Type};

use super::{deref_shared, Analyzer, BindingRef, FunctionSignature, Local};

impl Analyzer<'_> {
    /// Infers and records the type of an expression tree.
    pub(crate) fn infer_expression(&mut self, expression: &TirExpression) -> Type {
        self.infer_with_await(expression, false)
    }

    /// Like [`Self::infer_expression`], but the immediate call (if any) is
    /// in await position — under `await` or in a future-taking stub slot.
    fn infer_awaited(&mut self, expression: &TirExpression) -> Type {
        self.infer_with_await(expression, true)
    }

    fn infer_with_await(&mut self, expression: &TirExpression, awaited: bool) -> Type {
        let ty = self.infer_kind(expression, awaited);
        self.annotations.types.insert(expression.id, ty.clone());
        ty
    }

    fn infer_kind(&mut self, expression: &TirExpression, awaited: bool) -> Type {
        let position = expression.position.clone();
        match &expression.kind {
            TirExpressionKind::Integer(_) => Type::Int,
            TirExpressionKind::Float(_) => Type::Float,
            TirExpressionKind::Bool(_) => Type::Bool,
            // `None` is the bottom optional; it unifies with any Optional[T]
            TirExpressionKind::NoneLiteral => Type::Optional(Box::new(Type::Never)),
            TirExpressionKind::StringLiteral { owned, .. } => {
                if *owned {
                    Type::String
                } else {
                    Type::StrSlice
                }
            }
            TirExpressionKind::FString(parts) => {
                for part in parts {
                    if let TirFStringPart::Interpolation { expression, .. } = part {
                        self.infer_expression(expression);
                    }
                }
                Type::String
            }
            TirExpressionKind::Name(name) => self.infer_name(name, position),
            TirExpressionKind::Call { .. } => self.infer_call(expression, awaited),
            TirExpressionKind::Attribute { object, field } => {
                let object_ty = self.infer_expression(object);
                self.attribute_type(&object_ty, field, position).unwrap_or(Type::Unknown)
            }
            TirExpressionKind::Index { object, index } => self.infer_index(object, index),
            TirExpressionKind::Unary { op, operand } => self.infer_unary(*op, operand, position),
            TirExpressionKind::Binary { op, left, right } => self.infer_binary(*op, left, right, position),
            TirExpressionKind::BoolOp { left, right, .. } => {
                for side in [left, right] {
                    let ty = self.infer_expression(side);
                    if !matches!(ty, Type::Bool | Type::Never | Type::Unknown) {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            side.position.clone(),
                            format!("boolean operator needs 'bool' operands, found '{ty}'"),
                        );
                    }
                }
                Type::Bool
            }
            TirExpressionKind::Compare { op, left, right } => self.infer_compare(*op, left, right),
            TirExpressionKind::Membership { item, container, .. } => self.infer_membership(item, container),
            TirExpressionKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                let condition_ty = self.infer_expression(condition);
                if !matches!(condition_ty, Type::Bool | Type::Never | Type::Unknown) {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        condition.position.clone(),
                        format!("condition must be 'bool', found '{condition_ty}'"),
                    );
                }
                let then_ty = self.infer_expression(then_value);
                let else_ty = self.infer_expression(else_value);
                match self.unify(&then_ty, &else_ty) {
                    Some(ty) => ty,
                    None => {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            position,
                            format!("conditional branches disagree: '{then_ty}' vs '{else_ty}'"),
                        );
                        Type::Unknown
                    }
                }
            }
            TirExpressionKind::Tuple(items) => Type::Tuple(items.iter().map(|item| self.infer_expression(item)).collect()),
            TirExpressionKind::List(items) => Type::Sequence(Box::new(self.unify_elements(items, position))),
            TirExpressionKind::SetDisplay(items) => Type::Set(Box::new(self.unify_elements(items, position))),
            TirExpressionKind::Dict(entries) => {
                let keys: Vec<_> = entries.iter().map(|(key, _)| key.clone()).collect();
                let values: Vec<_> = entries.iter().map(|(_, value)| value.clone()).collect();
                let key_ty = self.unify_elements(&keys, position.clone());
                let value_ty = self.unify_elements(&values, position);
                Type::Mapping(Box::new(key_ty), Box::new(value_ty))
            }
            TirExpressionKind::Await(inner) => {
                if !self.current_is_async {
                    self.report(
                        DiagnosticKind::AwaitOutsideAsync,
                        position,
                        "'await' outside an async function",
                    );
                }
                let inner_ty = self.infer_awaited(inner);
                // awaiting a spawn handle joins the task
                if matches!(&inner_ty, Type::Named { path, .. } if path == "JoinHandle") {
                    Type::Unit
                } else {
                    inner_ty
                }
            }
            TirExpressionKind::Len(inner) => {
                let inner_ty = self.infer_expression(inner);
                if !matches!(
                    inner_ty,
                    Type::Sequence(_) | Type::Mapping(..) | Type::Set(_) | Type::String | Type::StrSlice | Type::Unknown
                ) {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        inner.position.clone(),
                        format!("'len' needs a container or string, found '{inner_ty}'"),
                    );
                }
                Type::Int
            }
            TirExpressionKind::RangeLiteral { start, end } => {
                for bound in [start, end] {
                    let ty = self.infer_expression(bound);
                    if !matches!(ty, Type::Int | Type::Unknown) {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            bound.position.clone(),
                            format!("'range' bounds must be 'int', found '{ty}'"),
                        );
                    }
                }
                Type::Sequence(Box::new(Type::Int))
            }
            TirExpressionKind::SharedNew(inner) => Type::Shared(Box::new(self.infer_expression(inner))),
            TirExpressionKind::GuardedNew(inner) => Type::Guarded(Box::new(self.infer_expression(inner))),
            TirExpressionKind::ResultLiteral { is_ok, value } => {
                let value_ty = self.infer_expression(value);
                if *is_ok {
                    Type::Fallible(Box::new(value_ty), Box::new(Type::Never))
                } else {
                    Type::Fallible(Box::new(Type::Never), Box::new(value_ty))
                }
            }
            TirExpressionKind::Comprehension {
                element,
                variable,
                iterable,
                condition,
            } => {
                let iterable_ty = self.infer_expression(iterable);
                let element_input = match &iterable_ty {
                    Type::Sequence(inner) | Type::Set(inner) => (**inner).clone(),
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            iterable.position.clone(),
                            format!("cannot iterate over '{other}'"),
                        );
                        Type::Unknown
                    }
                };
                self.scopes.push(IndexMap::new());
                self.insert_local(
                    variable,
                    Local {
                        ty: element_input,
                        binding: BindingRef::Opaque,
                    },
                );
                if let Some(condition) = condition {
                    let condition_ty = self.infer_expression(condition);
                    if !matches!(condition_ty, Type::Bool | Type::Never | Type::Unknown) {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            condition.position.clone(),
                            format!("comprehension filter must be 'bool', found '{condition_ty}'"),
                        );
                    }
                }
                let element_ty = self.infer_expression(element);
                self.scopes.pop();
                Type::Sequence(Box::new(element_ty))
            }
        }
    }

    fn infer_name(&mut self, name: &str, position: Range<usize>) -> Type {
        if let Some(local) = self.lookup_local(name) {
            return local.ty;
        }
        if let Some(ty) = self.symbols.constants.get(name) {
            return ty.clone();
        }
        if let Some(signature) = self.symbols.functions.get(name) {
            return Type::Function {
                params: signature.param_types.clone(),
                ret: Box::new(signature.ret.clone()),
                is_async: signature.is_async,
            };
        }
        self.report(
            DiagnosticKind::UnknownSymbol,
            position,
            format!("'{name}' is not defined"),
        );
        Type::Unknown
    }

    // --- calls ---------------------------------------------------------

    fn infer_call(&mut self, expression: &TirExpression, awaited: bool) -> Type {
        let TirExpressionKind::Call { callee, args } = &expression.kind else {
            unreachable!("infer_call on a non-call node");
        };

        match callee {
            TirCallee::Function { path, position } => self.infer_function_call(expression.id, path, position.clone(), args, awaited),
            TirCallee::Method { receiver, name, position } => {
                self.infer_method_call(expression.id, receiver, name, position.clone(), args, awaited)
            }
        }
    }

    fn infer_function_call(
        &mut self,
        call_id: crate::tir::NodeId,
        path: &str,
        position: Range<usize>,
        args: &[TirExpression],
        awaited: bool,
    ) -> Type {
        // `print` accepts anything displayable and returns unit
        if path == "print" {
            for arg in args {
                self.infer_expression(arg);
            }
            return Type::Unit;
        }

        if !path.contains('.') {
            if let Some(signature) = self.symbols.functions.get(path).cloned() {
                return self.check_user_call(path, &signature, args, position, awaited);
            }
            if self.symbols.classes.contains_key(path) {
                return self.check_constructor_call(path, args, position);
            }
        }

        if let Some(stub) = self.stubs.lookup_callable(path) {
            return self.apply_stub(call_id, None, &stub, args, position, awaited);
        }

        // a dotted path can still be a user function in another module
        if let Some(tail) = path.rsplit('.').next() {
            if let Some(signature) = self.symbols.functions.get(tail).cloned() {
                return self.check_user_call(path, &signature, args, position, awaited);
            }
        }

        self.report_with_note(
            DiagnosticKind::UnknownSymbol,
            position,
            format!("'{path}' is neither defined nor resolvable through a stub package"),
            "install the stub package that provides it or check the spelling",
        );
        Type::Unknown
    }

    fn infer_method_call(
        &mut self,
        call_id: crate::tir::NodeId,
        receiver: &TirExpression,
        name: &str,
        position: Range<usize>,
        args: &[TirExpression],
        awaited: bool,
    ) -> Type {
        let receiver_ty = self.infer_expression(receiver);
        if matches!(receiver_ty, Type::Unknown) {
            return Type::Unknown;
        }
        let dispatch_ty = deref_shared(&receiver_ty).clone();

        // stub table first, then user methods, then the built-in tables
        if let Some(stub) = self.stubs.lookup_method(&dispatch_ty, name) {
            let ty = self.apply_stub(call_id, Some(receiver), &stub, args, position, awaited);
            return ty;
        }

        if let Type::Named { path, .. } = &dispatch_ty {
            if let Some(signature) = self.symbols.classes.get(path).and_then(|class| class.methods.get(name)).cloned() {
                self.defer_receiver_mutation(receiver, signature.id);
                return self.check_user_call(name, &signature, args, position, awaited);
            }
        }

        if let Some(ty) = self.builtin_method(call_id, &receiver_ty, &dispatch_ty, receiver, name, args, &position, awaited) {
            return ty;
        }

        self.report(
            DiagnosticKind::UnknownSymbol,
            position,
            format!("no method '{name}' on type '{receiver_ty}'"),
        );
        Type::Unknown
    }

    /// Arity, argument typing, borrow hints and async discipline for a call
    /// to user-defined code.
    fn check_user_call(
        &mut self,
        name: &str,
        signature: &FunctionSignature,
        args: &[TirExpression],
        position: Range<usize>,
        awaited: bool,
    ) -> Type {
        if args.len() != signature.param_types.len() {
            self.report(
                DiagnosticKind::TypeMismatch,
                position.clone(),
                format!("'{name}' expects {} argument(s), found {}", signature.param_types.len(), args.len()),
            );
        }

        for (param_ty, arg) in signature.param_types.iter().zip(args) {
            let arg_ty = self.infer_expression(arg);
            if !param_ty.accepts(&arg_ty) {
                self.report(
                    DiagnosticKind::TypeMismatch,
                    arg.position.clone(),
                    format!("argument type mismatch: expected '{param_ty}', found '{arg_ty}'"),
                );
            }
            self.record_argument_mode(param_ty, arg, &arg_ty);
        }
        for arg in args.iter().skip(signature.param_types.len()) {
            self.infer_expression(arg);
        }

        self.check_async_call(name, signature.is_async, awaited, position);
        signature.ret.clone()
    }

    /// By-value policy for user calls: scalars move, shared handles and
    /// owned strings clone at the call site, constants promote to owned.
    fn record_argument_mode(&mut self, param_ty: &Type, arg: &TirExpression, arg_ty: &Type) {
        let is_name = matches!(arg.kind, TirExpressionKind::Name(_));
        let mode = match param_ty {
            Type::Shared(_) if is_name => Some(ArgumentMode::CloneValue),
            Type::String if is_name && matches!(arg_ty, Type::String) => Some(ArgumentMode::CloneValue),
            Type::String if is_name && matches!(arg_ty, Type::StrSlice) => Some(ArgumentMode::ToOwned),
            _ => None,
        };
        if let Some(mode) = mode {
            self.annotations.argument_modes.insert(arg.id, mode);
        }
    }

    fn check_constructor_call(&mut self, class_name: &str, args: &[TirExpression], position: Range<usize>) -> Type {
        let Some(class) = self.symbols.classes.get(class_name).cloned() else {
            return Type::Unknown;
        };
        let Some(constructor) = &class.constructor else {
            self.report(
                DiagnosticKind::UnknownSymbol,
                position,
                format!("class '{class_name}' has no constructor"),
            );
            return Type::named(class_name);
        };

        if class.is_dataclass {
            // trailing defaulted fields may be omitted; the emitter pads
            // the missing arguments with `None`
            let required = class.field_defaults.iter().filter(|has_default| !**has_default).count();
            if args.len() < required || args.len() > constructor.param_types.len() {
                self.report(
                    DiagnosticKind::TypeMismatch,
                    position,
                    format!(
                        "'{class_name}' expects between {required} and {} argument(s), found {}",
                        constructor.param_types.len(),
                        args.len()
                    ),
                );
            }
            for (index, arg) in args.iter().enumerate() {
                let arg_ty = self.infer_expression(arg);
                let expected = match constructor.param_types.get(index) {
                    Some(Type::Optional(inner)) if class.field_defaults.get(index) == Some(&true) => (**inner).clone(),
                    Some(other) => other.clone(),
                    None => continue,
                };
                if !expected.accepts(&arg_ty) {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        arg.position.clone(),
                        format!("argument type mismatch: expected '{expected}', found '{arg_ty}'"),
                    );
                }
                self.record_argument_mode(&expected, arg, &arg_ty);
            }
        } else {
            let signature = constructor.clone();
            self.check_user_call(class_name, &signature, args, position, true);
        }

        Type::named(class_name)
    }

    /// Resolves a call through the stub registry and records the expansion.
    fn apply_stub(
        &mut self,
        call_id: crate::tir::NodeId,
        receiver: Option<&TirExpression>,
        stub: &Rc<StubCallable>,
        args: &[TirExpression],
        position: Range<usize>,
        awaited: bool,
    ) -> Type {
        if args.len() != stub.params.len() {
            self.report(
                DiagnosticKind::TypeMismatch,
                position.clone(),
                format!("stubbed callable expects {} argument(s), found {}", stub.params.len(), args.len()),
            );
        }

        for (index, arg) in args.iter().enumerate() {
            let param = stub.params.get(index);
            let future_slot = matches!(param, Some(TypeRepr::Named { path, .. }) if path == "Future");
            let arg_ty = if future_slot {
                self.infer_awaited(arg)
            } else {
                self.infer_expression(arg)
            };

            if let Some(param) = param {
                let param_ty = param.to_type();
                let nominal = matches!(param_ty, Type::Named { .. });
                let numeric_pair = param_ty.is_numeric() && arg_ty.is_numeric();
                if !nominal && !numeric_pair && !param_ty.accepts(&arg_ty) {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        arg.position.clone(),
                        format!("argument type mismatch: expected '{param_ty}', found '{arg_ty}'"),
                    );
                }
            }

            let mode = match stub.arg_forms.get(index) {
                Some(ArgForm::Borrow) => Some(ArgumentMode::Borrow),
                Some(ArgForm::BorrowMut) => Some(ArgumentMode::BorrowMut),
                _ => None,
            };
            if let Some(mode) = mode {
                self.annotations.argument_modes.insert(arg.id, mode);
            }
        }

        self.annotations.stub_calls.insert(
            call_id,
            ResolvedStub {
                template: stub.template.clone(),
                imports: stub.imports.clone(),
                requirement: stub.requires.clone(),
                is_async: stub.is_async,
                exclusive_receiver: stub.exclusive_receiver,
            },
        );

        if stub.exclusive_receiver {
            if let Some(receiver) = receiver {
                self.mark_root_mutable(receiver);
            }
        }

        self.check_async_call("stubbed callable", stub.is_async, awaited, position);
        stub.returns.to_type()
    }

    fn check_async_call(&mut self, name: &str, is_async: bool, awaited: bool, position: Range<usize>) {
        if !is_async {
            return;
        }
        if !self.current_is_async {
            self.report(
                DiagnosticKind::AwaitOutsideAsync,
                position,
                format!("async call to '{name}' in a non-async function"),
            );
        } else if !awaited {
            self.report(
                DiagnosticKind::AwaitOutsideAsync,
                position,
                format!("call to async '{name}' must be awaited"),
            );
        }
    }

    // --- built-in method tables -----------------------------------------

    /// Methods on strings, containers, `Arc`, and the async mutex.
    ///
    /// Returns `None` when the name is not in any table, so the caller can
    /// report an unknown symbol.
    #[allow(clippy::too_many_arguments)]
    fn builtin_method(
        &mut self,
        call_id: crate::tir::NodeId,
        receiver_ty: &Type,
        dispatch_ty: &Type,
        receiver: &TirExpression,
        name: &str,
        args: &[TirExpression],
        position: &Range<usize>,
        awaited: bool,
    ) -> Option<Type> {
        // `clone` is universal and resolves before the Arc deref
        if name == "clone" && args.is_empty() {
            return Some(receiver_ty.clone());
        }

        let arg_types: Vec<Type> = args.iter().map(|arg| self.infer_expression(arg)).collect();

        let check_arity = |analyzer: &mut Self, expected: usize| {
            if args.len() != expected {
                analyzer.report(
                    DiagnosticKind::TypeMismatch,
                    position.clone(),
                    format!("'{name}' expects {expected} argument(s), found {}", args.len()),
                );
            }
        };

        let ty = match (dispatch_ty, name) {
            (ty, "upper" | "lower" | "strip") if ty.is_stringy() => {
                check_arity(self, 0);
                Type::String
            }
            (ty, "startswith" | "endswith") if ty.is_stringy() => {
                check_arity(self, 1);
                self.expect_stringy_arg(args, &arg_types);
                Type::Bool
            }
            (ty, "split") if ty.is_stringy() => {
                check_arity(self, 1);
                self.expect_stringy_arg(args, &arg_types);
                Type::Sequence(Box::new(Type::String))
            }
            (ty, "join") if ty.is_stringy() => {
                check_arity(self, 1);
                if let Some(arg_ty) = arg_types.first() {
                    if !matches!(arg_ty, Type::Sequence(inner) if inner.is_stringy() || matches!(**inner, Type::Unknown)) {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            args[0].position.clone(),
                            format!("'join' needs a list of strings, found '{arg_ty}'"),
                        );
                    }
                }
                Type::String
            }
            (ty, "isdigit") if ty.is_stringy() => {
                check_arity(self, 0);
                Type::Bool
            }
            (ty, "replace") if ty.is_stringy() => {
                check_arity(self, 2);
                Type::String
            }
            (ty, "find") if ty.is_stringy() => {
                check_arity(self, 1);
                self.expect_stringy_arg(args, &arg_types);
                // only valid inside a sentinel comparison; tracked until one
                // consumes it
                self.pending_finds.insert(call_id, position.clone());
                Type::Int
            }
            (Type::Sequence(element), "append") => {
                check_arity(self, 1);
                self.expect_element_arg(element, args, &arg_types);
                self.mark_root_mutable(receiver);
                Type::Unit
            }
            (Type::Sequence(element), "pop") => {
                check_arity(self, 0);
                self.mark_root_mutable(receiver);
                Type::Optional(element.clone())
            }
            (Type::Sequence(element), "insert") => {
                check_arity(self, 2);
                if let Some(first) = args.first() {
                    self.annotations.index_casts.insert(first.id);
                }
                if let (Some(index_ty), Some(value_ty)) = (arg_types.first(), arg_types.get(1)) {
                    if !matches!(index_ty, Type::Int | Type::Unknown) {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            args[0].position.clone(),
                            format!("insert position must be 'int', found '{index_ty}'"),
                        );
                    }
                    if !element.accepts(value_ty) {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            args[1].position.clone(),
                            format!("cannot insert '{value_ty}' into 'list[{element}]'"),
                        );
                    }
                }
                self.mark_root_mutable(receiver);
                Type::Unit
            }
            (Type::Sequence(element), "extend") => {
                check_arity(self, 1);
                if let Some(arg_ty) = arg_types.first() {
                    if !Type::Sequence(element.clone()).accepts(arg_ty) {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            args[0].position.clone(),
                            format!("cannot extend 'list[{element}]' with '{arg_ty}'"),
                        );
                    }
                }
                self.mark_root_mutable(receiver);
                Type::Unit
            }
            (Type::Sequence(_), "sort") => {
                check_arity(self, 0);
                self.mark_root_mutable(receiver);
                Type::Unit
            }
            (Type::Sequence(_) | Type::Mapping(..) | Type::Set(_), "clear") => {
                check_arity(self, 0);
                self.mark_root_mutable(receiver);
                Type::Unit
            }
            (Type::Mapping(key, value), "get") => {
                check_arity(self, 1);
                if let Some(arg_ty) = arg_types.first() {
                    if !key.accepts(arg_ty) {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            args[0].position.clone(),
                            format!("mapping key must be '{key}', found '{arg_ty}'"),
                        );
                    }
                }
                Type::Optional(value.clone())
            }
            (Type::Mapping(key, _), "keys") => {
                check_arity(self, 0);
                Type::Sequence(key.clone())
            }
            (Type::Mapping(_, value), "values") => {
                check_arity(self, 0);
                Type::Sequence(value.clone())
            }
            (Type::Set(element), "add") => {
                check_arity(self, 1);
                self.expect_element_arg(element, args, &arg_types);
                self.mark_root_mutable(receiver);
                Type::Unit
            }
            (Type::Set(element), "remove") => {
                check_arity(self, 1);
                self.expect_element_arg(element, args, &arg_types);
                self.mark_root_mutable(receiver);
                Type::Unit
            }
            (Type::Guarded(inner), "lock") => {
                check_arity(self, 0);
                self.check_async_call("lock", true, awaited, position.clone());
                (**inner).clone()
            }
            _ => return None,
        };
        Some(ty)
    }

    fn expect_stringy_arg(&mut self, args: &[TirExpression], arg_types: &[Type]) {
        if let (Some(arg), Some(arg_ty)) = (args.first(), arg_types.first()) {
            if !arg_ty.is_stringy() && !matches!(arg_ty, Type::Unknown) {
                self.report(
                    DiagnosticKind::TypeMismatch,
                    arg.position.clone(),
                    format!("expected a string argument, found '{arg_ty}'"),
                );
            }
        }
    }

    fn expect_element_arg(&mut self, element: &Type, args: &[TirExpression], arg_types: &[Type]) {
        if let (Some(arg), Some(arg_ty)) = (args.first(), arg_types.first()) {
            if !element.accepts(arg_ty) {
                self.report(
                    DiagnosticKind::TypeMismatch,
                    arg.position.clone(),
                    format!("expected '{element}', found '{arg_ty}'"),
                );
            }
        }
    }

    // --- operators -------------------------------------------------------

    fn infer_unary(&mut self, op: UnaryOperator, operand: &TirExpression, position: Range<usize>) -> Type {
        let operand_ty = self.infer_expression(operand);
        match op {
            UnaryOperator::Neg => {
                if operand_ty.is_numeric() || matches!(operand_ty, Type::Unknown) {
                    operand_ty
                } else {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        position,
                        format!("cannot negate '{operand_ty}'"),
                    );
                    Type::Unknown
                }
            }
            UnaryOperator::Not => {
                if !matches!(operand_ty, Type::Bool | Type::Never | Type::Unknown) {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        position,
                        format!("'not' needs a 'bool' operand, found '{operand_ty}'"),
                    );
                }
                Type::Bool
            }
        }
    }

    fn infer_binary(
        &mut self,
        op: BinaryOperator,
        left: &TirExpression,
        right: &TirExpression,
        position: Range<usize>,
    ) -> Type {
        let left_ty = self.infer_expression(left);
        let right_ty = self.infer_expression(right);

        if matches!(left_ty, Type::Unknown) || matches!(right_ty, Type::Unknown) {
            return Type::Unknown;
        }

        // string concatenation needs owned strings on both sides; the
        // emitter borrows the right-hand side
        if op == BinaryOperator::Add && left_ty.is_stringy() && right_ty.is_stringy() {
            return Type::String;
        }

        if left_ty.is_numeric() && right_ty.is_numeric() {
            return if left_ty == Type::Float || right_ty == Type::Float {
                Type::Float
            } else {
                Type::Int
            };
        }

        self.report(
            DiagnosticKind::TypeMismatch,
            position,
            format!("operator '{}' cannot combine '{left_ty}' and '{right_ty}'", op.symbol()),
        );
        Type::Unknown
    }

    fn infer_compare(&mut self, op: CompareOperator, left: &TirExpression, right: &TirExpression) -> Type {
        let left_ty = self.infer_expression(left);
        let right_ty = self.infer_expression(right);

        // `is` / `is not` only exist as None checks
        if matches!(op, CompareOperator::Is | CompareOperator::IsNot) {
            if !matches!(right.kind, TirExpressionKind::NoneLiteral) {
                self.report(
                    DiagnosticKind::UnsupportedConstruct,
                    right.position.clone(),
                    "'is' comparisons are only supported against None",
                );
            } else if !matches!(left_ty, Type::Optional(_) | Type::Unknown) {
                self.report(
                    DiagnosticKind::TypeMismatch,
                    left.position.clone(),
                    format!("'is None' needs an Optional value, found '{left_ty}'"),
                );
            }
            return Type::Bool;
        }

        // a find call compared against its sentinel is the contains idiom
        self.consume_sentinel_find(op, left, right);

        // comparing against len() moves the integer side into usize
        self.apply_len_cast_rule(left, right);
        self.apply_len_cast_rule(right, left);

        let comparable = match op {
            CompareOperator::Eq | CompareOperator::NotEq => {
                left_ty.accepts(&right_ty) || right_ty.accepts(&left_ty) || (left_ty.is_numeric() && right_ty.is_numeric())
            }
            _ => {
                (left_ty.is_numeric() && right_ty.is_numeric()) || (left_ty.is_stringy() && right_ty.is_stringy())
            }
        };
        if !comparable && !matches!(left_ty, Type::Unknown) && !matches!(right_ty, Type::Unknown) {
            self.report(
                DiagnosticKind::TypeMismatch,
                left.position.start..right.position.end,
                format!("cannot compare '{left_ty}' with '{right_ty}'"),
            );
        }
        Type::Bool
    }

    fn consume_sentinel_find(&mut self, op: CompareOperator, left: &TirExpression, right: &TirExpression) {
        let find_id = match (&left.kind, &right.kind) {
            (TirExpressionKind::Call { callee: TirCallee::Method { name, .. }, .. }, _) if name == "find" => Some(left.id),
            (_, TirExpressionKind::Call { callee: TirCallee::Method { name, .. }, .. }) if name == "find" => Some(right.id),
            _ => None,
        };
        let Some(find_id) = find_id else { return };

        let sentinel = sentinel_value(if find_id == left.id { right } else { left });
        let valid = matches!(
            (op, sentinel),
            (CompareOperator::GtEq, Some(0))
                | (CompareOperator::Lt, Some(0))
                | (CompareOperator::Eq, Some(-1))
                | (CompareOperator::NotEq, Some(-1))
        );
        if valid {
            self.pending_finds.shift_remove(&find_id);
        }
    }

    fn apply_len_cast_rule(&mut self, len_side: &TirExpression, other: &TirExpression) {
        if !matches!(len_side.kind, TirExpressionKind::Len(_)) {
            return;
        }
        if matches!(other.kind, TirExpressionKind::Integer(_) | TirExpressionKind::Len(_)) {
            return;
        }
        if matches!(self.annotations.type_of(other.id), Type::Int) {
            self.annotations.usize_casts.insert(other.id);
        }
    }

    fn infer_membership(&mut self, item: &TirExpression, container: &TirExpression) -> Type {
        let item_ty = self.infer_expression(item);
        let container_ty = self.infer_expression(container);

        let ok = match &container_ty {
            Type::Sequence(element) | Type::Set(element) => element.accepts(&item_ty),
            Type::Mapping(key, _) => key.accepts(&item_ty),
            ty if ty.is_stringy() => item_ty.is_stringy(),
            Type::Unknown => true,
            _ => false,
        };
        if !ok {
            self.report(
                DiagnosticKind::TypeMismatch,
                item.position.start..container.position.end,
                format!("cannot test membership of '{item_ty}' in '{container_ty}'"),
            );
        }
        Type::Bool
    }

    // --- helpers ---------------------------------------------------------

    fn unify_elements(&mut self, items: &[TirExpression], position: Range<usize>) -> Type {
        let mut unified = Type::Unknown;
        for item in items {
            let item_ty = self.infer_expression(item);
            if matches!(unified, Type::Unknown) {
                unified = item_ty;
                continue;
            }
            match self.unify(&unified, &item_ty) {
                Some(ty) => unified = ty,
                None => {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        position.clone(),
                        format!("container elements disagree: '{unified}' vs '{item_ty}'"),
                    );
                }
            }
        }
        unified
    }

    /// Least upper bound of two types, if one exists.
    fn unify(&self, left: &Type, right: &Type) -> Option<Type> {
        if left == right {
            return Some(left.clone());
        }
        // None-literal side makes the other optional
        if let Type::Optional(inner) = left {
            if matches!(**inner, Type::Never) {
                return Some(match right {
                    Type::Optional(_) => right.clone(),
                    other => Type::Optional(Box::new(other.clone())),
                });
            }
        }
        if let Type::Optional(inner) = right {
            if matches!(**inner, Type::Never) {
                return Some(match left {
                    Type::Optional(_) => left.clone(),
                    other => Type::Optional(Box::new(other.clone())),
                });
            }
        }
        if left.accepts(right) {
            return Some(left.clone());
        }
        if right.accepts(left) {
            return Some(right.clone());
        }
        None
    }

    fn infer_index(&mut self, object: &TirExpression, index: &TirExpression) -> Type {
        let object_ty = self.infer_expression(object);
        let index_ty = self.infer_expression(index);

        match &object_ty {
            Type::Sequence(element) => {
                if !matches!(index_ty, Type::Int | Type::Unknown) {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        index.position.clone(),
                        format!("sequence index must be 'int', found '{index_ty}'"),
                    );
                }
                self.annotations.index_casts.insert(index.id);
                (**element).clone()
            }
            Type::Mapping(key, value) => {
                if !key.accepts(&index_ty) {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        index.position.clone(),
                        format!("mapping key must be '{key}', found '{index_ty}'"),
                    );
                }
                (**value).clone()
            }
            Type::Tuple(elements) => match &index.kind {
                TirExpressionKind::Integer(value) if (0..elements.len() as i64).contains(value) => {
                    elements[*value as usize].clone()
                }
                _ => {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        index.position.clone(),
                        "tuple indices must be integer literals in range",
                    );
                    Type::Unknown
                }
            },
            Type::Unknown => Type::Unknown,
            other => {
                self.report(
                    DiagnosticKind::TypeMismatch,
                    object.position.clone(),
                    format!("'{other}' does not support subscripting"),
                );
                Type::Unknown
            }
        }
    }
}

/// The integer value of a (possibly negated) literal.
fn sentinel_value(expression: &TirExpression) -> Option<i64> {
    match &expression.kind {
        TirExpressionKind::Integer(value) => Some(*value),
        TirExpressionKind::Unary {
            op: UnaryOperator::Neg,
            operand,
        } => match &operand.kind {
            TirExpressionKind::Integer(value) => Some(-value),
            _ => None,
        },
        _ => None,
    }
}
