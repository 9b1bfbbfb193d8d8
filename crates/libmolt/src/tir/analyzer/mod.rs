//! Semantic analysis over the TIR.
//!
//! The analyzer walks every module bottom-up and fills the [`Annotations`]
//! tables: expression types, binding facts and mutability, borrow hints,
//! index casts, error-propagation sites, stub resolutions and async
//! classification. TIR nodes themselves are never touched.
//!
//! Diagnostics are collected, not thrown: one fatal diagnostic prevents
//! emission, but analysis keeps walking so a single run surfaces as many
//! problems as possible.
//!
//! # Scoping
//!
//! Locals are block-scoped the way the emitted Rust will be: a binding
//! introduced inside an `if` arm is not visible after it. Python's
//! function-level scoping cannot be reproduced without hoisting
//! declarations, so the analyzer enforces the stricter discipline up front
//! and reports `E_UNKNOWN_SYMBOL` where source code relies on leakage.

use std::ops::Range;

use indexmap::IndexMap;
use log::debug;

use crate::error::{Diagnostic, DiagnosticKind, Diagnostics};
use crate::file::SourceFile;
use crate::stubs::StubRegistry;
use crate::tir::annotations::{Annotations, BindingInfo};
use crate::tir::{
    NodeId, TirCallee, TirClass, TirExpression, TirExpressionKind, TirFunction, TirModule, TirStatement,
    TirStatementKind, TirTarget, Type,
};

mod expression;

/// Signature of a user-defined function or method.
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub id: NodeId,
    pub param_types: Vec<Type>,
    pub ret: Type,
    pub is_async: bool,
}

/// Everything the analyzer knows about a user-defined class.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub fields: IndexMap<String, Type>,
    pub methods: IndexMap<String, FunctionSignature>,
    /// Explicit `__init__` signature; dataclasses synthesize one from fields
    pub constructor: Option<FunctionSignature>,
    pub is_dataclass: bool,
    /// Per field, whether it carries a default (drives `Option` parameters)
    pub field_defaults: Vec<bool>,
}

/// Program-wide symbol table, flattened across modules.
///
/// The subset has no shadowing between modules, so symbols are keyed by
/// simple name; imports only matter for emission.
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub functions: IndexMap<String, FunctionSignature>,
    pub classes: IndexMap<String, ClassInfo>,
    pub constants: IndexMap<String, Type>,
}

/// What a local name resolves back to, for mutability marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingRef {
    /// A `let` introduced by an assignment statement
    Statement(NodeId),
    /// A name inside a tuple destructuring or a loop target
    Target(NodeId),
    /// A function parameter
    Param(NodeId),
    /// The method receiver (`self`)
    Receiver,
    /// Bindings with no mutability story (scoped resources, comprehension vars)
    Opaque,
}

#[derive(Debug, Clone)]
pub(crate) struct Local {
    pub ty: Type,
    pub binding: BindingRef,
}

/// Runs semantic analysis over all modules of one invocation.
pub fn analyze(modules: &[TirModule], stubs: &StubRegistry) -> Result<Annotations, Diagnostics> {
    let mut analyzer = Analyzer::new(stubs);
    analyzer.collect_symbols(modules);

    for module in modules {
        analyzer.analyze_module(module);
    }

    analyzer.classify_entry(modules);
    analyzer.resolve_pending_receiver_mutations();
    analyzer.verify_no_unknowns(modules);

    if analyzer.diagnostics.is_empty() {
        Ok(analyzer.annotations)
    } else {
        Err(analyzer.diagnostics)
    }
}

pub(crate) struct Analyzer<'stubs> {
    stubs: &'stubs StubRegistry,
    pub(crate) symbols: SymbolTable,
    pub(crate) annotations: Annotations,
    pub(crate) diagnostics: Diagnostics,
    scopes: Vec<IndexMap<String, Local>>,
    file: SourceFile,
    current_ret: Type,
    current_is_async: bool,
    current_function: NodeId,
    current_class: Option<String>,
    /// `str.find` calls not yet consumed by a sentinel comparison
    pending_finds: IndexMap<NodeId, Range<usize>>,
    /// `(receiver binding, calling function, called method)` to revisit once
    /// every method's exclusivity is known
    pending_receiver_mutations: Vec<(BindingRef, NodeId, NodeId)>,
}

impl<'stubs> Analyzer<'stubs> {
    fn new(stubs: &'stubs StubRegistry) -> Self {
        Self {
            stubs,
            symbols: SymbolTable::default(),
            annotations: Annotations::default(),
            diagnostics: Diagnostics::default(),
            scopes: Vec::new(),
            file: SourceFile::new(vec!["<memory>".into()], String::new()),
            current_ret: Type::Unit,
            current_is_async: false,
            current_function: NodeId::SYNTHETIC,
            current_class: None,
            pending_finds: IndexMap::new(),
            pending_receiver_mutations: Vec::new(),
        }
    }

    // --- diagnostics -------------------------------------------------------

    pub(crate) fn report(&mut self, kind: DiagnosticKind, position: Range<usize>, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(kind, self.file.clone(), position, message));
    }

    pub(crate) fn report_with_note(
        &mut self,
        kind: DiagnosticKind,
        position: Range<usize>,
        message: impl Into<String>,
        note: impl Into<String>,
    ) {
        self.diagnostics
            .push(Diagnostic::new(kind, self.file.clone(), position, message).with_note(note));
    }

    // --- symbol collection -------------------------------------------------

    fn collect_symbols(&mut self, modules: &[TirModule]) {
        for module in modules {
            self.file = module.file.clone();

            for function in &module.functions {
                let signature = self.signature_of(function);
                self.symbols.functions.insert(function.name.clone(), signature);
            }

            for class in &module.classes {
                let info = self.collect_class(class);
                self.symbols.classes.insert(class.name.clone(), info);
            }

            for constant in &module.constants {
                let ty = self.constant_type(constant);
                self.symbols.constants.insert(constant.name.clone(), ty);
            }
        }
        debug!(
            "collected {} functions, {} classes, {} constants",
            self.symbols.functions.len(),
            self.symbols.classes.len(),
            self.symbols.constants.len()
        );
    }

    /// Builds a signature, reporting missing parameter/return annotations.
    fn signature_of(&mut self, function: &TirFunction) -> FunctionSignature {
        let mut param_types = Vec::new();
        for param in &function.params {
            match &param.ty {
                Some(ty) => param_types.push(ty.clone()),
                None => {
                    self.report(
                        DiagnosticKind::MissingAnnotation,
                        param.position.clone(),
                        format!("parameter '{}' of '{}' has no type annotation", param.name, function.name),
                    );
                    param_types.push(Type::Unknown);
                }
            }
        }

        let ret = match &function.ret {
            Some(ty) => ty.clone(),
            None => {
                self.report(
                    DiagnosticKind::MissingAnnotation,
                    function.position.clone(),
                    format!("function '{}' has no return type annotation", function.name),
                );
                Type::Unit
            }
        };

        FunctionSignature {
            id: function.id,
            param_types,
            ret,
            is_async: function.is_async,
        }
    }

    fn collect_class(&mut self, class: &TirClass) -> ClassInfo {
        let mut fields = IndexMap::new();
        let mut field_defaults = Vec::new();
        for field in &class.fields {
            fields.insert(field.name.clone(), field.ty.clone());
            field_defaults.push(field.default.is_some());
        }

        let mut methods = IndexMap::new();
        for method in &class.methods {
            let signature = self.signature_of(method);
            methods.insert(method.name.clone(), signature);
        }

        let constructor = match (&class.constructor, class.is_dataclass) {
            (Some(function), _) => Some(self.signature_of(function)),
            (None, true) => Some(FunctionSignature {
                id: class.id,
                param_types: class
                    .fields
                    .iter()
                    .map(|field| {
                        if field.default.is_some() {
                            Type::Optional(Box::new(field.ty.clone()))
                        } else {
                            field.ty.clone()
                        }
                    })
                    .collect(),
                ret: Type::named(&class.name),
                is_async: false,
            }),
            (None, false) => None,
        };

        ClassInfo {
            fields,
            methods,
            constructor,
            is_dataclass: class.is_dataclass,
            field_defaults,
        }
    }

    /// Types a module constant; mutable types are rejected as global state.
    fn constant_type(&mut self, constant: &crate::tir::TirConstant) -> Type {
        let inferred = match &constant.value.kind {
            TirExpressionKind::Integer(_) => Type::Int,
            TirExpressionKind::Float(_) => Type::Float,
            TirExpressionKind::Bool(_) => Type::Bool,
            // a string constant is a static slice in the emitted code
            TirExpressionKind::StringLiteral { .. } => Type::StrSlice,
            _ => {
                self.report(
                    DiagnosticKind::UnsupportedConstruct,
                    constant.position.clone(),
                    "module-level bindings must be scalar or string constants",
                );
                Type::Unknown
            }
        };

        if let Some(declared) = &constant.declared {
            if matches!(
                declared,
                Type::Sequence(_) | Type::Mapping(..) | Type::Set(_) | Type::Guarded(_) | Type::Shared(_)
            ) {
                self.report(
                    DiagnosticKind::UnsupportedConstruct,
                    constant.position.clone(),
                    "module-level mutable state is outside the supported subset",
                );
            } else if !matches!(inferred, Type::Unknown) && !declared.accepts(&inferred) {
                let declared = declared.clone();
                let inferred = inferred.clone();
                self.report(
                    DiagnosticKind::TypeMismatch,
                    constant.position.clone(),
                    format!("cannot initialize '{}: {declared}' with '{inferred}'", constant.name),
                );
            }
        }
        if inferred == Type::StrSlice {
            Type::StrSlice
        } else {
            constant.declared.clone().unwrap_or(inferred)
        }
    }

    // --- module analysis ---------------------------------------------------

    fn analyze_module(&mut self, module: &TirModule) {
        self.file = module.file.clone();
        debug!("analyzing module '{}'", module.path);

        for class in &module.classes {
            for field in &class.fields {
                self.validate_annotation(&field.ty, &field.position);
            }
            if !class.bases.is_empty() {
                self.report_with_note(
                    DiagnosticKind::UnsupportedConstruct,
                    class.position.clone(),
                    format!("class '{}' uses inheritance, which is not supported", class.name),
                    "safe translation would require trait synthesis the subset cannot express",
                );
            }

            self.current_class = Some(class.name.clone());
            if let Some(constructor) = &class.constructor {
                self.analyze_function(constructor);
            }
            for method in &class.methods {
                self.analyze_function(method);
            }
            self.current_class = None;
        }

        for function in &module.functions {
            self.analyze_function(function);
        }

        for statement in &module.top_level {
            self.analyze_top_level(statement);
        }
    }

    /// The only allowed bare top-level statement is `asyncio.run(main())`,
    /// which is deleted; the emitter attaches the runtime attribute instead.
    fn analyze_top_level(&mut self, statement: &TirStatement) {
        if let TirStatementKind::Expression(expression) = &statement.kind {
            if let TirExpressionKind::Call { callee, args } = &expression.kind {
                if let TirCallee::Function { path, .. } = callee {
                    if path == "asyncio.run" && args.len() == 1 {
                        return;
                    }
                }
            }
        }
        self.report(
            DiagnosticKind::UnsupportedConstruct,
            statement.position.clone(),
            "top-level statements other than 'asyncio.run(main())' are outside the supported subset",
        );
    }

    fn analyze_function(&mut self, function: &TirFunction) {
        self.current_function = function.id;
        self.current_is_async = function.is_async;
        self.current_ret = function.ret.clone().unwrap_or(Type::Unit);

        self.scopes.push(IndexMap::new());

        if function.has_receiver {
            let class = self.current_class.clone().unwrap_or_default();
            self.insert_local(
                "self",
                Local {
                    ty: Type::named(class),
                    binding: BindingRef::Receiver,
                },
            );
        }

        for param in &function.params {
            if param.default.is_some() {
                self.report(
                    DiagnosticKind::UnsupportedConstruct,
                    param.position.clone(),
                    "parameter defaults are only supported on dataclass fields",
                );
            }
            if let Some(ty) = &param.ty {
                self.validate_annotation(ty, &param.position);
            }
            self.insert_local(
                &param.name,
                Local {
                    ty: param.ty.clone().unwrap_or(Type::Unknown),
                    binding: BindingRef::Param(param.id),
                },
            );
        }
        if let Some(ret) = &function.ret {
            self.validate_annotation(ret, &function.position);
        }

        self.analyze_statements(&function.body);
        self.scopes.pop();
        self.flush_pending_finds();
    }

    fn flush_pending_finds(&mut self) {
        let pending: Vec<_> = self.pending_finds.drain(..).collect();
        for (_, position) in pending {
            self.report(
                DiagnosticKind::UnsupportedConstruct,
                position,
                "'str.find' is only supported in comparisons against 0 or -1",
            );
        }
    }

    // --- scopes ------------------------------------------------------------

    pub(crate) fn insert_local(&mut self, name: &str, local: Local) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), local);
        }
    }

    pub(crate) fn lookup_local(&self, name: &str) -> Option<Local> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name)).cloned()
    }

    pub(crate) fn mark_mutable(&mut self, binding: BindingRef) {
        match binding {
            BindingRef::Statement(id) => {
                if let Some(info) = self.annotations.bindings.get_mut(&id) {
                    info.mutable = true;
                }
            }
            BindingRef::Target(id) => {
                if let Some(info) = self.annotations.target_bindings.get_mut(&id) {
                    info.mutable = true;
                }
            }
            BindingRef::Param(id) => {
                self.annotations.mutable_params.insert(id);
            }
            BindingRef::Receiver => {
                self.annotations.exclusive_methods.insert(self.current_function);
            }
            BindingRef::Opaque => {}
        }
    }

    /// The binding a mutation through `expr` lands on, if any.
    pub(crate) fn root_binding(&self, expression: &TirExpression) -> Option<BindingRef> {
        match &expression.kind {
            TirExpressionKind::Name(name) => self.lookup_local(name).map(|local| local.binding),
            TirExpressionKind::Attribute { object, .. } => self.root_binding(object),
            TirExpressionKind::Index { object, .. } => self.root_binding(object),
            TirExpressionKind::Await(inner) => self.root_binding(inner),
            _ => None,
        }
    }

    pub(crate) fn mark_root_mutable(&mut self, expression: &TirExpression) {
        if let Some(binding) = self.root_binding(expression) {
            self.mark_mutable(binding);
        }
    }

    pub(crate) fn defer_receiver_mutation(&mut self, receiver: &TirExpression, method: NodeId) {
        if let Some(binding) = self.root_binding(receiver) {
            self.pending_receiver_mutations.push((binding, self.current_function, method));
        }
    }

    /// Marks receiver locals of exclusive user methods mutable.
    ///
    /// Exclusivity can flow through `self` (`self.helper()` where `helper`
    /// mutates), so iterate to a fixpoint; the chain length is bounded by
    /// the number of methods.
    fn resolve_pending_receiver_mutations(&mut self) {
        loop {
            let mut changed = false;
            for (binding, caller, method) in self.pending_receiver_mutations.clone() {
                if !self.annotations.exclusive_methods.contains(&method) {
                    continue;
                }
                match binding {
                    BindingRef::Receiver => {
                        if self.annotations.exclusive_methods.insert(caller) {
                            changed = true;
                        }
                    }
                    other => {
                        let before = self.is_marked_mutable(other);
                        self.mark_mutable_direct(other);
                        if !before {
                            changed = true;
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    fn is_marked_mutable(&self, binding: BindingRef) -> bool {
        match binding {
            BindingRef::Statement(id) => self.annotations.bindings.get(&id).map(|info| info.mutable).unwrap_or(false),
            BindingRef::Target(id) => self
                .annotations
                .target_bindings
                .get(&id)
                .map(|info| info.mutable)
                .unwrap_or(false),
            BindingRef::Param(id) => self.annotations.mutable_params.contains(&id),
            _ => false,
        }
    }

    fn mark_mutable_direct(&mut self, binding: BindingRef) {
        match binding {
            BindingRef::Statement(id) => {
                if let Some(info) = self.annotations.bindings.get_mut(&id) {
                    info.mutable = true;
                }
            }
            BindingRef::Target(id) => {
                if let Some(info) = self.annotations.target_bindings.get_mut(&id) {
                    info.mutable = true;
                }
            }
            BindingRef::Param(id) => {
                self.annotations.mutable_params.insert(id);
            }
            _ => {}
        }
    }

    // --- statements --------------------------------------------------------

    fn analyze_statements(&mut self, statements: &[TirStatement]) {
        for statement in statements {
            self.analyze_statement(statement);
        }
    }

    fn analyze_block(&mut self, statements: &[TirStatement]) {
        self.scopes.push(IndexMap::new());
        self.analyze_statements(statements);
        self.scopes.pop();
    }

    fn analyze_statement(&mut self, statement: &TirStatement) {
        match &statement.kind {
            TirStatementKind::Assign { target, declared, value } => {
                self.analyze_assign(statement.id, target, declared.as_ref(), value);
            }
            TirStatementKind::Expression(expression) => {
                self.infer_expression(expression);
            }
            TirStatementKind::Return(value) => self.analyze_return(statement, value.as_ref()),
            TirStatementKind::If { branches, else_body } => {
                for (condition, body) in branches {
                    self.expect_condition(condition);
                    self.analyze_block(body);
                }
                if let Some(body) = else_body {
                    self.analyze_block(body);
                }
            }
            TirStatementKind::While { condition, body } => {
                self.expect_condition(condition);
                self.analyze_block(body);
            }
            TirStatementKind::For { target, iterable, body } => {
                self.analyze_for(statement, target, iterable, body);
            }
            TirStatementKind::Scoped { resource, binding, body } => {
                self.analyze_scoped(resource, binding.as_deref(), body);
            }
            TirStatementKind::Break | TirStatementKind::Continue | TirStatementKind::Pass => {}
        }
    }

    fn expect_condition(&mut self, condition: &TirExpression) {
        let ty = self.infer_expression(condition);
        if !matches!(ty, Type::Bool | Type::Never | Type::Unknown) {
            self.report(
                DiagnosticKind::TypeMismatch,
                condition.position.clone(),
                format!("condition must be 'bool', found '{ty}'"),
            );
        }
    }

    fn analyze_return(&mut self, statement: &TirStatement, value: Option<&TirExpression>) {
        match value {
            Some(value) => {
                let ty = self.infer_expression(value);
                let expected = self.current_ret.clone();
                if !expected.accepts(&ty) {
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        value.position.clone(),
                        format!("return type mismatch: expected '{expected}', found '{ty}'"),
                    );
                }
            }
            None => {
                if !matches!(self.current_ret, Type::Unit) {
                    let expected = self.current_ret.clone();
                    self.report(
                        DiagnosticKind::TypeMismatch,
                        statement.position.clone(),
                        format!("return without a value in a function returning '{expected}'"),
                    );
                }
            }
        }
    }

    fn analyze_assign(
        &mut self,
        statement_id: NodeId,
        target: &TirTarget,
        declared: Option<&Type>,
        value: &TirExpression,
    ) {
        if let Some(declared) = declared {
            self.validate_annotation(declared, &value.position);
        }
        let value_ty = self.infer_expression(value);

        // error propagation: a fallible call bound inside a fallible
        // function unwraps through `?`, unless the binding itself is
        // declared fallible
        let mut bound_ty = value_ty.clone();
        if let Type::Fallible(ok, err) = &value_ty {
            let declared_fallible = matches!(declared, Some(Type::Fallible(..)));
            let call_like = matches!(
                &value.kind,
                TirExpressionKind::Call { .. } | TirExpressionKind::Await(_)
            );
            if !declared_fallible && call_like {
                if let Type::Fallible(_, ret_err) = &self.current_ret {
                    if ret_err.accepts(err) || err.accepts(ret_err) {
                        self.annotations.propagations.insert(value.id);
                        bound_ty = (**ok).clone();
                    }
                }
            }
        }

        match target {
            TirTarget::Name { name, position, .. } => {
                if let Some(local) = self.lookup_local(name) {
                    if !local.ty.accepts(&bound_ty) && !bound_ty.accepts(&local.ty) {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            position.clone(),
                            format!("cannot assign '{bound_ty}' to '{name}' of type '{}'", local.ty),
                        );
                    }
                    self.mark_mutable(local.binding);
                } else {
                    let ty = match declared {
                        Some(declared) => {
                            if !declared.accepts(&bound_ty) {
                                self.report(
                                    DiagnosticKind::TypeMismatch,
                                    value.position.clone(),
                                    format!("cannot initialize '{name}: {declared}' with '{bound_ty}'"),
                                );
                            }
                            declared.clone()
                        }
                        None => {
                            if bound_ty.contains_unknown() || matches!(value.kind, TirExpressionKind::NoneLiteral) {
                                self.report_with_note(
                                    DiagnosticKind::UninferableLocal,
                                    position.clone(),
                                    format!("cannot infer the type of '{name}'"),
                                    "add an explicit annotation to the binding",
                                );
                            }
                            bound_ty.clone()
                        }
                    };
                    self.annotations.bindings.insert(
                        statement_id,
                        BindingInfo {
                            name: name.clone(),
                            ty: ty.clone(),
                            mutable: false,
                            annotated: declared.is_some(),
                        },
                    );
                    self.insert_local(
                        name,
                        Local {
                            ty,
                            binding: BindingRef::Statement(statement_id),
                        },
                    );
                }
            }
            TirTarget::Tuple(items) => self.analyze_tuple_binding(items, value, &bound_ty),
            TirTarget::Attribute { object, field } => {
                let object_ty = self.infer_expression(object);
                let field_ty = self.attribute_type(&object_ty, field, object.position.clone());
                if let Some(field_ty) = field_ty {
                    if !field_ty.accepts(&bound_ty) {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            value.position.clone(),
                            format!("cannot assign '{bound_ty}' to field '{field}' of type '{field_ty}'"),
                        );
                    }
                }
                self.mark_root_mutable(object);
            }
            TirTarget::Index { object, index } => {
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
                        if !element.accepts(&bound_ty) {
                            self.report(
                                DiagnosticKind::TypeMismatch,
                                value.position.clone(),
                                format!("cannot assign '{bound_ty}' to an element of '{object_ty}'"),
                            );
                        }
                    }
                    Type::Mapping(key, value_ty) => {
                        if !key.accepts(&index_ty) {
                            self.report(
                                DiagnosticKind::TypeMismatch,
                                index.position.clone(),
                                format!("mapping key must be '{key}', found '{index_ty}'"),
                            );
                        }
                        if !value_ty.accepts(&bound_ty) {
                            self.report(
                                DiagnosticKind::TypeMismatch,
                                value.position.clone(),
                                format!("cannot assign '{bound_ty}' to a value of '{object_ty}'"),
                            );
                        }
                    }
                    Type::Unknown => {}
                    other => {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            object.position.clone(),
                            format!("'{other}' does not support subscript assignment"),
                        );
                    }
                }
                self.mark_root_mutable(object);
            }
        }
    }

    fn analyze_tuple_binding(&mut self, items: &[TirTarget], value: &TirExpression, value_ty: &Type) {
        let element_types = match value_ty {
            Type::Tuple(elements) if elements.len() == items.len() => elements.clone(),
            Type::Unknown => vec![Type::Unknown; items.len()],
            other => {
                self.report(
                    DiagnosticKind::TypeMismatch,
                    value.position.clone(),
                    format!("cannot destructure '{other}' into {} names", items.len()),
                );
                vec![Type::Unknown; items.len()]
            }
        };

        // a two-element destructuring of a channel constructor leaves the
        // receiver side needing exclusive access
        let channel_pair = items.len() == 2 && self.annotations.stub_calls.contains_key(&value.id);

        for (index, (item, element_ty)) in items.iter().zip(element_types).enumerate() {
            match item {
                TirTarget::Name { id, name, position } => {
                    if self.lookup_local(name).is_some() {
                        self.report(
                            DiagnosticKind::UnsupportedConstruct,
                            position.clone(),
                            "reassigning an existing name through tuple unpacking is outside the supported subset",
                        );
                        continue;
                    }
                    let mutable = channel_pair && index == 1;
                    self.annotations.target_bindings.insert(
                        *id,
                        BindingInfo {
                            name: name.clone(),
                            ty: element_ty.clone(),
                            mutable,
                            annotated: false,
                        },
                    );
                    self.insert_local(
                        name,
                        Local {
                            ty: element_ty,
                            binding: BindingRef::Target(*id),
                        },
                    );
                }
                other => {
                    self.report(
                        DiagnosticKind::UnsupportedConstruct,
                        other.position(),
                        "nested patterns in tuple unpacking are outside the supported subset",
                    );
                }
            }
        }
    }

    fn analyze_for(&mut self, statement: &TirStatement, target: &TirTarget, iterable: &TirExpression, body: &[TirStatement]) {
        let iterable_ty = self.infer_expression(iterable);
        let element_ty = match &iterable_ty {
            Type::Sequence(element) | Type::Set(element) => {
                if !matches!(iterable.kind, TirExpressionKind::RangeLiteral { .. }) {
                    self.annotations.borrowed_iterations.insert(statement.id);
                }
                (**element).clone()
            }
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
        self.bind_loop_target(target, &element_ty);
        self.analyze_statements(body);
        self.scopes.pop();
    }

    fn bind_loop_target(&mut self, target: &TirTarget, element_ty: &Type) {
        match target {
            TirTarget::Name { id, name, .. } => {
                self.annotations.target_bindings.insert(
                    *id,
                    BindingInfo {
                        name: name.clone(),
                        ty: element_ty.clone(),
                        mutable: false,
                        annotated: false,
                    },
                );
                self.insert_local(
                    name,
                    Local {
                        ty: element_ty.clone(),
                        binding: BindingRef::Target(*id),
                    },
                );
            }
            TirTarget::Tuple(items) => {
                let element_types = match element_ty {
                    Type::Tuple(elements) if elements.len() == items.len() => elements.clone(),
                    _ => {
                        self.report(
                            DiagnosticKind::TypeMismatch,
                            target.position(),
                            format!("cannot destructure '{element_ty}' in a loop target"),
                        );
                        vec![Type::Unknown; items.len()]
                    }
                };
                for (item, ty) in items.iter().zip(element_types) {
                    self.bind_loop_target(item, &ty);
                }
            }
            other => {
                self.report(
                    DiagnosticKind::UnsupportedConstruct,
                    other.position(),
                    "loop targets must be names or tuples of names",
                );
            }
        }
    }

    /// A `with` resource must come from the stub registry; the statement
    /// lowers to a lexical block holding the acquisition.
    fn analyze_scoped(&mut self, resource: &TirExpression, binding: Option<&str>, body: &[TirStatement]) {
        let resource_ty = self.infer_expression(resource);
        if !self.annotations.stub_calls.contains_key(&resource.id) {
            self.report(
                DiagnosticKind::UnsupportedConstruct,
                resource.position.clone(),
                "'with' resources must be supported scoped constructors (e.g. TemporaryDirectory())",
            );
        }

        self.scopes.push(IndexMap::new());
        if let Some(name) = binding {
            self.insert_local(
                name,
                Local {
                    ty: resource_ty,
                    binding: BindingRef::Opaque,
                },
            );
        }
        self.analyze_statements(body);
        self.scopes.pop();
    }

    // --- entry classification ----------------------------------------------

    fn classify_entry(&mut self, modules: &[TirModule]) {
        for module in modules {
            let Some(main) = module.functions.iter().find(|function| function.name == "main") else {
                continue;
            };
            if main.is_async {
                self.annotations.async_main = true;
            }
            if main.attributes.iter().any(|attribute| attribute.starts_with("#[tokio::main")) {
                self.annotations.entry_attribute_supplied = true;
            }
            if !main.params.is_empty() {
                self.file = module.file.clone();
                self.report(
                    DiagnosticKind::TypeMismatch,
                    main.position.clone(),
                    "'main' must not take parameters",
                );
            }
        }
    }

    /// Safety net for the annotation-completeness invariant.
    ///
    /// Nested unknowns inside container types are tolerated here: an empty
    /// display is polymorphic until its context fixes the element type, and
    /// every path that could leave it unresolved already reported a
    /// diagnostic of its own.
    fn verify_no_unknowns(&mut self, modules: &[TirModule]) {
        if !self.diagnostics.is_empty() {
            return;
        }
        let unresolved = self
            .annotations
            .types
            .iter()
            .find(|(_, ty)| matches!(ty, Type::Unknown))
            .map(|(id, _)| *id);
        if let Some(id) = unresolved {
            let file = modules
                .first()
                .map(|module| module.file.clone())
                .unwrap_or_else(|| SourceFile::new(vec!["<memory>".into()], String::new()));
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                file,
                0..0,
                format!("internal: expression {:?} kept an unresolved type through analysis", id),
            ));
        }
    }

    /// Checks that every nominal type in a written annotation resolves to a
    /// user class or a stub-declared type.
    fn validate_annotation(&mut self, ty: &Type, position: &Range<usize>) {
        match ty {
            Type::Named { path, generics } => {
                let known = self.symbols.classes.contains_key(path)
                    || self.stubs.lookup_type(path).is_some()
                    || (path.len() == 1 && path.chars().all(|c| c.is_ascii_uppercase()));
                if !known {
                    self.report(
                        DiagnosticKind::UnknownSymbol,
                        position.clone(),
                        format!("type '{path}' is neither defined nor declared by a stub package"),
                    );
                }
                for generic in generics {
                    self.validate_annotation(generic, position);
                }
            }
            Type::Sequence(inner) | Type::Set(inner) | Type::Optional(inner) | Type::Shared(inner) | Type::Guarded(inner) => {
                self.validate_annotation(inner, position);
            }
            Type::Mapping(key, value) => {
                self.validate_annotation(key, position);
                self.validate_annotation(value, position);
            }
            Type::Fallible(ok, err) => {
                self.validate_annotation(ok, position);
                self.validate_annotation(err, position);
            }
            Type::Tuple(items) => {
                for item in items {
                    self.validate_annotation(item, position);
                }
            }
            _ => {}
        }
    }

    // --- shared helpers used by expression inference -----------------------

    pub(crate) fn attribute_type(&mut self, object_ty: &Type, field: &str, position: Range<usize>) -> Option<Type> {
        let dispatch = deref_shared(object_ty);
        match dispatch {
            Type::Named { path, .. } => match self.symbols.classes.get(path).and_then(|class| class.fields.get(field)) {
                Some(ty) => Some(ty.clone()),
                None => {
                    self.report(
                        DiagnosticKind::UnknownSymbol,
                        position,
                        format!("type '{path}' has no attribute '{field}'"),
                    );
                    None
                }
            },
            Type::Unknown => None,
            other => {
                let other = other.clone();
                self.report(
                    DiagnosticKind::UnknownSymbol,
                    position,
                    format!("type '{other}' has no attribute '{field}'"),
                );
                None
            }
        }
    }
}

/// Rust auto-derefs through `Arc`, so dispatch does too.
pub(crate) fn deref_shared(ty: &Type) -> &Type {
    match ty {
        Type::Shared(inner) => deref_shared(inner),
        other => other,
    }
}

impl TirTarget {
    pub(crate) fn position(&self) -> Range<usize> {
        match self {
            TirTarget::Name { position, .. } => position.clone(),
            TirTarget::Tuple(items) => items
                .first()
                .map(|item| item.position().start..items.last().map(|last| last.position().end).unwrap_or(0))
                .unwrap_or(0..0),
            TirTarget::Attribute { object, .. } => object.position.clone(),
            TirTarget::Index { object, .. } => object.position.clone(),
        }
    }
}
