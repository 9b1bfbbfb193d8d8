//! Expression emission.
//!
//! This is where the lowering contracts live: postfix `.await`, `?` at
//! propagation sites, `format!`/`println!` translation, the membership and
//! `find`-sentinel rewrites, the string-method table, index casts, and stub
//! template expansion.

use crate::ast::{BinaryOperator, BoolOperator, CompareOperator, UnaryOperator};
use crate::tir::annotations::ArgumentMode;
use crate::tir::{TirCallee, TirClass, TirExpression, TirExpressionKind, TirFStringPart, Type};

use super::Emitter;

impl Emitter<'_> {
    /// Renders an expression, applying the usize-cast and `?`-propagation
    /// annotations recorded for this node.
    pub(crate) fn emit_expression(&mut self, expression: &TirExpression) -> String {
        let mut text = self.emit_expression_inner(expression);
        if self.annotations.usize_casts.contains(&expression.id) {
            text = format!("({text} as usize)");
        }
        if self.annotations.propagations.contains(&expression.id) {
            text.push('?');
        }
        text
    }

    fn emit_expression_inner(&mut self, expression: &TirExpression) -> String {
        match &expression.kind {
            TirExpressionKind::Integer(value) => value.to_string(),
            TirExpressionKind::Float(value) => format!("{value:?}"),
            TirExpressionKind::Bool(value) => value.to_string(),
            TirExpressionKind::NoneLiteral => "None".to_string(),
            TirExpressionKind::StringLiteral { value, owned } => {
                let literal = format!("\"{}\"", escape_str(value));
                if *owned {
                    format!("{literal}.to_string()")
                } else {
                    literal
                }
            }
            TirExpressionKind::FString(parts) => self.format_macro("format!", parts),
            TirExpressionKind::Name(name) => name.clone(),
            TirExpressionKind::Call { callee, args } => self.emit_call(expression, callee, args),
            TirExpressionKind::Attribute { object, field } => {
                let rendered = self.emit_expression(object);
                format!("{rendered}.{field}")
            }
            TirExpressionKind::Index { object, index } => self.emit_index(object, index),
            TirExpressionKind::Unary { op, operand } => match op {
                UnaryOperator::Neg => format!("-{}", self.wrap_operand(operand)),
                UnaryOperator::Not => format!("!{}", self.wrap_operand(operand)),
            },
            TirExpressionKind::Binary { op, left, right } => self.emit_binary(*op, left, right),
            TirExpressionKind::BoolOp { op, left, right } => {
                let symbol = match op {
                    BoolOperator::And => "&&",
                    BoolOperator::Or => "||",
                };
                format!("{} {symbol} {}", self.wrap_operand(left), self.wrap_operand(right))
            }
            TirExpressionKind::Compare { op, left, right } => self.emit_compare(*op, left, right),
            TirExpressionKind::Membership { negated, item, container } => self.emit_membership(*negated, item, container),
            TirExpressionKind::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                let condition = self.emit_expression(condition);
                let then_value = self.emit_expression(then_value);
                let else_value = self.emit_expression(else_value);
                format!("if {condition} {{ {then_value} }} else {{ {else_value} }}")
            }
            TirExpressionKind::Tuple(items) => {
                let rendered: Vec<_> = items.iter().map(|item| self.emit_expression(item)).collect();
                if rendered.len() == 1 {
                    format!("({},)", rendered[0])
                } else {
                    format!("({})", rendered.join(", "))
                }
            }
            TirExpressionKind::List(items) => {
                let rendered: Vec<_> = items.iter().map(|item| self.emit_expression(item)).collect();
                format!("vec![{}]", rendered.join(", "))
            }
            TirExpressionKind::Dict(entries) => {
                self.imports.insert("std::collections::HashMap".to_string());
                if entries.is_empty() {
                    return "HashMap::new()".to_string();
                }
                let rendered: Vec<_> = entries
                    .iter()
                    .map(|(key, value)| {
                        format!("({}, {})", self.emit_expression(key), self.emit_expression(value))
                    })
                    .collect();
                format!("HashMap::from([{}])", rendered.join(", "))
            }
            TirExpressionKind::SetDisplay(items) => {
                self.imports.insert("std::collections::HashSet".to_string());
                if items.is_empty() {
                    return "HashSet::new()".to_string();
                }
                let rendered: Vec<_> = items.iter().map(|item| self.emit_expression(item)).collect();
                format!("HashSet::from([{}])", rendered.join(", "))
            }
            TirExpressionKind::Await(inner) => {
                let rendered = self.emit_expression(inner);
                format!("{rendered}.await")
            }
            TirExpressionKind::Len(inner) => {
                let rendered = self.emit_expression(inner);
                format!("{rendered}.len() as i64")
            }
            TirExpressionKind::RangeLiteral { start, end } => {
                format!("{}..{}", self.wrap_operand(start), self.wrap_operand(end))
            }
            TirExpressionKind::SharedNew(inner) => {
                self.imports.insert("std::sync::Arc".to_string());
                let rendered = self.emit_expression(inner);
                format!("Arc::new({rendered})")
            }
            TirExpressionKind::GuardedNew(inner) => {
                self.requirements
                    .insert(crate::stubs::BuildRequirement::new("tokio", "1", &["full"]));
                let rendered = self.emit_expression(inner);
                format!("tokio::sync::Mutex::new({rendered})")
            }
            TirExpressionKind::ResultLiteral { is_ok, value } => {
                let rendered = self.emit_expression(value);
                if *is_ok {
                    format!("Ok({rendered})")
                } else {
                    format!("Err({rendered})")
                }
            }
            TirExpressionKind::Comprehension {
                element,
                variable,
                iterable,
                condition,
            } => self.emit_comprehension(element, variable, iterable, condition.as_deref()),
        }
    }

    /// Parenthesizes compound operands.
    fn wrap_operand(&mut self, operand: &TirExpression) -> String {
        let text = self.emit_expression(operand);
        if matches!(
            operand.kind,
            TirExpressionKind::Binary { .. }
                | TirExpressionKind::BoolOp { .. }
                | TirExpressionKind::Compare { .. }
                | TirExpressionKind::Membership { .. }
                | TirExpressionKind::Conditional { .. }
        ) && !self.annotations.usize_casts.contains(&operand.id)
        {
            format!("({text})")
        } else {
            text
        }
    }

    // --- calls -------------------------------------------------------------

    fn emit_call(&mut self, expression: &TirExpression, callee: &TirCallee, args: &[TirExpression]) -> String {
        // stub resolutions expand their template instead of emitting a call
        if let Some(stub) = self.annotations.stub_calls.get(&expression.id).cloned() {
            for import in &stub.imports {
                self.imports.insert(import.clone());
            }
            if let Some(requirement) = &stub.requirement {
                self.requirements.insert(requirement.clone());
            }
            let receiver_text = match callee {
                TirCallee::Method { receiver, .. } => Some(self.emit_expression(receiver)),
                TirCallee::Function { .. } => None,
            };
            let arg_texts: Vec<_> = args.iter().map(|arg| self.emit_argument(arg)).collect();
            return expand_template(&stub.template, receiver_text.as_deref(), &arg_texts);
        }

        match callee {
            TirCallee::Function { path, .. } => self.emit_function_call(path, args),
            TirCallee::Method { receiver, name, .. } => self.emit_method_call(receiver, name, args),
        }
    }

    fn emit_function_call(&mut self, path: &str, args: &[TirExpression]) -> String {
        if path == "print" {
            return self.emit_print(args);
        }

        if let Some(class) = self.find_class(path) {
            return self.emit_constructor_call(&class, args);
        }

        let rendered_path = path.replace('.', "::");
        let arg_texts: Vec<_> = args.iter().map(|arg| self.emit_argument(arg)).collect();
        format!("{rendered_path}({})", arg_texts.join(", "))
    }

    fn find_class(&self, name: &str) -> Option<TirClass> {
        self.modules
            .iter()
            .flat_map(|module| module.classes.iter())
            .find(|class| class.name == name)
            .cloned()
    }

    /// Constructor calls; dataclass defaults pad with `Some(..)` / `None`.
    fn emit_constructor_call(&mut self, class: &TirClass, args: &[TirExpression]) -> String {
        let mut arg_texts = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            let text = self.emit_argument(arg);
            let defaulted = class.is_dataclass && class.fields.get(index).map(|field| field.default.is_some()).unwrap_or(false);
            if defaulted {
                arg_texts.push(format!("Some({text})"));
            } else {
                arg_texts.push(text);
            }
        }
        if class.is_dataclass {
            for field in class.fields.iter().skip(args.len()) {
                if field.default.is_some() {
                    arg_texts.push("None".to_string());
                }
            }
        }
        format!("{}::new({})", class.name, arg_texts.join(", "))
    }

    fn emit_print(&mut self, args: &[TirExpression]) -> String {
        match args {
            [] => "println!()".to_string(),
            [single] => {
                if let TirExpressionKind::FString(parts) = &single.kind {
                    let parts = parts.clone();
                    self.format_macro("println!", &parts)
                } else {
                    let rendered = self.emit_expression(single);
                    format!("println!(\"{{}}\", {rendered})")
                }
            }
            many => {
                let template = vec!["{}"; many.len()].join(" ");
                let rendered: Vec<_> = many.iter().map(|arg| self.emit_expression(arg)).collect();
                format!("println!(\"{template}\", {})", rendered.join(", "))
            }
        }
    }

    /// Fixed translation table for methods on strings, containers and the
    /// async mutex; anything else is a user method call.
    fn emit_method_call(&mut self, receiver: &TirExpression, name: &str, args: &[TirExpression]) -> String {
        let receiver_ty = self.annotations.type_of(receiver.id);
        let dispatch_ty = strip_shared(&receiver_ty);
        let rendered = self.emit_expression(receiver);

        match (&dispatch_ty, name) {
            (ty, "upper") if ty.is_stringy() => format!("{rendered}.to_uppercase()"),
            (ty, "lower") if ty.is_stringy() => format!("{rendered}.to_lowercase()"),
            (ty, "strip") if ty.is_stringy() => format!("{rendered}.trim().to_string()"),
            (ty, "startswith") if ty.is_stringy() => {
                format!("{rendered}.starts_with({})", self.emit_pattern(&args[0]))
            }
            (ty, "endswith") if ty.is_stringy() => {
                format!("{rendered}.ends_with({})", self.emit_pattern(&args[0]))
            }
            (ty, "split") if ty.is_stringy() => format!(
                "{rendered}.split({}).map(|part| part.to_string()).collect::<Vec<String>>()",
                self.emit_pattern(&args[0])
            ),
            (ty, "join") if ty.is_stringy() => {
                let list = self.emit_expression(&args[0]);
                let separator = self.emit_pattern_text(receiver, rendered);
                format!("{list}.join({separator})")
            }
            (ty, "isdigit") if ty.is_stringy() => {
                format!("{rendered}.chars().all(|c| c.is_ascii_digit())")
            }
            (ty, "replace") if ty.is_stringy() => format!(
                "{rendered}.replace({}, {})",
                self.emit_pattern(&args[0]),
                self.emit_pattern(&args[1])
            ),
            (Type::Sequence(_), "append") => format!("{rendered}.push({})", self.emit_argument(&args[0])),
            (Type::Sequence(_), "pop") => format!("{rendered}.pop()"),
            (Type::Sequence(_), "insert") => format!(
                "{rendered}.insert({}, {})",
                self.emit_index_expression(&args[0]),
                self.emit_argument(&args[1])
            ),
            (Type::Sequence(_), "extend") => format!("{rendered}.extend({})", self.emit_argument(&args[0])),
            (Type::Sequence(_), "sort") => format!("{rendered}.sort()"),
            (Type::Sequence(_) | Type::Mapping(..) | Type::Set(_), "clear") => format!("{rendered}.clear()"),
            (Type::Mapping(..), "get") => format!("{rendered}.get({}).cloned()", self.borrowed_ref(&args[0])),
            (Type::Mapping(..), "keys") => format!("{rendered}.keys().cloned().collect::<Vec<_>>()"),
            (Type::Mapping(..), "values") => format!("{rendered}.values().cloned().collect::<Vec<_>>()"),
            (Type::Set(_), "add") => format!("{rendered}.insert({})", self.emit_argument(&args[0])),
            (Type::Set(_), "remove") => format!("{rendered}.remove({})", self.borrowed_ref(&args[0])),
            (Type::Guarded(_), "lock") => format!("{rendered}.lock()"),
            (_, "clone") => format!("{rendered}.clone()"),
            _ => {
                let arg_texts: Vec<_> = args.iter().map(|arg| self.emit_argument(arg)).collect();
                format!("{rendered}.{name}({})", arg_texts.join(", "))
            }
        }
    }

    /// An argument with its analyzer-decided passing mode applied.
    pub(crate) fn emit_argument(&mut self, arg: &TirExpression) -> String {
        let text = self.emit_expression(arg);
        match self.annotations.argument_modes.get(&arg.id) {
            Some(ArgumentMode::CloneValue) => format!("{text}.clone()"),
            Some(ArgumentMode::ToOwned) => format!("{text}.to_string()"),
            Some(ArgumentMode::Borrow) => format!("&{text}"),
            Some(ArgumentMode::BorrowMut) => format!("&mut {text}"),
            Some(ArgumentMode::Value) | None => text,
        }
    }

    /// Keys and values moved into a container: names of non-scalar type
    /// clone so the local survives the statement.
    pub(crate) fn emit_owned_argument(&mut self, arg: &TirExpression) -> String {
        let text = self.emit_expression(arg);
        let is_name = matches!(arg.kind, TirExpressionKind::Name(_));
        let ty = self.annotations.type_of(arg.id);
        if is_name && !ty.is_scalar() && !matches!(ty, Type::Shared(_)) {
            format!("{text}.clone()")
        } else {
            text
        }
    }

    /// `&x` for non-literal operands of `contains`/`get`/`remove`.
    fn borrowed_ref(&mut self, arg: &TirExpression) -> String {
        // a string literal is already a reference
        if let TirExpressionKind::StringLiteral { value, .. } = &arg.kind {
            return format!("\"{}\"", escape_str(value));
        }
        let text = self.emit_expression(arg);
        format!("&{text}")
    }

    /// String-method patterns: literals stay literals, names borrow.
    fn emit_pattern(&mut self, arg: &TirExpression) -> String {
        match &arg.kind {
            TirExpressionKind::StringLiteral { value, .. } => format!("\"{}\"", escape_str(value)),
            _ => {
                let text = self.emit_expression(arg);
                format!("&{text}")
            }
        }
    }

    fn emit_pattern_text(&mut self, receiver: &TirExpression, rendered: String) -> String {
        match &receiver.kind {
            TirExpressionKind::StringLiteral { value, .. } => format!("\"{}\"", escape_str(value)),
            _ => format!("&{rendered}"),
        }
    }

    pub(crate) fn emit_index_expression(&mut self, index: &TirExpression) -> String {
        let text = self.emit_expression(index);
        if !self.annotations.index_casts.contains(&index.id) {
            return text;
        }
        if matches!(
            index.kind,
            TirExpressionKind::Name(_) | TirExpressionKind::Integer(_) | TirExpressionKind::Attribute { .. }
        ) {
            format!("{text} as usize")
        } else {
            format!("({text}) as usize")
        }
    }

    fn emit_index(&mut self, object: &TirExpression, index: &TirExpression) -> String {
        let object_ty = self.annotations.type_of(object.id);
        let rendered = self.emit_expression(object);
        match strip_shared(&object_ty) {
            Type::Mapping(..) => format!("{rendered}[{}]", self.borrowed_ref(index)),
            Type::Tuple(_) => {
                let field = self.emit_expression(index);
                format!("{rendered}.{field}")
            }
            _ => format!("{rendered}[{}]", self.emit_index_expression(index)),
        }
    }

    // --- operators ---------------------------------------------------------

    fn emit_binary(&mut self, op: BinaryOperator, left: &TirExpression, right: &TirExpression) -> String {
        let left_ty = self.annotations.type_of(left.id);
        let right_ty = self.annotations.type_of(right.id);

        // string concatenation: owned left, borrowed right
        if op == BinaryOperator::Add && left_ty.is_stringy() && right_ty.is_stringy() {
            let left_text = match &left.kind {
                TirExpressionKind::StringLiteral { value, owned: false } => {
                    format!("\"{}\".to_string()", escape_str(value))
                }
                _ => self.wrap_operand(left),
            };
            let right_text = match &right.kind {
                TirExpressionKind::StringLiteral { value, .. } => format!("\"{}\"", escape_str(value)),
                _ => format!("&{}", self.wrap_operand(right)),
            };
            return format!("{left_text} + {right_text}");
        }

        // float floor division keeps the flooring
        if op == BinaryOperator::FloorDiv && (left_ty == Type::Float || right_ty == Type::Float) {
            return format!("({} / {}).floor()", self.wrap_operand(left), self.wrap_operand(right));
        }

        format!("{} {} {}", self.wrap_operand(left), op.symbol(), self.wrap_operand(right))
    }

    fn emit_compare(&mut self, op: CompareOperator, left: &TirExpression, right: &TirExpression) -> String {
        if let Some(text) = self.try_emit_find_contains(op, left, right) {
            return text;
        }

        if matches!(op, CompareOperator::Is | CompareOperator::IsNot) {
            let rendered = self.wrap_operand(left);
            return if op == CompareOperator::Is {
                format!("{rendered}.is_none()")
            } else {
                format!("{rendered}.is_some()")
            };
        }

        let left_text = self.emit_comparison_operand(left, right);
        let right_text = self.emit_comparison_operand(right, left);
        format!("{left_text} {} {right_text}", op.symbol())
    }

    /// In a comparison against `len()`, the length side stays `usize` when
    /// the other side was cast (or is a literal the compiler infers).
    fn emit_comparison_operand(&mut self, side: &TirExpression, other: &TirExpression) -> String {
        if let TirExpressionKind::Len(inner) = &side.kind {
            let other_cast = self.annotations.usize_casts.contains(&other.id)
                || matches!(other.kind, TirExpressionKind::Integer(_));
            if other_cast {
                let rendered = self.emit_expression(inner);
                return format!("{rendered}.len()");
            }
        }
        self.wrap_operand(side)
    }

    /// `y.find(x) >= 0` and friends become `contains` tests.
    fn try_emit_find_contains(&mut self, op: CompareOperator, left: &TirExpression, right: &TirExpression) -> Option<String> {
        let (find, sentinel, op) = if is_find_call(left) {
            (left, right, op)
        } else if is_find_call(right) {
            (right, left, flip(op))
        } else {
            return None;
        };

        let sentinel = integer_value(sentinel)?;
        let positive = match (op, sentinel) {
            (CompareOperator::GtEq, 0) | (CompareOperator::NotEq, -1) => true,
            (CompareOperator::Lt, 0) | (CompareOperator::Eq, -1) => false,
            _ => return None,
        };

        let TirExpressionKind::Call {
            callee: TirCallee::Method { receiver, .. },
            args,
        } = &find.kind
        else {
            return None;
        };
        let receiver = (**receiver).clone();
        let args = args.clone();

        let rendered = self.emit_expression(&receiver);
        let pattern = self.emit_pattern(&args[0]);
        if positive {
            Some(format!("{rendered}.contains({pattern})"))
        } else {
            Some(format!("!{rendered}.contains({pattern})"))
        }
    }

    fn emit_membership(&mut self, negated: bool, item: &TirExpression, container: &TirExpression) -> String {
        let container_ty = self.annotations.type_of(container.id);
        let method = match strip_shared(&container_ty) {
            Type::Mapping(..) => "contains_key",
            _ => "contains",
        };
        let rendered = self.emit_expression(container);
        let rendered = if matches!(container.kind, TirExpressionKind::RangeLiteral { .. }) {
            format!("({rendered})")
        } else {
            rendered
        };
        let item_text = self.borrowed_ref(item);
        let bang = if negated { "!" } else { "" };
        format!("{bang}{rendered}.{method}({item_text})")
    }

    fn emit_comprehension(
        &mut self,
        element: &TirExpression,
        variable: &str,
        iterable: &TirExpression,
        condition: Option<&TirExpression>,
    ) -> String {
        let source = if matches!(iterable.kind, TirExpressionKind::RangeLiteral { .. }) {
            let rendered = self.emit_expression(iterable);
            format!("({rendered})")
        } else {
            let rendered = self.emit_expression(iterable);
            format!("{rendered}.iter().cloned()")
        };

        // filter_map keeps the loop variable owned inside the closure
        let rendered_element = self.emit_expression(element);
        let mut chain = source;
        match condition {
            Some(condition) => {
                let rendered = self.emit_expression(condition);
                chain.push_str(&format!(
                    ".filter_map(|{variable}| if {rendered} {{ Some({rendered_element}) }} else {{ None }})"
                ));
            }
            None => chain.push_str(&format!(".map(|{variable}| {rendered_element})")),
        }
        chain.push_str(".collect::<Vec<_>>()");
        chain
    }

    /// Builds `format!`/`println!` text from f-string parts.
    fn format_macro(&mut self, name: &str, parts: &[TirFStringPart]) -> String {
        let mut template = String::new();
        let mut args = Vec::new();
        for part in parts {
            match part {
                TirFStringPart::Literal(text) => template.push_str(&escape_template(text)),
                TirFStringPart::Interpolation { expression, spec } => {
                    template.push('{');
                    if let Some(spec) = spec {
                        template.push(':');
                        template.push_str(spec);
                    }
                    template.push('}');
                    args.push(self.emit_expression(expression));
                }
            }
        }
        if args.is_empty() {
            format!("{name}(\"{template}\")")
        } else {
            format!("{name}(\"{template}\", {})", args.join(", "))
        }
    }
}

/// Pure textual substitution of a stub template.
///
/// `{self}` is the receiver, `{arg0}`, `{arg1}`, … the positional
/// arguments. The result is spliced into the output as-is; it never
/// re-enters the parser.
fn expand_template(template: &str, receiver: Option<&str>, args: &[String]) -> String {
    let mut text = template.to_string();
    if let Some(receiver) = receiver {
        text = text.replace("{self}", receiver);
    }
    for (index, arg) in args.iter().enumerate() {
        text = text.replace(&format!("{{arg{index}}}"), arg);
    }
    text
}

fn is_find_call(expression: &TirExpression) -> bool {
    matches!(
        &expression.kind,
        TirExpressionKind::Call {
            callee: TirCallee::Method { name, .. },
            ..
        } if name == "find"
    )
}

fn integer_value(expression: &TirExpression) -> Option<i64> {
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

fn flip(op: CompareOperator) -> CompareOperator {
    match op {
        CompareOperator::Lt => CompareOperator::Gt,
        CompareOperator::LtEq => CompareOperator::GtEq,
        CompareOperator::Gt => CompareOperator::Lt,
        CompareOperator::GtEq => CompareOperator::LtEq,
        other => other,
    }
}

fn strip_shared(ty: &Type) -> &Type {
    match ty {
        Type::Shared(inner) => strip_shared(inner),
        other => other,
    }
}

/// Escapes a string for a Rust string literal.
pub(crate) fn escape_str(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            '\0' => escaped.push_str("\\0"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Escapes a literal f-string part for a format template.
fn escape_template(value: &str) -> String {
    escape_str(value).replace('{', "{{").replace('}', "}}")
}
