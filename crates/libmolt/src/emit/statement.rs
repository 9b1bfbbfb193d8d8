//! Statement emission.

use crate::tir::{TirExpression, TirStatement, TirStatementKind, TirTarget, Type};

use super::Emitter;

impl Emitter<'_> {
    pub(crate) fn emit_statement(&mut self, statement: &TirStatement) {
        match &statement.kind {
            TirStatementKind::Assign { target, value, .. } => self.emit_assign(statement, target, value),
            TirStatementKind::Expression(expression) => {
                let rendered = self.emit_expression(expression);
                self.write_line(&format!("{rendered};"));
            }
            TirStatementKind::Return(value) => match value {
                Some(value) => {
                    let rendered = self.emit_expression(value);
                    self.write_line(&format!("return {rendered};"));
                }
                None => self.write_line("return;"),
            },
            TirStatementKind::If { branches, else_body } => {
                for (index, (condition, body)) in branches.iter().enumerate() {
                    let rendered = self.emit_expression(condition);
                    let keyword = if index == 0 { "if" } else { "} else if" };
                    self.write_line(&format!("{keyword} {rendered} {{"));
                    self.indent += 1;
                    self.emit_statements(body);
                    self.indent -= 1;
                }
                if let Some(body) = else_body {
                    self.write_line("} else {");
                    self.indent += 1;
                    self.emit_statements(body);
                    self.indent -= 1;
                }
                self.write_line("}");
            }
            TirStatementKind::While { condition, body } => {
                let rendered = self.emit_expression(condition);
                self.write_line(&format!("while {rendered} {{"));
                self.indent += 1;
                self.emit_statements(body);
                self.indent -= 1;
                self.write_line("}");
            }
            TirStatementKind::For { target, iterable, body } => self.emit_for(statement, target, iterable, body),
            TirStatementKind::Scoped { resource, binding, body } => {
                // the lexical block is the resource's lifetime; its closing
                // brace is the release point
                let rendered = self.emit_expression(resource);
                self.write_line("{");
                self.indent += 1;
                match binding {
                    Some(name) => self.write_line(&format!("let {name} = {rendered};")),
                    None => self.write_line(&format!("let _scope = {rendered};")),
                }
                self.emit_statements(body);
                self.indent -= 1;
                self.write_line("}");
            }
            TirStatementKind::Break => self.write_line("break;"),
            TirStatementKind::Continue => self.write_line("continue;"),
            TirStatementKind::Pass => {}
        }
    }

    pub(crate) fn emit_statements(&mut self, statements: &[TirStatement]) {
        for statement in statements {
            self.emit_statement(statement);
        }
    }

    fn emit_assign(&mut self, statement: &TirStatement, target: &TirTarget, value: &TirExpression) {
        let rendered_value = self.emit_expression(value);

        match target {
            TirTarget::Name { name, .. } => {
                if let Some(info) = self.annotations.binding(statement.id).cloned() {
                    let mutable = if info.mutable { "mut " } else { "" };
                    if info.annotated {
                        let rendered_ty = self.render_type(&info.ty);
                        self.write_line(&format!("let {mutable}{name}: {rendered_ty} = {rendered_value};"));
                    } else {
                        self.write_line(&format!("let {mutable}{name} = {rendered_value};"));
                    }
                } else {
                    self.write_line(&format!("{name} = {rendered_value};"));
                }
            }
            TirTarget::Tuple(items) => {
                let pattern = self.render_tuple_pattern(items);
                self.write_line(&format!("let {pattern} = {rendered_value};"));
            }
            TirTarget::Attribute { object, field } => {
                let rendered_object = self.emit_expression(object);
                self.write_line(&format!("{rendered_object}.{field} = {rendered_value};"));
            }
            TirTarget::Index { object, index } => {
                let object_ty = self.annotations.type_of(object.id);
                let rendered_object = self.emit_expression(object);
                match object_ty {
                    Type::Mapping(..) => {
                        // mapping writes are inserts; keys clone so the
                        // local stays usable across iterations
                        let key = self.emit_owned_argument(index);
                        self.write_line(&format!("{rendered_object}.insert({key}, {rendered_value});"));
                    }
                    _ => {
                        let rendered_index = self.emit_index_expression(index);
                        self.write_line(&format!("{rendered_object}[{rendered_index}] = {rendered_value};"));
                    }
                }
            }
        }
    }

    fn render_tuple_pattern(&self, items: &[TirTarget]) -> String {
        let mut parts = Vec::new();
        for item in items {
            match item {
                TirTarget::Name { id, name, .. } => {
                    let mutable = self
                        .annotations
                        .target_bindings
                        .get(id)
                        .map(|info| info.mutable)
                        .unwrap_or(false);
                    if mutable {
                        parts.push(format!("mut {name}"));
                    } else {
                        parts.push(name.clone());
                    }
                }
                TirTarget::Tuple(nested) => parts.push(self.render_tuple_pattern(nested)),
                _ => parts.push("_".to_string()),
            }
        }
        format!("({})", parts.join(", "))
    }

    fn emit_for(&mut self, statement: &TirStatement, target: &TirTarget, iterable: &TirExpression, body: &[TirStatement]) {
        let pattern = match target {
            TirTarget::Name { id, name, .. } => {
                let mutable = self
                    .annotations
                    .target_bindings
                    .get(id)
                    .map(|info| info.mutable)
                    .unwrap_or(false);
                if mutable {
                    format!("mut {name}")
                } else {
                    name.clone()
                }
            }
            TirTarget::Tuple(items) => self.render_tuple_pattern(items),
            _ => "_".to_string(),
        };

        let rendered_iterable = self.emit_expression(iterable);
        let rendered_iterable = if self.annotations.borrowed_iterations.contains(&statement.id) {
            format!("&{rendered_iterable}")
        } else {
            rendered_iterable
        };

        self.write_line(&format!("for {pattern} in {rendered_iterable} {{"));
        self.indent += 1;
        self.emit_statements(body);
        self.indent -= 1;
        self.write_line("}");
    }
}
