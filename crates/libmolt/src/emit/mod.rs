//! Rust source emitter.
//!
//! Walks the annotated TIR and writes one Rust file per module. All the
//! semantic decisions were made by the analyzer; the emitter only reads the
//! annotation tables, which makes emission deterministic: the same annotated
//! TIR always produces byte-identical output.
//!
//! Imports accumulate in an ordered set and are written sorted above the
//! body; build requirements collected here (from stub expansions and type
//! renderings) flow into the synthesized manifest.

use indexmap::IndexSet;
use log::debug;

use crate::stubs::{BuildRequirement, StubRegistry};
use crate::tir::annotations::Annotations;
use crate::tir::{TirClass, TirConstant, TirExpressionKind, TirFunction, TirModule};

mod expression;
mod statement;
mod types;

/// A fully emitted module.
#[derive(Debug, Clone)]
pub struct EmittedModule {
    pub name: String,
    pub is_entry: bool,
    pub text: String,
    pub requirements: Vec<BuildRequirement>,
}

/// Caller-supplied emission parameters.
#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Project name; also the crate root the entry module imports through
    pub project_name: String,
}

impl EmitOptions {
    /// The crate identifier for `use` paths (dashes become underscores).
    pub fn crate_ident(&self) -> String {
        self.project_name.replace('-', "_")
    }
}

/// Emits one module of the program.
pub fn emit_module(
    module: &TirModule,
    modules: &[TirModule],
    annotations: &Annotations,
    stubs: &StubRegistry,
    options: &EmitOptions,
) -> EmittedModule {
    debug!("emitting module '{}'", module.path);
    let mut emitter = Emitter {
        module,
        modules,
        annotations,
        stubs,
        options,
        body: String::new(),
        indent: 0,
        imports: IndexSet::new(),
        requirements: IndexSet::new(),
    };
    emitter.emit();

    let text = emitter.assemble();
    for requirement in &emitter.requirements {
        stubs.note_requirement(requirement.clone());
    }

    EmittedModule {
        name: module.name.clone(),
        is_entry: module.is_entry(),
        text,
        requirements: emitter.requirements.into_iter().collect(),
    }
}

pub(crate) struct Emitter<'a> {
    pub(crate) module: &'a TirModule,
    pub(crate) modules: &'a [TirModule],
    pub(crate) annotations: &'a Annotations,
    #[allow(dead_code)]
    pub(crate) stubs: &'a StubRegistry,
    pub(crate) options: &'a EmitOptions,
    pub(crate) body: String,
    pub(crate) indent: usize,
    pub(crate) imports: IndexSet<String>,
    pub(crate) requirements: IndexSet<BuildRequirement>,
}

impl Emitter<'_> {
    fn emit(&mut self) {
        self.collect_user_imports();

        for constant in &self.module.constants {
            self.emit_constant(constant);
        }
        for class in &self.module.classes {
            self.emit_class(class);
        }
        for function in &self.module.functions {
            self.emit_function(function, None);
        }
        // top-level statements were consumed by the analyzer (only the
        // asyncio.run idiom survives to this point, already deleted)
    }

    fn assemble(&self) -> String {
        let mut imports: Vec<_> = self.imports.iter().cloned().collect();
        imports.sort();

        let mut text = String::new();
        for import in &imports {
            text.push_str(&format!("use {import};\n"));
        }
        if !imports.is_empty() {
            text.push('\n');
        }
        text.push_str(self.body.trim_start_matches('\n'));
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text
    }

    /// Imports of user modules become `use` paths through the crate root.
    fn collect_user_imports(&mut self) {
        let is_entry = self.module.is_entry();
        for import in &self.module.imports {
            let is_user_module = self
                .modules
                .iter()
                .any(|candidate| candidate.name == import.module || candidate.path == import.module);
            if !is_user_module {
                // external modules are covered by stub expansions
                continue;
            }
            let root = if is_entry {
                self.options.crate_ident()
            } else {
                "crate".to_string()
            };
            let module_path = import.module.replace('.', "::");
            if import.names.is_empty() {
                self.imports.insert(format!("{root}::{module_path}"));
            } else {
                for name in &import.names {
                    self.imports.insert(format!("{root}::{module_path}::{name}"));
                }
            }
        }
    }

    // --- writing helpers ---------------------------------------------------

    pub(crate) fn write_line(&mut self, line: &str) {
        if line.is_empty() {
            self.body.push('\n');
            return;
        }
        for _ in 0..self.indent {
            self.body.push_str("    ");
        }
        self.body.push_str(line);
        self.body.push('\n');
    }

    pub(crate) fn blank_line(&mut self) {
        if !self.body.ends_with("\n\n") && !self.body.is_empty() {
            self.body.push('\n');
        }
    }

    // --- items -------------------------------------------------------------

    fn emit_constant(&mut self, constant: &TirConstant) {
        self.blank_line();
        // string constants are static slices regardless of the annotation
        let ty = match &constant.value.kind {
            TirExpressionKind::StringLiteral { .. } => crate::tir::Type::StrSlice,
            TirExpressionKind::Integer(_) => crate::tir::Type::Int,
            TirExpressionKind::Float(_) => crate::tir::Type::Float,
            TirExpressionKind::Bool(_) => crate::tir::Type::Bool,
            _ => constant.declared.clone().unwrap_or(crate::tir::Type::Unknown),
        };
        let ty = match &constant.declared {
            Some(declared) if !matches!(ty, crate::tir::Type::StrSlice) => declared.clone(),
            _ => ty,
        };
        let rendered = self.render_type(&ty);
        let value = match &constant.value.kind {
            // a string constant is a static slice; no conversion
            TirExpressionKind::StringLiteral { value, .. } => format!("\"{}\"", crate::emit::expression::escape_str(value)),
            _ => self.emit_expression(&constant.value),
        };
        self.write_line(&format!("pub static {}: {} = {};", constant.name, rendered, value));
    }

    fn emit_class(&mut self, class: &TirClass) {
        self.blank_line();

        for attribute in &class.attributes {
            self.write_line(attribute);
        }
        let has_derive_attribute = class.attributes.iter().any(|attribute| attribute.starts_with("#[derive"));
        if class.is_dataclass && !has_derive_attribute {
            self.write_line("#[derive(Debug, Clone)]");
        }

        self.write_line(&format!("pub struct {} {{", class.name));
        self.indent += 1;
        for field in &class.fields {
            for attribute in &field.attributes {
                self.write_line(attribute);
            }
            let ty = self.render_type(&field.ty);
            self.write_line(&format!("pub {}: {},", field.name, ty));
        }
        self.indent -= 1;
        self.write_line("}");

        let has_constructor = class.constructor.is_some() || class.is_dataclass;
        if !has_constructor && class.methods.is_empty() {
            return;
        }

        self.blank_line();
        self.write_line(&format!("impl {} {{", class.name));
        self.indent += 1;

        if let Some(constructor) = &class.constructor {
            self.emit_constructor(class, constructor);
        } else if class.is_dataclass {
            self.emit_dataclass_constructor(class);
        }

        for method in &class.methods {
            self.blank_line();
            self.emit_function(method, Some(class));
        }

        self.indent -= 1;
        self.write_line("}");
    }

    /// `__init__` becomes `new`: field assignments through `self` turn into
    /// the struct literal, everything else runs before it.
    fn emit_constructor(&mut self, class: &TirClass, constructor: &TirFunction) {
        use crate::tir::{TirStatementKind, TirTarget};

        let params = self.render_params(constructor);
        self.write_line(&format!("pub fn new({params}) -> Self {{"));
        self.indent += 1;

        let mut field_values: indexmap::IndexMap<String, String> = indexmap::IndexMap::new();
        for statement in &constructor.body {
            if let TirStatementKind::Assign {
                target: TirTarget::Attribute { object, field },
                value,
                ..
            } = &statement.kind
            {
                if matches!(&object.kind, TirExpressionKind::Name(name) if name == "self") {
                    let rendered = self.emit_expression(value);
                    field_values.insert(field.clone(), rendered);
                    continue;
                }
            }
            self.emit_statement(statement);
        }

        let mut initializers = Vec::new();
        for field in &class.fields {
            match field_values.shift_remove(&field.name) {
                Some(value) if value == field.name => initializers.push(field.name.clone()),
                Some(value) => initializers.push(format!("{}: {}", field.name, value)),
                None => match &field.default {
                    Some(default) => {
                        let rendered = self.emit_expression(default);
                        initializers.push(format!("{}: {}", field.name, rendered));
                    }
                    None => initializers.push(format!("{}: Default::default()", field.name)),
                },
            }
        }
        self.write_line(&format!("Self {{ {} }}", initializers.join(", ")));

        self.indent -= 1;
        self.write_line("}");
    }

    /// Dataclasses synthesize `new` from the field list; defaulted fields
    /// become `Option` parameters resolved with `unwrap_or`.
    fn emit_dataclass_constructor(&mut self, class: &TirClass) {
        let mut params = Vec::new();
        for field in &class.fields {
            let base = self.render_type(&field.ty);
            if field.default.is_some() {
                params.push(format!("{}: Option<{}>", field.name, base));
            } else {
                params.push(format!("{}: {}", field.name, base));
            }
        }
        self.write_line(&format!("pub fn new({}) -> Self {{", params.join(", ")));
        self.indent += 1;

        let mut initializers = Vec::new();
        for field in &class.fields {
            match &field.default {
                Some(default) => {
                    let rendered = self.emit_expression(default);
                    initializers.push(format!("{}: {}.unwrap_or({})", field.name, field.name, rendered));
                }
                None => initializers.push(field.name.clone()),
            }
        }
        self.write_line(&format!("Self {{ {} }}", initializers.join(", ")));

        self.indent -= 1;
        self.write_line("}");
    }

    fn render_params(&mut self, function: &TirFunction) -> String {
        let mut rendered = Vec::new();
        for param in &function.params {
            let ty = param.ty.clone().unwrap_or(crate::tir::Type::Unknown);
            let ty = self.render_type(&ty);
            let mutable = if self.annotations.mutable_params.contains(&param.id) {
                "mut "
            } else {
                ""
            };
            rendered.push(format!("{mutable}{}: {ty}", param.name));
        }
        rendered.join(", ")
    }

    fn emit_function(&mut self, function: &TirFunction, class: Option<&TirClass>) {
        self.blank_line();

        for attribute in &function.attributes {
            self.write_line(attribute);
        }

        let is_entry_main = class.is_none() && self.module.is_entry() && function.name == "main";
        if is_entry_main && self.annotations.async_main {
            self.requirements.insert(BuildRequirement::new("tokio", "1", &["full"]));
            if !self.annotations.entry_attribute_supplied {
                self.write_line("#[tokio::main]");
            }
        }

        let visibility = if is_entry_main { "" } else { "pub " };
        let asyncness = if function.is_async { "async " } else { "" };

        let receiver = if function.has_receiver {
            if self.annotations.exclusive_methods.contains(&function.id) {
                Some("&mut self")
            } else {
                Some("&self")
            }
        } else {
            None
        };

        let params = self.render_params(function);
        let params = match receiver {
            Some(receiver) if params.is_empty() => receiver.to_string(),
            Some(receiver) => format!("{receiver}, {params}"),
            None => params,
        };

        let ret = function.ret.clone().unwrap_or(crate::tir::Type::Unit);
        let signature = if matches!(ret, crate::tir::Type::Unit) {
            format!("{visibility}{asyncness}fn {}({params}) {{", function.name)
        } else {
            let rendered = self.render_type(&ret);
            format!("{visibility}{asyncness}fn {}({params}) -> {rendered} {{", function.name)
        };
        self.write_line(&signature);
        self.indent += 1;
        self.emit_body(&function.body);
        self.indent -= 1;
        self.write_line("}");
    }

    /// Emits a function body, turning a final `return expr` into a tail
    /// expression.
    pub(crate) fn emit_body(&mut self, statements: &[crate::tir::TirStatement]) {
        use crate::tir::TirStatementKind;

        let split = statements.len().saturating_sub(1);
        let (head, tail) = statements.split_at(split);
        for statement in head {
            self.emit_statement(statement);
        }
        if let Some(last) = tail.first() {
            if let TirStatementKind::Return(Some(value)) = &last.kind {
                let rendered = self.emit_expression(value);
                self.write_line(&rendered);
            } else {
                self.emit_statement(last);
            }
        }
    }
}
