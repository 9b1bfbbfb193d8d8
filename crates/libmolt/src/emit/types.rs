//! Canonical Rust rendering of TIR types.
//!
//! Each constructor has exactly one spelling; rendering a type may pull
//! imports (`HashMap`, `Arc`) or build requirements (the async mutex) into
//! the module being emitted.

use crate::stubs::BuildRequirement;
use crate::tir::Type;

use super::Emitter;

impl Emitter<'_> {
    /// Renders a type, recording any imports/requirements it needs.
    pub(crate) fn render_type(&mut self, ty: &Type) -> String {
        match ty {
            Type::Bool => "bool".to_string(),
            Type::Int => "i64".to_string(),
            Type::Float => "f64".to_string(),
            Type::Unit => "()".to_string(),
            Type::Never => "()".to_string(),
            Type::StrSlice => "&str".to_string(),
            Type::String => "String".to_string(),
            Type::Sequence(inner) => format!("Vec<{}>", self.render_type(inner)),
            Type::Mapping(key, value) => {
                self.imports.insert("std::collections::HashMap".to_string());
                format!("HashMap<{}, {}>", self.render_type(key), self.render_type(value))
            }
            Type::Set(inner) => {
                self.imports.insert("std::collections::HashSet".to_string());
                format!("HashSet<{}>", self.render_type(inner))
            }
            Type::Tuple(items) => {
                let rendered: Vec<_> = items.iter().map(|item| self.render_type(item)).collect();
                format!("({})", rendered.join(", "))
            }
            Type::Optional(inner) => format!("Option<{}>", self.render_type(inner)),
            Type::Fallible(ok, err) => format!("Result<{}, {}>", self.render_type(ok), self.render_type(err)),
            Type::Named { path, generics } => {
                if generics.is_empty() {
                    path.clone()
                } else {
                    let rendered: Vec<_> = generics.iter().map(|item| self.render_type(item)).collect();
                    format!("{path}<{}>", rendered.join(", "))
                }
            }
            Type::Function { params, ret, .. } => {
                let rendered: Vec<_> = params.iter().map(|item| self.render_type(item)).collect();
                format!("fn({}) -> {}", rendered.join(", "), self.render_type(ret))
            }
            Type::Shared(inner) => {
                self.imports.insert("std::sync::Arc".to_string());
                format!("Arc<{}>", self.render_type(inner))
            }
            Type::Guarded(inner) => {
                self.requirements.insert(BuildRequirement::new("tokio", "1", &["full"]));
                format!("tokio::sync::Mutex<{}>", self.render_type(inner))
            }
            Type::Unknown => "()".to_string(),
        }
    }
}
