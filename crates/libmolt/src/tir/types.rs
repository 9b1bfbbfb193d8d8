//! The TIR type universe.
//!
//! A closed set of type constructors shared by the analyzer, the stub
//! registry and the emitter. `Unknown` exists only during inference; the
//! analyzer guarantees no expression still carries it once analysis
//! succeeds.

use strum_macros::EnumIs;

/// A fully structural type in the intermediate representation.
///
/// `Display` renders the Python-side spelling, which is what diagnostics
/// show; the Rust rendering lives in the emitter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumIs)]
pub enum Type {
    Bool,
    Int,
    Float,
    Unit,
    Never,
    /// A borrowed string slice; literals at pure read sites
    StrSlice,
    /// An owned string
    String,
    Sequence(Box<Type>),
    Mapping(Box<Type>, Box<Type>),
    Set(Box<Type>),
    Tuple(Vec<Type>),
    Optional(Box<Type>),
    /// Success-or-failure; maps to Rust's `Result`
    Fallible(Box<Type>, Box<Type>),
    /// A nominal type, user-defined or stub-provided
    Named { path: String, generics: Vec<Type> },
    Function {
        params: Vec<Type>,
        ret: Box<Type>,
        is_async: bool,
    },
    /// Reference-counted shared ownership
    Shared(Box<Type>),
    /// Async-aware mutually-exclusive access
    Guarded(Box<Type>),
    /// Placeholder during inference only
    Unknown,
}

impl Type {
    pub fn named(path: impl Into<String>) -> Self {
        Type::Named {
            path: path.into(),
            generics: Vec::new(),
        }
    }

    /// True when the type or any component of it is still `Unknown`.
    pub fn contains_unknown(&self) -> bool {
        match self {
            Type::Unknown => true,
            Type::Sequence(inner) | Type::Set(inner) | Type::Optional(inner) | Type::Shared(inner) | Type::Guarded(inner) => {
                inner.contains_unknown()
            }
            Type::Mapping(key, value) => key.contains_unknown() || value.contains_unknown(),
            Type::Fallible(ok, err) => ok.contains_unknown() || err.contains_unknown(),
            Type::Tuple(items) => items.iter().any(Type::contains_unknown),
            Type::Named { generics, .. } => generics.iter().any(Type::contains_unknown),
            Type::Function { params, ret, .. } => params.iter().any(Type::contains_unknown) || ret.contains_unknown(),
            _ => false,
        }
    }

    /// True for `int` and `float`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// True for both string flavors.
    pub fn is_stringy(&self) -> bool {
        matches!(self, Type::String | Type::StrSlice)
    }

    /// Scalars that are passed by value at call sites.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Bool | Type::Int | Type::Float | Type::Unit | Type::Never)
    }

    /// Single-uppercase-letter nominal paths are stub type parameters
    /// (`T`, `K`, `V`, …); they stand for any type.
    fn is_type_parameter(&self) -> bool {
        matches!(self, Type::Named { path, .. } if path.len() == 1 && path.chars().all(|c| c.is_ascii_uppercase()))
    }

    /// Whether two types are interchangeable for checking purposes.
    ///
    /// The two string flavors compare equal; `Never` and stub type
    /// parameters unify with anything; an `Optional` accepts its inner type.
    pub fn accepts(&self, other: &Type) -> bool {
        if self == other || matches!(other, Type::Never) || matches!(self, Type::Unknown) || matches!(other, Type::Unknown) {
            return true;
        }
        if self.is_type_parameter() || other.is_type_parameter() {
            return true;
        }
        match (self, other) {
            (left, right) if left.is_stringy() && right.is_stringy() => true,
            (Type::Optional(inner), other) => inner.accepts(other) || matches!(other, Type::Optional(o) if inner.accepts(o)),
            (Type::Sequence(left), Type::Sequence(right)) | (Type::Set(left), Type::Set(right)) => left.accepts(right),
            (Type::Mapping(lk, lv), Type::Mapping(rk, rv)) => lk.accepts(rk) && lv.accepts(rv),
            (Type::Fallible(lo, le), Type::Fallible(ro, re)) => lo.accepts(ro) && le.accepts(re),
            (Type::Tuple(left), Type::Tuple(right)) => {
                left.len() == right.len() && left.iter().zip(right).all(|(l, r)| l.accepts(r))
            }
            _ => false,
        }
    }

    /// The stub-table key for method dispatch on this receiver, if any.
    pub fn stub_key(&self) -> Option<&str> {
        match self {
            Type::Named { path, .. } => Some(path.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bool => f.write_str("bool"),
            Type::Int => f.write_str("int"),
            Type::Float => f.write_str("float"),
            Type::Unit => f.write_str("None"),
            Type::Never => f.write_str("Never"),
            Type::StrSlice | Type::String => f.write_str("str"),
            Type::Sequence(inner) => write!(f, "list[{inner}]"),
            Type::Mapping(key, value) => write!(f, "dict[{key}, {value}]"),
            Type::Set(inner) => write!(f, "set[{inner}]"),
            Type::Tuple(items) => {
                f.write_str("tuple[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Type::Optional(inner) => write!(f, "Optional[{inner}]"),
            Type::Fallible(ok, err) => write!(f, "Result[{ok}, {err}]"),
            Type::Named { path, generics } => {
                f.write_str(path)?;
                if !generics.is_empty() {
                    f.write_str("[")?;
                    for (index, item) in generics.iter().enumerate() {
                        if index > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{item}")?;
                    }
                    f.write_str("]")?;
                }
                Ok(())
            }
            Type::Function { params, ret, is_async } => {
                if *is_async {
                    f.write_str("async ")?;
                }
                f.write_str("Callable[[")?;
                for (index, item) in params.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "], {ret}]")
            }
            Type::Shared(inner) => write!(f, "Arc[{inner}]"),
            Type::Guarded(inner) => write!(f, "Mutex[{inner}]"),
            Type::Unknown => f.write_str("<unknown>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Type;

    #[test]
    fn display_uses_source_spelling() {
        let ty = Type::Mapping(Box::new(Type::String), Box::new(Type::Sequence(Box::new(Type::Int))));
        assert_eq!(ty.to_string(), "dict[str, list[int]]");
        let ty = Type::Fallible(Box::new(Type::Int), Box::new(Type::String));
        assert_eq!(ty.to_string(), "Result[int, str]");
    }

    #[test]
    fn contains_unknown_recurses() {
        let ty = Type::Sequence(Box::new(Type::Optional(Box::new(Type::Unknown))));
        assert!(ty.contains_unknown());
        let ty = Type::Shared(Box::new(Type::Guarded(Box::new(Type::Int))));
        assert!(!ty.contains_unknown());
    }

    #[test]
    fn string_flavors_are_compatible() {
        assert!(Type::String.accepts(&Type::StrSlice));
        assert!(Type::StrSlice.accepts(&Type::String));
        assert!(!Type::String.accepts(&Type::Int));
    }

    #[test]
    fn optional_accepts_inner() {
        let optional = Type::Optional(Box::new(Type::Int));
        assert!(optional.accepts(&Type::Int));
        assert!(optional.accepts(&optional.clone()));
    }
}
