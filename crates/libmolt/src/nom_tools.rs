//! Nom parser tools shared by the tokenizer.
//!
//! The tokenizer runs nom combinators over a [`LocatedSpan`] that carries the
//! [`SourceFile`] being lexed, so every recognized token knows its byte range
//! in the original text.

use std::ops::Range;

use nom_locate::LocatedSpan;

use crate::file::SourceFile;

/// Lexer state carried through every [`NomSpan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    /// The source file being lexed
    pub file: SourceFile,
}

impl State {
    pub fn new(file: SourceFile) -> Self {
        Self { file }
    }
}

/// Type alias for nom's located span with Molt's lexer state.
pub type NomSpan<'base> = LocatedSpan<&'base str, State>;

/// Nom error type used by the token recognizers.
///
/// `VerboseError` keeps the `context()` labels attached by recognizers; the
/// lexer converts the innermost label into an `E_PARSE` diagnostic message.
pub type LexError<'base> = nom_language::error::VerboseError<NomSpan<'base>>;

/// Converting spans to byte ranges in the source file.
pub trait ToRange {
    fn to_range(&self) -> Range<usize>;
}

impl ToRange for NomSpan<'_> {
    fn to_range(&self) -> Range<usize> {
        let start = self.location_offset();
        start..start + self.fragment().len()
    }
}

/// Byte range spanning from the start of `from` to the start of `to`.
pub fn range_between(from: &NomSpan<'_>, to: &NomSpan<'_>) -> Range<usize> {
    from.location_offset()..to.location_offset()
}
