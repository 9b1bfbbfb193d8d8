//! Token definitions for the Python-subset lexer.

use std::ops::Range;

use strum_macros::{Display, EnumDiscriminants, EnumIs};

/// Reserved words of the accepted subset.
///
/// Words the subset rejects (`try`, `lambda`, …) are still lexed as keywords
/// so the parser can point at them with a precise
/// `E_UNSUPPORTED_CONSTRUCT` instead of a generic parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIs)]
#[strum(serialize_all = "lowercase")]
pub enum Keyword {
    Def,
    Class,
    Return,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Is,
    Not,
    And,
    Or,
    Break,
    Continue,
    Pass,
    Async,
    Await,
    None,
    True,
    False,
    Import,
    From,
    With,
    As,
    // reserved but outside the subset
    Try,
    Except,
    Finally,
    Raise,
    Lambda,
    Global,
    Nonlocal,
    Yield,
    Del,
    Match,
    Case,
}

impl Keyword {
    /// Maps an identifier to its keyword, if it is one.
    pub fn from_ident(ident: &str) -> Option<Keyword> {
        let keyword = match ident {
            "def" => Keyword::Def,
            "class" => Keyword::Class,
            "return" => Keyword::Return,
            "if" => Keyword::If,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "while" => Keyword::While,
            "for" => Keyword::For,
            "in" => Keyword::In,
            "is" => Keyword::Is,
            "not" => Keyword::Not,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "pass" => Keyword::Pass,
            "async" => Keyword::Async,
            "await" => Keyword::Await,
            "None" => Keyword::None,
            "True" => Keyword::True,
            "False" => Keyword::False,
            "import" => Keyword::Import,
            "from" => Keyword::From,
            "with" => Keyword::With,
            "as" => Keyword::As,
            "try" => Keyword::Try,
            "except" => Keyword::Except,
            "finally" => Keyword::Finally,
            "raise" => Keyword::Raise,
            "lambda" => Keyword::Lambda,
            "global" => Keyword::Global,
            "nonlocal" => Keyword::Nonlocal,
            "yield" => Keyword::Yield,
            "del" => Keyword::Del,
            "match" => Keyword::Match,
            "case" => Keyword::Case,
            _ => return None,
        };
        Some(keyword)
    }

    /// True for reserved words the subset refuses to parse.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Keyword::Try
                | Keyword::Except
                | Keyword::Finally
                | Keyword::Raise
                | Keyword::Lambda
                | Keyword::Global
                | Keyword::Nonlocal
                | Keyword::Yield
                | Keyword::Del
                | Keyword::Match
                | Keyword::Case
        )
    }
}

/// One segment of a lexed f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringSegment {
    /// Literal text with escapes already processed
    Literal(String),
    /// A `{expression[:spec]}` interpolation
    Interpolation {
        /// The raw expression text between the braces
        text: String,
        /// Format specifier after the `:`, preserved verbatim
        spec: Option<String>,
        /// Absolute byte offset of `text` in the source file
        offset: usize,
    },
}

/// The kinds of token produced by the lexer.
///
/// `Newline`, `Indent` and `Dedent` are synthetic layout tokens produced by
/// the indentation driver; they never overlap a source character.
#[derive(Debug, Clone, PartialEq, EnumDiscriminants, EnumIs)]
#[strum_discriminants(name(TokenKindName), derive(Display))]
pub enum TokenKind {
    Ident(String),
    Keyword(Keyword),
    Integer(i64),
    Float(f64),
    Str(String),
    FString(Vec<FStringSegment>),
    /// Pass-through attribute comment (`# #[...]`), payload without the `# ` prefix
    Attribute(String),

    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Assign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Arrow,
    Pipe,
    At,

    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    /// Short human name used in "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::Keyword(keyword) => format!("'{keyword}'"),
            TokenKind::Integer(value) => format!("integer '{value}'"),
            TokenKind::Float(value) => format!("float '{value}'"),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::FString(_) => "f-string literal".to_string(),
            TokenKind::Attribute(_) => "attribute comment".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::DoubleSlash => "//",
            TokenKind::Percent => "%",
            TokenKind::Assign => "=",
            TokenKind::Eq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::PlusAssign => "+=",
            TokenKind::MinusAssign => "-=",
            TokenKind::StarAssign => "*=",
            TokenKind::SlashAssign => "/=",
            TokenKind::PercentAssign => "%=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Arrow => "->",
            TokenKind::Pipe => "|",
            TokenKind::At => "@",
            _ => "?",
        }
    }
}

/// A token with its byte range in the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Range<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, position: Range<usize>) -> Self {
        Self { kind, position }
    }
}
