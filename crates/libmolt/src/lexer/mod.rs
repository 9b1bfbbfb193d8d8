//! Tokenizer for the annotated Python subset.
//!
//! Python's grammar is indentation-sensitive, so lexing happens in two
//! cooperating layers:
//!
//! - individual tokens are recognized by nom combinators over a
//!   [`NomSpan`] (identifiers, keywords, numeric literals via
//!   `minimal-lexical`, string and f-string literals, operators);
//! - a layout driver tracks the indentation stack and bracket depth and
//!   injects the synthetic `Newline` / `Indent` / `Dedent` tokens the
//!   parser consumes.
//!
//! Blank lines and ordinary comments disappear here. Comments of the form
//! `# #[...]` are the pass-through attribute channel: they survive as
//! [`TokenKind::Attribute`] tokens and are re-emitted verbatim above the
//! declaration that follows them.

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char, one_of};
use nom::combinator::{opt, recognize, value};
use nom::error::context;
use nom::multi::{many0_count, many1, many0};
use nom::sequence::{pair, preceded, terminated};
use nom::{IResult, Input, Parser};
use nom_language::error::VerboseErrorKind;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::file::SourceFile;
use crate::nom_tools::{LexError, NomSpan, State, ToRange};

pub mod token;

pub use token::{FStringSegment, Keyword, Token, TokenKind};

/// Tokenizes a whole source file, layout tokens included.
pub fn tokenize(state: &State) -> Result<Vec<Token>, Diagnostic> {
    Lexer::new(state).run()
}

/// Tokenizes an expression fragment extracted from an f-string.
///
/// `offset` is the absolute byte position of `text` inside `file`; token
/// positions are shifted so diagnostics point into the original literal.
pub fn tokenize_fragment(file: &SourceFile, text: &str, offset: usize) -> Result<Vec<Token>, Diagnostic> {
    let state = State::new(file.clone());
    let mut input = NomSpan::new_extra(text, state.clone());
    let mut tokens = Vec::new();

    loop {
        input = skip_spaces(input);
        if input.fragment().is_empty() {
            break;
        }
        let (rest, mut token) = next_token(input).map_err(|error| lex_error_to_diagnostic(&state, error, offset))?;
        token.position = token.position.start + offset..token.position.end + offset;
        tokens.push(token);
        input = rest;
    }

    let end = offset + text.len();
    tokens.push(Token::new(TokenKind::Eof, end..end));
    Ok(tokens)
}

struct Lexer<'base> {
    state: &'base State,
    input: NomSpan<'base>,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    bracket_depth: usize,
}

impl<'base> Lexer<'base> {
    fn new(state: &'base State) -> Self {
        Self {
            state,
            input: NomSpan::new_extra(state.file.code().as_str(), state.clone()),
            tokens: Vec::new(),
            indents: vec![0],
            bracket_depth: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, Diagnostic> {
        loop {
            if !self.start_line()? {
                break;
            }
            self.scan_line()?;
        }

        self.finish();
        Ok(self.tokens)
    }

    /// Handles indentation at the start of a logical line.
    ///
    /// Returns `false` once the end of input is reached. Blank lines and
    /// comment-only lines are consumed without producing tokens; attribute
    /// comments produce their token and terminate the logical line.
    fn start_line(&mut self) -> Result<bool, Diagnostic> {
        loop {
            if self.input.fragment().is_empty() {
                return Ok(false);
            }

            let line_start = self.input.location_offset();
            let mut width = 0usize;
            for byte in self.input.fragment().bytes() {
                match byte {
                    b' ' => width += 1,
                    b'\t' => {
                        let offset = line_start + width;
                        return Err(Diagnostic::new(
                            DiagnosticKind::Parse,
                            self.state.file.clone(),
                            offset..offset + 1,
                            "tab character in indentation; use spaces",
                        ));
                    }
                    _ => break,
                }
            }
            self.advance(width);

            match self.input.fragment().chars().next() {
                // blank line
                Some('\n') => {
                    self.advance(1);
                    continue;
                }
                None => return Ok(false),
                Some('#') => {
                    if let Some(payload) = self.attribute_comment() {
                        self.apply_indent(width)?;
                        let start = self.input.location_offset();
                        let length = self.current_line_len();
                        self.tokens.push(Token::new(TokenKind::Attribute(payload), start..start + length));
                        self.advance(length);
                        self.push_newline();
                        if self.input.fragment().starts_with('\n') {
                            self.advance(1);
                        }
                        continue;
                    }
                    // comment-only line
                    let length = self.current_line_len();
                    self.advance(length);
                    if self.input.fragment().starts_with('\n') {
                        self.advance(1);
                    }
                    continue;
                }
                Some(_) => {
                    self.apply_indent(width)?;
                    return Ok(true);
                }
            }
        }
    }

    fn apply_indent(&mut self, width: usize) -> Result<(), Diagnostic> {
        let current = *self.indents.last().unwrap_or(&0);
        let offset = self.input.location_offset();
        if width > current {
            self.indents.push(width);
            self.tokens.push(Token::new(TokenKind::Indent, offset..offset));
        } else if width < current {
            while *self.indents.last().unwrap_or(&0) > width {
                self.indents.pop();
                self.tokens.push(Token::new(TokenKind::Dedent, offset..offset));
            }
            if *self.indents.last().unwrap_or(&0) != width {
                return Err(Diagnostic::new(
                    DiagnosticKind::Parse,
                    self.state.file.clone(),
                    offset..offset + 1,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(())
    }

    /// Scans tokens until the end of the logical line.
    fn scan_line(&mut self) -> Result<(), Diagnostic> {
        loop {
            self.input = skip_spaces(self.input.clone());

            match self.input.fragment().chars().next() {
                None => return Ok(()),
                Some('#') => {
                    let length = self.current_line_len();
                    self.advance(length);
                }
                Some('\n') => {
                    if self.bracket_depth > 0 {
                        // implicit line joining inside brackets
                        self.advance(1);
                        continue;
                    }
                    self.push_newline();
                    self.advance(1);
                    return Ok(());
                }
                Some(_) => {
                    let (rest, token) =
                        next_token(self.input.clone()).map_err(|error| lex_error_to_diagnostic(self.state, error, 0))?;
                    match token.kind {
                        TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => self.bracket_depth += 1,
                        TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                            self.bracket_depth = self.bracket_depth.saturating_sub(1);
                        }
                        _ => {}
                    }
                    self.tokens.push(token);
                    self.input = rest;
                }
            }
        }
    }

    fn finish(&mut self) {
        let offset = self.input.location_offset();
        if matches!(
            self.tokens.last().map(|token| &token.kind),
            Some(kind) if !matches!(kind, TokenKind::Newline)
        ) {
            self.tokens.push(Token::new(TokenKind::Newline, offset..offset));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token::new(TokenKind::Dedent, offset..offset));
        }
        self.tokens.push(Token::new(TokenKind::Eof, offset..offset));
    }

    fn push_newline(&mut self) {
        let offset = self.input.location_offset();
        self.tokens.push(Token::new(TokenKind::Newline, offset..offset));
    }

    /// Recognizes the pass-through attribute channel at a `#`.
    ///
    /// Returns the payload (`#[...]`) when the comment starts with `# #[`.
    fn attribute_comment(&self) -> Option<String> {
        let fragment = self.input.fragment();
        let rest = fragment.strip_prefix("# ")?;
        if !rest.starts_with("#[") {
            return None;
        }
        let end = rest.find('\n').unwrap_or(rest.len());
        Some(rest[..end].trim_end().to_string())
    }

    fn current_line_len(&self) -> usize {
        self.input.fragment().find('\n').unwrap_or(self.input.fragment().len())
    }

    fn advance(&mut self, count: usize) {
        self.input = self.input.take_split(count).0;
    }
}

fn skip_spaces(input: NomSpan<'_>) -> NomSpan<'_> {
    let count = input.fragment().chars().take_while(|c| *c == ' ' || *c == '\t' || *c == '\r').count();
    input.take_split(count).0
}

/// Recognizes a single token at the start of `input`.
fn next_token(input: NomSpan<'_>) -> IResult<NomSpan<'_>, Token, LexError<'_>> {
    alt((fstring, string_literal, number, ident_or_keyword, operator)).parse(input)
}

fn ident_or_keyword(input: NomSpan<'_>) -> IResult<NomSpan<'_>, Token, LexError<'_>> {
    let (rest, span) = recognize(pair(alt((alpha1, tag("_"))), many0_count(alt((alphanumeric1, tag("_")))))).parse(input)?;
    let text = span.fragment();
    let kind = match Keyword::from_ident(text) {
        Some(keyword) => TokenKind::Keyword(keyword),
        None => TokenKind::Ident(text.to_string()),
    };
    Ok((rest, Token::new(kind, span.to_range())))
}

fn digits(input: NomSpan<'_>) -> IResult<NomSpan<'_>, NomSpan<'_>, LexError<'_>> {
    recognize(many1(terminated(one_of("0123456789"), many0(char('_'))))).parse(input)
}

/// Parses integer and float literals.
///
/// Floats go through `minimal-lexical`; integers must fit `i64`.
fn number(input: NomSpan<'_>) -> IResult<NomSpan<'_>, Token, LexError<'_>> {
    let start = input.clone();
    let (rest, integer) = digits(input)?;
    let (rest, fraction) = opt(preceded(char('.'), digits)).parse(rest)?;
    let (rest, exponent) = opt(preceded(
        one_of("eE"),
        pair(opt(alt((value(true, char('-')), value(false, char('+'))))), digits),
    ))
    .parse(rest)?;

    let position = start.location_offset()..rest.location_offset();
    let integer_text = integer.fragment().replace('_', "");

    if fraction.is_none() && exponent.is_none() {
        let value = match integer_text.parse::<i64>() {
            Ok(value) => value,
            Err(_) => {
                return Err(nom::Err::Failure(LexError {
                    errors: vec![(start, VerboseErrorKind::Context("integer literal out of range"))],
                }));
            }
        };
        return Ok((rest, Token::new(TokenKind::Integer(value), position)));
    }

    let fraction_text = fraction.map(|span| span.fragment().replace('_', "")).unwrap_or_default();
    let mut exp = 0i32;
    if let Some((minus, digits)) = exponent {
        exp = digits.fragment().replace('_', "").parse::<i32>().unwrap_or(0);
        if minus == Some(true) {
            exp = -exp;
        }
    }
    let value: f64 = minimal_lexical::parse_float(integer_text.as_bytes().iter(), fraction_text.as_bytes().iter(), exp);
    Ok((rest, Token::new(TokenKind::Float(value), position)))
}

/// Parses one character of a quoted string, handling escapes.
fn string_character(quote: char) -> impl Fn(NomSpan<'_>) -> IResult<NomSpan<'_>, char, LexError<'_>> {
    move |input| {
        let (rest, c) = nom::character::complete::none_of("\n")(input.clone())?;
        if c == quote {
            return Err(nom::Err::Error(LexError {
                errors: vec![(input, VerboseErrorKind::Context("closing quote"))],
            }));
        }
        if c == '\\' {
            return alt((
                value('\n', char('n')),
                value('\t', char('t')),
                value('\r', char('r')),
                value('\\', char('\\')),
                value('"', char('"')),
                value('\'', char('\'')),
                value('\0', char('0')),
            ))
            .parse(rest);
        }
        Ok((rest, c))
    }
}

fn quoted(quote: char) -> impl Fn(NomSpan<'_>) -> IResult<NomSpan<'_>, String, LexError<'_>> {
    move |input| {
        let (mut rest, _) = char::<_, LexError>(quote)(input)?;
        let mut text = String::new();
        loop {
            if let Ok((after, _)) = char::<_, LexError>(quote)(rest.clone()) {
                return Ok((after, text));
            }
            let (after, c) =
                context("unterminated string literal", nom::combinator::cut(string_character(quote))).parse(rest)?;
            text.push(c);
            rest = after;
        }
    }
}

fn string_literal(input: NomSpan<'_>) -> IResult<NomSpan<'_>, Token, LexError<'_>> {
    let start = input.clone();
    let (rest, text) = alt((quoted('"'), quoted('\''))).parse(input)?;
    let position = start.location_offset()..rest.location_offset();
    Ok((rest, Token::new(TokenKind::Str(text), position)))
}

/// Lexes an f-string into literal and interpolation segments.
///
/// Doubled braces escape; an interpolation runs to the matching close brace,
/// with an optional `:spec` captured verbatim after the top-level colon.
fn fstring(input: NomSpan<'_>) -> IResult<NomSpan<'_>, Token, LexError<'_>> {
    let start = input.clone();
    let (body, _) = alt((tag::<_, _, LexError>("f\""), tag("f'"))).parse(input)?;
    let quote = if start.fragment().as_bytes()[1] == b'"' { '"' } else { '\'' };

    let fragment = body.fragment();
    let base = body.location_offset();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = fragment.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        if c == quote {
            if !literal.is_empty() {
                segments.push(FStringSegment::Literal(std::mem::take(&mut literal)));
            }
            let consumed = index + quote.len_utf8();
            let (rest, _) = body.take_split(consumed);
            let position = start.location_offset()..rest.location_offset();
            return Ok((rest, Token::new(TokenKind::FString(segments), position)));
        }
        match c {
            '\n' => break,
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                if !literal.is_empty() {
                    segments.push(FStringSegment::Literal(std::mem::take(&mut literal)));
                }
                let expr_start = index + 1;
                let mut depth = 0usize;
                let mut expr_end = None;
                let mut spec_split = None;
                for (inner, ic) in chars.by_ref() {
                    match ic {
                        '(' | '[' => depth += 1,
                        ')' | ']' => depth = depth.saturating_sub(1),
                        ':' if depth == 0 && spec_split.is_none() => spec_split = Some(inner),
                        '}' if depth == 0 => {
                            expr_end = Some(inner);
                            break;
                        }
                        _ => {}
                    }
                }
                let Some(end) = expr_end else { break };
                let (text_end, spec) = match spec_split {
                    Some(split) => (split, Some(fragment[split + 1..end].to_string())),
                    None => (end, None),
                };
                segments.push(FStringSegment::Interpolation {
                    text: fragment[expr_start..text_end].to_string(),
                    spec,
                    offset: base + expr_start,
                });
            }
            '\\' => {
                let escaped = chars.next().map(|(_, e)| e);
                match escaped {
                    Some('n') => literal.push('\n'),
                    Some('t') => literal.push('\t'),
                    Some('r') => literal.push('\r'),
                    Some('\\') => literal.push('\\'),
                    Some('\'') => literal.push('\''),
                    Some('"') => literal.push('"'),
                    Some(other) => {
                        literal.push('\\');
                        literal.push(other);
                    }
                    None => break,
                }
            }
            other => literal.push(other),
        }
    }

    Err(nom::Err::Failure(LexError {
        errors: vec![(start, VerboseErrorKind::Context("unterminated f-string literal"))],
    }))
}

fn operator(input: NomSpan<'_>) -> IResult<NomSpan<'_>, Token, LexError<'_>> {
    let (rest, (span, kind)) = nom::combinator::consumed(alt((
        alt((
            value(TokenKind::Arrow, tag("->")),
            value(TokenKind::DoubleSlash, tag("//")),
            value(TokenKind::Eq, tag("==")),
            value(TokenKind::NotEq, tag("!=")),
            value(TokenKind::LtEq, tag("<=")),
            value(TokenKind::GtEq, tag(">=")),
            value(TokenKind::PlusAssign, tag("+=")),
            value(TokenKind::MinusAssign, tag("-=")),
            value(TokenKind::StarAssign, tag("*=")),
            value(TokenKind::SlashAssign, tag("/=")),
            value(TokenKind::PercentAssign, tag("%=")),
        )),
        alt((
            value(TokenKind::Plus, tag("+")),
            value(TokenKind::Minus, tag("-")),
            value(TokenKind::Star, tag("*")),
            value(TokenKind::Slash, tag("/")),
            value(TokenKind::Percent, tag("%")),
            value(TokenKind::Assign, tag("=")),
            value(TokenKind::Lt, tag("<")),
            value(TokenKind::Gt, tag(">")),
            value(TokenKind::LParen, tag("(")),
            value(TokenKind::RParen, tag(")")),
            value(TokenKind::LBracket, tag("[")),
            value(TokenKind::RBracket, tag("]")),
            value(TokenKind::LBrace, tag("{")),
            value(TokenKind::RBrace, tag("}")),
            value(TokenKind::Comma, tag(",")),
            value(TokenKind::Colon, tag(":")),
            value(TokenKind::Dot, tag(".")),
            value(TokenKind::Pipe, tag("|")),
            value(TokenKind::At, tag("@")),
        )),
    )))
    .parse(input)?;
    Ok((rest, Token::new(kind, span.to_range())))
}

/// Converts a nom error into an `E_PARSE` diagnostic.
fn lex_error_to_diagnostic(state: &State, error: nom::Err<LexError<'_>>, offset: usize) -> Diagnostic {
    let (position, message) = match &error {
        nom::Err::Error(inner) | nom::Err::Failure(inner) => {
            let context_entry = inner
                .errors
                .iter()
                .find_map(|(span, kind)| match kind {
                    VerboseErrorKind::Context(message) => Some((span, *message)),
                    _ => None,
                });
            match context_entry {
                Some((span, message)) => (span.location_offset()..span.location_offset() + 1, message.to_string()),
                None => match inner.errors.first() {
                    Some((span, _)) => (span.location_offset()..span.location_offset() + 1, "unexpected character".to_string()),
                    None => (0..0, "unexpected character".to_string()),
                },
            }
        }
        nom::Err::Incomplete(_) => (0..0, "unexpected end of input".to_string()),
    };
    Diagnostic::new(
        DiagnosticKind::Parse,
        state.file.clone(),
        position.start + offset..position.end + offset,
        message,
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::{tokenize, FStringSegment, Keyword, Token, TokenKind};
    use crate::file::SourceFile;
    use crate::nom_tools::State;

    fn kinds(code: &str) -> Vec<TokenKind> {
        let state = State::new(SourceFile::new(vec!["<memory>".into()], code.to_string()));
        tokenize(&state).unwrap().into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn simple_assignment() {
        assert_eq!(
            kinds("x = 1\n"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::Integer(1),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn indentation_tokens() {
        let tokens = kinds("def f():\n    return 1\n");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Keyword(Keyword::Def),
                TokenKind::Ident("f".into()),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Keyword(Keyword::Return),
                TokenKind::Integer(1),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn blank_lines_and_comments_are_skipped() {
        let tokens = kinds("x = 1\n\n# comment\ny = 2\n");
        assert_eq!(tokens.iter().filter(|kind| matches!(kind, TokenKind::Newline)).count(), 2);
        assert!(!tokens.iter().any(|kind| matches!(kind, TokenKind::Indent)));
    }

    #[test]
    fn attribute_comment_survives() {
        let tokens = kinds("# #[derive(Debug)]\nx = 1\n");
        assert_eq!(tokens[0], TokenKind::Attribute("#[derive(Debug)]".into()));
    }

    #[test]
    fn implicit_line_joining() {
        let tokens = kinds("x = (1 +\n     2)\n");
        assert_eq!(tokens.iter().filter(|kind| matches!(kind, TokenKind::Newline)).count(), 1);
        assert!(!tokens.iter().any(|kind| matches!(kind, TokenKind::Indent)));
    }

    #[test]
    fn tab_indentation_is_rejected() {
        let state = State::new(SourceFile::new(vec!["<memory>".into()], "if x:\n\treturn\n".to_string()));
        let error = tokenize(&state).unwrap_err();
        assert!(error.message.contains("tab"));
    }

    #[test]
    fn dedent_mismatch_is_rejected() {
        let state = State::new(SourceFile::new(
            vec!["<memory>".into()],
            "if x:\n    if y:\n        pass\n  pass\n".to_string(),
        ));
        let error = tokenize(&state).unwrap_err();
        assert!(error.message.contains("unindent"));
    }

    #[rstest]
    #[case("42", TokenKind::Integer(42))]
    #[case("1_000_000", TokenKind::Integer(1_000_000))]
    #[case("3.5", TokenKind::Float(3.5))]
    #[case("1.0e-3", TokenKind::Float(0.001))]
    #[case("\"hi\\n\"", TokenKind::Str("hi\n".into()))]
    #[case("'single'", TokenKind::Str("single".into()))]
    fn literal_tokens(#[case] code: &str, #[case] expected: TokenKind) {
        let tokens = kinds(&format!("{code}\n"));
        assert_eq!(tokens[0], expected);
    }

    #[test]
    fn integer_overflow_is_a_parse_error() {
        let state = State::new(SourceFile::new(vec!["<memory>".into()], "99999999999999999999\n".to_string()));
        let error = tokenize(&state).unwrap_err();
        assert!(error.message.contains("out of range"));
    }

    #[test]
    fn fstring_segments() {
        let tokens = kinds("f\"Hello, {name}! {count:>3}\"\n");
        let TokenKind::FString(segments) = &tokens[0] else {
            panic!("expected f-string, got {:?}", tokens[0]);
        };
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], FStringSegment::Literal("Hello, ".into()));
        assert!(matches!(
            &segments[1],
            FStringSegment::Interpolation { text, spec: None, .. } if text == "name"
        ));
        assert_eq!(segments[2], FStringSegment::Literal("! ".into()));
        assert!(matches!(
            &segments[3],
            FStringSegment::Interpolation { text, spec: Some(spec), .. } if text == "count" && spec == ">3"
        ));
    }

    #[test]
    fn fstring_doubled_braces() {
        let tokens = kinds("f\"{{literal}}\"\n");
        let TokenKind::FString(segments) = &tokens[0] else {
            panic!("expected f-string");
        };
        assert_eq!(segments, &vec![FStringSegment::Literal("{literal}".into())]);
    }

    #[test]
    fn fragment_positions_are_shifted() {
        let file = SourceFile::new(vec!["<memory>".into()], "f\"{name}\"".to_string());
        let tokens = super::tokenize_fragment(&file, "name", 3).unwrap();
        assert_eq!(tokens[0], Token::new(TokenKind::Ident("name".into()), 3..7));
    }
}
