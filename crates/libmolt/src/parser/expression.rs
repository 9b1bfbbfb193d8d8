//! Expression grammar with Python's operator precedence.
//!
//! Single comparisons only; a chained comparison (`a < b < c`) is outside
//! the subset. F-string interpolations are re-lexed with
//! [`crate::lexer::tokenize_fragment`] so their positions stay anchored in
//! the original literal.

use crate::ast::{
    BinaryOperator, BoolOperator, CompareOperator, ExpressionAst, ExpressionAstKind, FStringPartAst, UnaryOperator,
};
use crate::error::Diagnostic;
use crate::lexer::{tokenize_fragment, FStringSegment, Keyword, TokenKind};

use super::Parser;

impl Parser<'_> {
    pub(crate) fn parse_expression(&mut self) -> Result<ExpressionAst, Diagnostic> {
        self.parse_conditional()
    }

    /// Statement-level expression list: `a, b, c` without parentheses forms
    /// a tuple, as in `tx, rx = mpsc_channel(10)` or `return a, b`.
    pub(crate) fn parse_expression_list(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let first = self.parse_expression()?;
        if !self.at(&TokenKind::Comma) {
            return Ok(first);
        }

        let start = first.position.start;
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.list_terminator() {
                break;
            }
            items.push(self.parse_expression()?);
        }
        let end = items.last().map(|item| item.position.end).unwrap_or(start);
        Ok(ExpressionAst::new(ExpressionAstKind::Tuple(items), start..end))
    }

    fn list_terminator(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Newline
                | TokenKind::Assign
                | TokenKind::Colon
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::Eof
        ) || self.at_keyword(Keyword::In)
    }

    fn parse_conditional(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let value = self.parse_or()?;
        if !self.at_keyword(Keyword::If) {
            return Ok(value);
        }

        self.advance();
        let condition = self.parse_or()?;
        self.expect_keyword(Keyword::Else, "'else' in conditional expression")?;
        let else_value = self.parse_conditional()?;
        let position = value.position.start..else_value.position.end;
        Ok(ExpressionAst::new(
            ExpressionAstKind::Conditional {
                condition: Box::new(condition),
                then_value: Box::new(value),
                else_value: Box::new(else_value),
            },
            position,
        ))
    }

    fn parse_or(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let mut left = self.parse_and()?;
        while self.at_keyword(Keyword::Or) {
            self.advance();
            let right = self.parse_and()?;
            let position = left.position.start..right.position.end;
            left = ExpressionAst::new(
                ExpressionAstKind::BoolOp {
                    op: BoolOperator::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                position,
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let mut left = self.parse_not()?;
        while self.at_keyword(Keyword::And) {
            self.advance();
            let right = self.parse_not()?;
            let position = left.position.start..right.position.end;
            left = ExpressionAst::new(
                ExpressionAstKind::BoolOp {
                    op: BoolOperator::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                position,
            );
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<ExpressionAst, Diagnostic> {
        if self.at_keyword(Keyword::Not) {
            let token = self.advance();
            let operand = self.parse_not()?;
            let position = token.position.start..operand.position.end;
            return Ok(ExpressionAst::new(
                ExpressionAstKind::Unary {
                    op: UnaryOperator::Not,
                    operand: Box::new(operand),
                },
                position,
            ));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let left = self.parse_arith()?;

        // `in` / `not in` membership
        if self.at_keyword(Keyword::In) || (self.at_keyword(Keyword::Not) && self.next_is_in()) {
            let negated = self.at_keyword(Keyword::Not);
            if negated {
                self.advance();
            }
            self.advance();
            let container = self.parse_arith()?;
            let position = left.position.start..container.position.end;
            return Ok(ExpressionAst::new(
                ExpressionAstKind::Membership {
                    negated,
                    item: Box::new(left),
                    container: Box::new(container),
                },
                position,
            ));
        }

        let Some(op) = self.comparison_operator() else {
            return Ok(left);
        };
        self.advance();
        if op == CompareOperator::IsNot {
            // second token of `is not`
            self.advance();
        }

        let right = self.parse_arith()?;
        let position = left.position.start..right.position.end;

        if self.comparison_operator().is_some() || self.at_keyword(Keyword::In) {
            let token = self.peek().clone();
            return Err(self.unsupported(token.position, "chained comparisons are outside the supported subset"));
        }

        Ok(ExpressionAst::new(
            ExpressionAstKind::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            position,
        ))
    }

    fn next_is_in(&self) -> bool {
        matches!(self.peek_next_kind(), Some(TokenKind::Keyword(Keyword::In)))
    }

    fn comparison_operator(&self) -> Option<CompareOperator> {
        match &self.peek().kind {
            TokenKind::Eq => Some(CompareOperator::Eq),
            TokenKind::NotEq => Some(CompareOperator::NotEq),
            TokenKind::Lt => Some(CompareOperator::Lt),
            TokenKind::LtEq => Some(CompareOperator::LtEq),
            TokenKind::Gt => Some(CompareOperator::Gt),
            TokenKind::GtEq => Some(CompareOperator::GtEq),
            TokenKind::Keyword(Keyword::Is) => {
                if self.next_is_not() {
                    Some(CompareOperator::IsNot)
                } else {
                    Some(CompareOperator::Is)
                }
            }
            _ => None,
        }
    }

    fn next_is_not(&self) -> bool {
        matches!(self.peek_next_kind(), Some(TokenKind::Keyword(Keyword::Not)))
    }

    fn parse_arith(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            let position = left.position.start..right.position.end;
            left = ExpressionAst::new(
                ExpressionAstKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                position,
            );
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                TokenKind::DoubleSlash => BinaryOperator::FloorDiv,
                TokenKind::Percent => BinaryOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            let position = left.position.start..right.position.end;
            left = ExpressionAst::new(
                ExpressionAstKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                position,
            );
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ExpressionAst, Diagnostic> {
        if self.at(&TokenKind::Minus) {
            let token = self.advance();
            let operand = self.parse_unary()?;
            let position = token.position.start..operand.position.end;
            return Ok(ExpressionAst::new(
                ExpressionAstKind::Unary {
                    op: UnaryOperator::Neg,
                    operand: Box::new(operand),
                },
                position,
            ));
        }
        if self.at(&TokenKind::Plus) {
            self.advance();
            return self.parse_unary();
        }
        if self.at_keyword(Keyword::Await) {
            let token = self.advance();
            let operand = self.parse_unary()?;
            let position = token.position.start..operand.position.end;
            return Ok(ExpressionAst::new(ExpressionAstKind::Await(Box::new(operand)), position));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let mut value = self.parse_atom()?;
        loop {
            match self.peek().kind {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.at(&TokenKind::RParen) {
                        args.push(self.parse_expression()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    if self.at_keyword(Keyword::For) {
                        let token = self.peek().clone();
                        return Err(self.unsupported(token.position, "generator expressions are outside the supported subset"));
                    }
                    let close = self.expect(&TokenKind::RParen, "')'")?;
                    let position = value.position.start..close.position.end;
                    value = ExpressionAst::new(
                        ExpressionAstKind::Call {
                            function: Box::new(value),
                            args,
                        },
                        position,
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect_ident("attribute name")?;
                    let position = value.position.start..field.position.end;
                    value = ExpressionAst::new(
                        ExpressionAstKind::Attribute {
                            object: Box::new(value),
                            field,
                        },
                        position,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    let close = self.expect(&TokenKind::RBracket, "']'")?;
                    let position = value.position.start..close.position.end;
                    value = ExpressionAst::new(
                        ExpressionAstKind::Subscript {
                            object: Box::new(value),
                            index: Box::new(index),
                        },
                        position,
                    );
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_atom(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Integer(value) => {
                let value = *value;
                self.advance();
                Ok(ExpressionAst::new(ExpressionAstKind::Integer(value), token.position))
            }
            TokenKind::Float(value) => {
                let value = *value;
                self.advance();
                Ok(ExpressionAst::new(ExpressionAstKind::Float(value), token.position))
            }
            TokenKind::Str(value) => {
                let value = value.clone();
                self.advance();
                Ok(ExpressionAst::new(ExpressionAstKind::Str(value), token.position))
            }
            TokenKind::FString(segments) => {
                let segments = segments.clone();
                self.advance();
                let parts = self.parse_fstring_parts(segments)?;
                Ok(ExpressionAst::new(ExpressionAstKind::FString(parts), token.position))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(ExpressionAst::new(ExpressionAstKind::Bool(true), token.position))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(ExpressionAst::new(ExpressionAstKind::Bool(false), token.position))
            }
            TokenKind::Keyword(Keyword::None) => {
                self.advance();
                Ok(ExpressionAst::new(ExpressionAstKind::NoneLiteral, token.position))
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(ExpressionAst::new(ExpressionAstKind::Name(name), token.position))
            }
            TokenKind::LParen => self.parse_parenthesized(),
            TokenKind::LBracket => self.parse_list_display(),
            TokenKind::LBrace => self.parse_brace_display(),
            TokenKind::Keyword(keyword) if keyword.is_unsupported() => {
                Err(self.unsupported(token.position.clone(), format!("'{keyword}' is outside the supported subset")))
            }
            other => Err(self.parse_error(format!("expected expression, found {}", other.describe()))),
        }
    }

    fn parse_parenthesized(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let open = self.expect(&TokenKind::LParen, "'('")?;
        if self.at(&TokenKind::RParen) {
            let close = self.advance();
            return Ok(ExpressionAst::new(
                ExpressionAstKind::Tuple(Vec::new()),
                open.position.start..close.position.end,
            ));
        }

        let first = self.parse_expression()?;
        if self.at_keyword(Keyword::For) {
            let token = self.peek().clone();
            return Err(self.unsupported(token.position, "generator expressions are outside the supported subset"));
        }

        if self.at(&TokenKind::Comma) {
            let mut items = vec![first];
            while self.eat(&TokenKind::Comma) {
                if self.at(&TokenKind::RParen) {
                    break;
                }
                items.push(self.parse_expression()?);
            }
            let close = self.expect(&TokenKind::RParen, "')'")?;
            return Ok(ExpressionAst::new(
                ExpressionAstKind::Tuple(items),
                open.position.start..close.position.end,
            ));
        }

        self.expect(&TokenKind::RParen, "')'")?;
        Ok(first)
    }

    fn parse_list_display(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let open = self.expect(&TokenKind::LBracket, "'['")?;
        if self.at(&TokenKind::RBracket) {
            let close = self.advance();
            return Ok(ExpressionAst::new(
                ExpressionAstKind::List(Vec::new()),
                open.position.start..close.position.end,
            ));
        }

        let first = self.parse_expression()?;

        if self.at_keyword(Keyword::For) {
            return self.parse_comprehension(open.position.start, first);
        }

        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_expression()?);
        }
        let close = self.expect(&TokenKind::RBracket, "']'")?;
        Ok(ExpressionAst::new(
            ExpressionAstKind::List(items),
            open.position.start..close.position.end,
        ))
    }

    /// `[element for variable in iterable if condition]`, one clause only.
    fn parse_comprehension(&mut self, start: usize, element: ExpressionAst) -> Result<ExpressionAst, Diagnostic> {
        self.expect_keyword(Keyword::For, "'for'")?;
        let variable = self.expect_ident("comprehension variable")?;
        self.expect_keyword(Keyword::In, "'in'")?;
        let iterable = self.parse_or()?;
        let condition = if self.eat_keyword(Keyword::If) {
            Some(Box::new(self.parse_or()?))
        } else {
            None
        };

        if self.at_keyword(Keyword::For) || self.at_keyword(Keyword::If) {
            let token = self.peek().clone();
            return Err(self.unsupported(
                token.position,
                "comprehensions with more than one 'for' clause and an optional 'if' are outside the supported subset",
            ));
        }

        let close = self.expect(&TokenKind::RBracket, "']'")?;
        Ok(ExpressionAst::new(
            ExpressionAstKind::Comprehension {
                element: Box::new(element),
                variable,
                iterable: Box::new(iterable),
                condition,
            },
            start..close.position.end,
        ))
    }

    fn parse_brace_display(&mut self) -> Result<ExpressionAst, Diagnostic> {
        let open = self.expect(&TokenKind::LBrace, "'{'")?;
        if self.at(&TokenKind::RBrace) {
            let close = self.advance();
            return Ok(ExpressionAst::new(
                ExpressionAstKind::Dict(Vec::new()),
                open.position.start..close.position.end,
            ));
        }

        let first = self.parse_expression()?;

        if self.eat(&TokenKind::Colon) {
            // dict display
            let first_value = self.parse_expression()?;
            let mut entries = vec![(first, first_value)];
            while self.eat(&TokenKind::Comma) {
                if self.at(&TokenKind::RBrace) {
                    break;
                }
                let key = self.parse_expression()?;
                self.expect(&TokenKind::Colon, "':' in dict display")?;
                let value = self.parse_expression()?;
                entries.push((key, value));
            }
            let close = self.expect(&TokenKind::RBrace, "'}'")?;
            return Ok(ExpressionAst::new(
                ExpressionAstKind::Dict(entries),
                open.position.start..close.position.end,
            ));
        }

        // set display
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at(&TokenKind::RBrace) {
                break;
            }
            items.push(self.parse_expression()?);
        }
        let close = self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(ExpressionAst::new(
            ExpressionAstKind::SetDisplay(items),
            open.position.start..close.position.end,
        ))
    }

    /// Parses the interpolations of an f-string into full expressions.
    fn parse_fstring_parts(&mut self, segments: Vec<FStringSegment>) -> Result<Vec<FStringPartAst>, Diagnostic> {
        let mut parts = Vec::new();
        for segment in segments {
            match segment {
                FStringSegment::Literal(text) => parts.push(FStringPartAst::Literal(text)),
                FStringSegment::Interpolation { text, spec, offset } => {
                    let tokens = tokenize_fragment(&self.file, &text, offset)?;
                    let mut sub = Parser::new(self.file.clone(), &tokens);
                    let expression = sub.parse_expression()?;
                    if !sub.at(&TokenKind::Eof) {
                        return Err(sub.parse_error("unexpected trailing input in f-string interpolation"));
                    }
                    parts.push(FStringPartAst::Interpolation { expression, spec });
                }
            }
        }
        Ok(parts)
    }

    fn peek_next_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos + 1).map(|token| &token.kind)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use crate::ast::{BinaryOperator, CompareOperator, ExpressionAst, ExpressionAstKind, FStringPartAst};
    use crate::error::DiagnosticKind;
    use crate::file::SourceFile;
    use crate::lexer::tokenize;
    use crate::nom_tools::State;

    fn expression(code: &str) -> ExpressionAst {
        let state = State::new(SourceFile::new(vec!["<memory>".into()], format!("{code}\n")));
        let tokens = tokenize(&state).unwrap();
        let mut parser = super::Parser::new(state.file.clone(), &tokens);
        parser.parse_expression().unwrap()
    }

    fn expression_err(code: &str) -> crate::error::Diagnostic {
        let state = State::new(SourceFile::new(vec!["<memory>".into()], format!("{code}\n")));
        let tokens = tokenize(&state).unwrap();
        let mut parser = super::Parser::new(state.file.clone(), &tokens);
        parser.parse_expression().unwrap_err()
    }

    #[test]
    fn precedence_mul_over_add() {
        let parsed = expression("1 + 2 * 3");
        let ExpressionAstKind::Binary { op, right, .. } = &parsed.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOperator::Add);
        assert!(matches!(
            &right.kind,
            ExpressionAstKind::Binary { op: BinaryOperator::Mul, .. }
        ));
    }

    #[test]
    fn comparison() {
        let parsed = expression("i < len(values)");
        assert!(matches!(
            &parsed.kind,
            ExpressionAstKind::Compare { op: CompareOperator::Lt, .. }
        ));
    }

    #[test]
    fn chained_comparison_is_unsupported() {
        let error = expression_err("0 < x < 10");
        assert_eq!(error.kind, DiagnosticKind::UnsupportedConstruct);
    }

    #[test]
    fn membership() {
        let parsed = expression("key in counts");
        assert!(matches!(
            &parsed.kind,
            ExpressionAstKind::Membership { negated: false, .. }
        ));
        let parsed = expression("key not in counts");
        assert!(matches!(
            &parsed.kind,
            ExpressionAstKind::Membership { negated: true, .. }
        ));
    }

    #[test]
    fn is_none_comparison() {
        let parsed = expression("value is None");
        assert!(matches!(
            &parsed.kind,
            ExpressionAstKind::Compare { op: CompareOperator::Is, .. }
        ));
        let parsed = expression("value is not None");
        assert!(matches!(
            &parsed.kind,
            ExpressionAstKind::Compare { op: CompareOperator::IsNot, .. }
        ));
    }

    #[test]
    fn await_is_prefix() {
        let parsed = expression("await greet(\"World\")");
        let ExpressionAstKind::Await(inner) = &parsed.kind else {
            panic!("expected await");
        };
        assert!(matches!(&inner.kind, ExpressionAstKind::Call { .. }));
    }

    #[test]
    fn method_call_chain() {
        let parsed = expression("line.strip().upper()");
        let ExpressionAstKind::Call { function, .. } = &parsed.kind else {
            panic!("expected call");
        };
        assert!(matches!(&function.kind, ExpressionAstKind::Attribute { .. }));
    }

    #[test]
    fn conditional_expression() {
        let parsed = expression("x if flag else y");
        assert!(matches!(&parsed.kind, ExpressionAstKind::Conditional { .. }));
    }

    #[test]
    fn displays() {
        assert!(matches!(expression("[1, 2, 3]").kind, ExpressionAstKind::List(items) if items.len() == 3));
        assert!(matches!(expression("{\"a\": 1}").kind, ExpressionAstKind::Dict(entries) if entries.len() == 1));
        assert!(matches!(expression("{1, 2}").kind, ExpressionAstKind::SetDisplay(items) if items.len() == 2));
        assert!(matches!(expression("(1, 2)").kind, ExpressionAstKind::Tuple(items) if items.len() == 2));
    }

    #[test]
    fn comprehension_single_clause() {
        let parsed = expression("[x * 2 for x in values if x > 0]");
        let ExpressionAstKind::Comprehension { condition, .. } = &parsed.kind else {
            panic!("expected comprehension");
        };
        assert!(condition.is_some());
    }

    #[test]
    fn multi_clause_comprehension_is_unsupported() {
        let error = expression_err("[x for x in xs for y in ys]");
        assert_eq!(error.kind, DiagnosticKind::UnsupportedConstruct);
    }

    #[test]
    fn fstring_interpolation_is_parsed() {
        let parsed = expression("f\"Hello, {name}!\"");
        let ExpressionAstKind::FString(parts) = &parsed.kind else {
            panic!("expected f-string");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(
            &parts[1],
            FStringPartAst::Interpolation { expression, spec: None }
                if matches!(&expression.kind, ExpressionAstKind::Name(name) if name == "name")
        ));
    }

    #[rstest]
    #[case("value // 2", BinaryOperator::FloorDiv)]
    #[case("value % 2", BinaryOperator::Mod)]
    #[case("value / 2", BinaryOperator::Div)]
    fn division_operators(#[case] code: &str, #[case] expected: BinaryOperator) {
        let parsed = expression(code);
        assert!(matches!(&parsed.kind, ExpressionAstKind::Binary { op, .. } if *op == expected));
    }
}
