//! Statement grammar of the accepted subset.

use crate::ast::{BinaryOperator, ExpressionAst, ExpressionAstKind, StatementAst, StatementAstKind, TargetAst};
use crate::error::Diagnostic;
use crate::lexer::{Keyword, TokenKind};

use super::Parser;

impl Parser<'_> {
    pub(crate) fn parse_statement(&mut self) -> Result<StatementAst, Diagnostic> {
        let start = self.peek().position.start;
        let kind = match &self.peek().kind {
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::While) => self.parse_while()?,
            TokenKind::Keyword(Keyword::For) => self.parse_for()?,
            TokenKind::Keyword(Keyword::With) => self.parse_with()?,
            TokenKind::Keyword(Keyword::Return) => self.parse_return()?,
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                self.expect_newline()?;
                StatementAstKind::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                self.expect_newline()?;
                StatementAstKind::Continue
            }
            TokenKind::Keyword(Keyword::Pass) => {
                self.advance();
                self.expect_newline()?;
                StatementAstKind::Pass
            }
            TokenKind::Keyword(keyword) if keyword.is_unsupported() => {
                let token = self.peek().clone();
                return Err(self.unsupported(token.position, format!("'{keyword}' is outside the supported subset")));
            }
            TokenKind::Keyword(Keyword::Def) | TokenKind::Keyword(Keyword::Class) => {
                let token = self.peek().clone();
                return Err(self.unsupported(token.position, "nested definitions are outside the supported subset"));
            }
            _ => self.parse_assignment_or_expression()?,
        };
        let end = self.tokens_end(start);
        Ok(StatementAst { kind, position: start..end })
    }

    fn tokens_end(&self, start: usize) -> usize {
        // position of the last consumed token
        self.previous_end().max(start)
    }

    fn previous_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].position.end
        }
    }

    fn parse_if(&mut self) -> Result<StatementAstKind, Diagnostic> {
        self.expect_keyword(Keyword::If, "'if'")?;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        let mut branches = vec![(condition, body)];
        let mut else_body = None;

        loop {
            if self.at_keyword(Keyword::Elif) {
                self.advance();
                let condition = self.parse_expression()?;
                let body = self.parse_block()?;
                branches.push((condition, body));
            } else if self.at_keyword(Keyword::Else) {
                self.advance();
                else_body = Some(self.parse_block()?);
                break;
            } else {
                break;
            }
        }

        Ok(StatementAstKind::If { branches, else_body })
    }

    fn parse_while(&mut self) -> Result<StatementAstKind, Diagnostic> {
        self.expect_keyword(Keyword::While, "'while'")?;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(StatementAstKind::While { condition, body })
    }

    fn parse_for(&mut self) -> Result<StatementAstKind, Diagnostic> {
        self.expect_keyword(Keyword::For, "'for'")?;
        // the target is parsed as a pattern, not an expression, so the
        // `in` of the loop header is not swallowed as a membership test
        let target = self.parse_for_target()?;
        self.expect_keyword(Keyword::In, "'in'")?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(StatementAstKind::For { target, iterable, body })
    }

    fn parse_for_target(&mut self) -> Result<TargetAst, Diagnostic> {
        let first = self.parse_single_for_target()?;
        if !self.at(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at_keyword(Keyword::In) {
                break;
            }
            items.push(self.parse_single_for_target()?);
        }
        Ok(TargetAst::Tuple(items))
    }

    fn parse_single_for_target(&mut self) -> Result<TargetAst, Diagnostic> {
        if self.eat(&TokenKind::LParen) {
            let inner = self.parse_for_target()?;
            self.expect(&TokenKind::RParen, "')'")?;
            return Ok(inner);
        }
        let ident = self.expect_ident("loop variable")?;
        Ok(TargetAst::Name(ident))
    }

    fn parse_with(&mut self) -> Result<StatementAstKind, Diagnostic> {
        self.expect_keyword(Keyword::With, "'with'")?;
        let resource = self.parse_expression()?;
        if self.at(&TokenKind::Comma) {
            let token = self.peek().clone();
            return Err(self.unsupported(token.position, "multiple 'with' items are outside the supported subset"));
        }
        let binding = if self.eat_keyword(Keyword::As) {
            Some(self.expect_ident("binding name after 'as'")?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(StatementAstKind::With { resource, binding, body })
    }

    fn parse_return(&mut self) -> Result<StatementAstKind, Diagnostic> {
        self.expect_keyword(Keyword::Return, "'return'")?;
        if self.eat(&TokenKind::Newline) {
            return Ok(StatementAstKind::Return(None));
        }
        let value = self.parse_expression_list()?;
        self.expect_newline()?;
        Ok(StatementAstKind::Return(Some(value)))
    }

    /// Parses `expr`, `target = value`, `target op= value` or an annotated
    /// binding `name: T = value`.
    fn parse_assignment_or_expression(&mut self) -> Result<StatementAstKind, Diagnostic> {
        let expression = self.parse_expression_list()?;

        if self.eat(&TokenKind::Colon) {
            // annotated binding; the target must be a plain name
            let target = self.expression_to_target(expression)?;
            if !matches!(target, TargetAst::Name(_)) {
                return Err(self.parse_error("only plain names can carry a type annotation"));
            }
            let annotation = self.parse_type()?;
            self.expect(&TokenKind::Assign, "'=' after annotated binding")?;
            let value = self.parse_expression_list()?;
            self.expect_newline()?;
            return Ok(StatementAstKind::Assign {
                target,
                annotation: Some(annotation),
                value,
            });
        }

        if self.eat(&TokenKind::Assign) {
            let target = self.expression_to_target(expression)?;
            let value = self.parse_expression_list()?;
            self.expect_newline()?;
            return Ok(StatementAstKind::Assign {
                target,
                annotation: None,
                value,
            });
        }

        if let Some(op) = self.augmented_operator() {
            self.advance();
            let target = self.expression_to_target(expression)?;
            let value = self.parse_expression_list()?;
            self.expect_newline()?;
            return Ok(StatementAstKind::AugAssign { target, op, value });
        }

        self.expect_newline()?;
        Ok(StatementAstKind::Expression(expression))
    }

    fn augmented_operator(&self) -> Option<BinaryOperator> {
        match self.peek().kind {
            TokenKind::PlusAssign => Some(BinaryOperator::Add),
            TokenKind::MinusAssign => Some(BinaryOperator::Sub),
            TokenKind::StarAssign => Some(BinaryOperator::Mul),
            TokenKind::SlashAssign => Some(BinaryOperator::Div),
            TokenKind::PercentAssign => Some(BinaryOperator::Mod),
            _ => None,
        }
    }

    /// Converts an already-parsed expression into an assignment target.
    fn expression_to_target(&self, expression: ExpressionAst) -> Result<TargetAst, Diagnostic> {
        let position = expression.position.clone();
        match expression.kind {
            ExpressionAstKind::Name(name) => Ok(TargetAst::Name(crate::ast::Ident::new(name, position))),
            ExpressionAstKind::Tuple(items) => {
                let mut targets = Vec::new();
                for item in items {
                    targets.push(self.expression_to_target(item)?);
                }
                Ok(TargetAst::Tuple(targets))
            }
            ExpressionAstKind::Attribute { object, field } => Ok(TargetAst::Attribute { object, field }),
            ExpressionAstKind::Subscript { object, index } => Ok(TargetAst::Index { object, index }),
            _ => Err(Diagnostic::new(
                crate::error::DiagnosticKind::Parse,
                self.file.clone(),
                position,
                "invalid assignment target",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::ast::{ItemAst, StatementAstKind, TargetAst};
    use crate::error::DiagnosticKind;
    use crate::file::SourceFile;
    use crate::nom_tools::State;

    fn body(code: &str) -> Vec<crate::ast::StatementAst> {
        let wrapped = format!("def f() -> None:\n{}", code);
        let state = State::new(SourceFile::new(vec!["<memory>".into()], wrapped));
        let module = crate::parser::parse(&state).unwrap();
        let ItemAst::Function(function) = module.items.into_iter().next().unwrap() else {
            panic!("expected function");
        };
        function.body
    }

    fn body_err(code: &str) -> crate::error::Diagnostic {
        let wrapped = format!("def f() -> None:\n{}", code);
        let state = State::new(SourceFile::new(vec!["<memory>".into()], wrapped));
        crate::parser::parse(&state).unwrap_err()
    }

    #[test]
    fn annotated_binding() {
        let statements = body("    x: int = 0\n");
        let StatementAstKind::Assign { target, annotation, .. } = &statements[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(target, TargetAst::Name(name) if name.name == "x"));
        assert!(annotation.is_some());
    }

    #[test]
    fn augmented_assignment() {
        let statements = body("    x: int = 0\n    x += 1\n");
        assert!(matches!(&statements[1].kind, StatementAstKind::AugAssign { .. }));
    }

    #[test]
    fn tuple_destructuring() {
        let statements = body("    tx, rx = mpsc_channel(10)\n");
        let StatementAstKind::Assign { target, .. } = &statements[0].kind else {
            panic!("expected assignment");
        };
        let TargetAst::Tuple(items) = target else {
            panic!("expected tuple target");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn if_elif_else() {
        let statements = body("    if x:\n        pass\n    elif y:\n        pass\n    else:\n        pass\n");
        let StatementAstKind::If { branches, else_body } = &statements[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert!(else_body.is_some());
    }

    #[test]
    fn while_loop() {
        let statements = body("    while i < 10:\n        i += 1\n");
        assert!(matches!(&statements[0].kind, StatementAstKind::While { .. }));
    }

    #[test]
    fn for_loop() {
        let statements = body("    for item in values:\n        print(item)\n");
        let StatementAstKind::For { target, .. } = &statements[0].kind else {
            panic!("expected for");
        };
        assert!(matches!(target, TargetAst::Name(name) if name.name == "item"));
    }

    #[test]
    fn with_statement() {
        let statements = body("    with TemporaryDirectory() as tmp:\n        print(tmp)\n");
        let StatementAstKind::With { binding, .. } = &statements[0].kind else {
            panic!("expected with");
        };
        assert_eq!(binding.as_ref().unwrap().name, "tmp");
    }

    #[test]
    fn attribute_assignment_target() {
        let statements = body("    self.count = 0\n");
        let StatementAstKind::Assign { target, .. } = &statements[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(target, TargetAst::Attribute { .. }));
    }

    #[test]
    fn subscript_assignment_target() {
        let statements = body("    counts[key] = 1\n");
        let StatementAstKind::Assign { target, .. } = &statements[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(target, TargetAst::Index { .. }));
    }

    #[test]
    fn nested_def_is_unsupported() {
        let error = body_err("    def g() -> None:\n        pass\n");
        assert_eq!(error.kind, DiagnosticKind::UnsupportedConstruct);
    }

    #[test]
    fn raise_is_unsupported() {
        let error = body_err("    raise ValueError(\"x\")\n");
        assert_eq!(error.kind, DiagnosticKind::UnsupportedConstruct);
    }
}
