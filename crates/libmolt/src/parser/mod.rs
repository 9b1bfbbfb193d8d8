//! Recursive-descent parser for the annotated Python subset.
//!
//! The lexer turns layout into explicit `Newline`/`Indent`/`Dedent` tokens,
//! so the parser itself is a conventional recursive descent over the token
//! stream. Items (functions, classes, constants, imports) live here;
//! statements and expressions are in their submodules.
//!
//! Constructs outside the accepted subset are rejected with
//! `E_UNSUPPORTED_CONSTRUCT` pointing at the offending token; anything the
//! lexer or parser cannot make sense of at all is `E_PARSE`.

use std::ops::Range;

use crate::ast::{ClassAst, ConstantAst, FieldAst, FunctionAst, Ident, ImportAst, ItemAst, ModuleAst, ParamAst, StatementAstKind, TypeAst, TypeAstKind};
use crate::error::{Diagnostic, DiagnosticKind};
use crate::file::SourceFile;
use crate::lexer::{tokenize, Keyword, Token, TokenKind};
use crate::nom_tools::State;

mod expression;
mod statement;

/// Parses a source file into its surface AST.
pub fn parse(state: &State) -> Result<ModuleAst, Diagnostic> {
    let tokens = tokenize(state)?;
    let mut parser = Parser::new(state.file.clone(), &tokens);
    parser.parse_module()
}

/// Token cursor shared by the item, statement and expression grammars.
pub struct Parser<'tokens> {
    file: SourceFile,
    tokens: &'tokens [Token],
    pos: usize,
}

impl<'tokens> Parser<'tokens> {
    pub fn new(file: SourceFile, tokens: &'tokens [Token]) -> Self {
        Self { file, tokens, pos: 0 }
    }

    // --- cursor primitives -------------------------------------------------

    pub(crate) fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| self.tokens.last().expect("token stream always ends with Eof"))
    }

    fn peek_ahead(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .unwrap_or_else(|| self.tokens.last().expect("token stream always ends with Eof"))
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn at(&self, kind: &TokenKind) -> bool {
        self.peek().kind == *kind
    }

    pub(crate) fn at_keyword(&self, keyword: Keyword) -> bool {
        matches!(&self.peek().kind, TokenKind::Keyword(k) if *k == keyword)
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, Diagnostic> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.parse_error(format!("expected {what}, found {}", self.peek().kind.describe())))
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: Keyword, what: &str) -> Result<Token, Diagnostic> {
        if self.at_keyword(keyword) {
            Ok(self.advance())
        } else {
            Err(self.parse_error(format!("expected {what}, found {}", self.peek().kind.describe())))
        }
    }

    pub(crate) fn expect_ident(&mut self, what: &str) -> Result<Ident, Diagnostic> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let token = self.advance();
                Ok(Ident::new(name, token.position))
            }
            _ => Err(self.parse_error(format!("expected {what}, found {}", self.peek().kind.describe()))),
        }
    }

    pub(crate) fn expect_newline(&mut self) -> Result<(), Diagnostic> {
        self.expect(&TokenKind::Newline, "end of line")?;
        Ok(())
    }

    pub(crate) fn parse_error(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parse, self.file.clone(), self.peek().position.clone(), message)
    }

    pub(crate) fn unsupported(&self, position: Range<usize>, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::UnsupportedConstruct, self.file.clone(), position, message)
    }

    fn skip_newlines(&mut self) {
        while self.at(&TokenKind::Newline) {
            self.advance();
        }
    }

    // --- items -------------------------------------------------------------

    fn parse_module(&mut self) -> Result<ModuleAst, Diagnostic> {
        let mut items = Vec::new();

        loop {
            self.skip_newlines();
            if self.at(&TokenKind::Eof) {
                break;
            }
            items.push(self.parse_item()?);
        }

        Ok(ModuleAst { file: self.file.clone(), items })
    }

    fn parse_item(&mut self) -> Result<ItemAst, Diagnostic> {
        let attributes = self.collect_attributes()?;
        let is_dataclass = self.collect_dataclass_marker()?;

        match &self.peek().kind {
            TokenKind::Keyword(Keyword::Def) => Ok(ItemAst::Function(self.parse_function(false, attributes)?)),
            TokenKind::Keyword(Keyword::Async) => {
                self.advance();
                self.expect_keyword(Keyword::Def, "'def' after 'async'")?;
                Ok(ItemAst::Function(self.parse_function_after_def(true, attributes)?))
            }
            TokenKind::Keyword(Keyword::Class) => Ok(ItemAst::Class(self.parse_class(is_dataclass, attributes)?)),
            TokenKind::Keyword(Keyword::Import) | TokenKind::Keyword(Keyword::From) => Ok(ItemAst::Import(self.parse_import()?)),
            TokenKind::Keyword(keyword) if keyword.is_unsupported() => {
                let token = self.peek().clone();
                Err(self.unsupported(token.position, format!("'{keyword}' is outside the supported subset")))
            }
            TokenKind::Ident(_) if self.is_constant_assignment() => Ok(ItemAst::Constant(self.parse_constant()?)),
            _ => {
                let statement = self.parse_statement()?;
                Ok(ItemAst::Statement(statement))
            }
        }
    }

    /// Collects consecutive pass-through attribute lines.
    fn collect_attributes(&mut self) -> Result<Vec<String>, Diagnostic> {
        let mut attributes = Vec::new();
        while let TokenKind::Attribute(payload) = &self.peek().kind {
            attributes.push(payload.clone());
            self.advance();
            self.expect_newline()?;
            self.skip_newlines();
        }
        Ok(attributes)
    }

    /// Consumes a `@dataclass` marker line if present.
    ///
    /// Any other decorator is outside the subset.
    fn collect_dataclass_marker(&mut self) -> Result<bool, Diagnostic> {
        if !self.at(&TokenKind::At) {
            return Ok(false);
        }
        let at = self.advance();
        let name = self.expect_ident("decorator name")?;
        if name.name != "dataclass" {
            return Err(self.unsupported(
                at.position.start..name.position.end,
                format!("decorator '@{}' is outside the supported subset; only '@dataclass' is accepted", name.name),
            ));
        }
        self.expect_newline()?;
        self.skip_newlines();
        Ok(true)
    }

    /// A top-level `NAME: T = value` or `NAME = value` line is a constant.
    fn is_constant_assignment(&self) -> bool {
        matches!(self.peek_ahead(1).kind, TokenKind::Assign | TokenKind::Colon)
    }

    fn parse_constant(&mut self) -> Result<ConstantAst, Diagnostic> {
        let name = self.expect_ident("constant name")?;
        let annotation = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&TokenKind::Assign, "'='")?;
        let value = self.parse_expression()?;
        let position = name.position.start..value.position.end;
        self.expect_newline()?;
        Ok(ConstantAst { name, annotation, value, position })
    }

    fn parse_import(&mut self) -> Result<ImportAst, Diagnostic> {
        if self.eat_keyword(Keyword::Import) {
            let module = self.parse_dotted_name()?;
            let position = module.position.clone();
            self.expect_newline()?;
            return Ok(ImportAst { module, names: Vec::new(), position });
        }

        self.expect_keyword(Keyword::From, "'import' or 'from'")?;
        let module = self.parse_dotted_name()?;
        self.expect_keyword(Keyword::Import, "'import'")?;
        let mut names = vec![self.expect_ident("imported name")?];
        while self.eat(&TokenKind::Comma) {
            names.push(self.expect_ident("imported name")?);
        }
        let position = module.position.start..names.last().map(|name| name.position.end).unwrap_or(module.position.end);
        self.expect_newline()?;
        Ok(ImportAst { module, names, position })
    }

    fn parse_dotted_name(&mut self) -> Result<Ident, Diagnostic> {
        let first = self.expect_ident("module name")?;
        let mut name = first.name;
        let mut position = first.position;
        while self.eat(&TokenKind::Dot) {
            let next = self.expect_ident("module name")?;
            name.push('.');
            name.push_str(&next.name);
            position = position.start..next.position.end;
        }
        Ok(Ident::new(name, position))
    }

    // --- functions ---------------------------------------------------------

    fn parse_function(&mut self, is_async: bool, attributes: Vec<String>) -> Result<FunctionAst, Diagnostic> {
        self.expect_keyword(Keyword::Def, "'def'")?;
        self.parse_function_after_def(is_async, attributes)
    }

    fn parse_function_after_def(&mut self, is_async: bool, attributes: Vec<String>) -> Result<FunctionAst, Diagnostic> {
        let name = self.expect_ident("function name")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let params = self.parse_params()?;
        self.expect(&TokenKind::RParen, "')'")?;
        let ret = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        let position = name.position.clone();
        Ok(FunctionAst {
            name,
            params,
            ret,
            body,
            is_async,
            attributes,
            position,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<ParamAst>, Diagnostic> {
        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) {
            if self.at(&TokenKind::Star) {
                let token = self.peek().clone();
                return Err(self.unsupported(token.position, "'*args' and '**kwargs' are outside the supported subset"));
            }
            let name = self.expect_ident("parameter name")?;
            let annotation = if self.eat(&TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            params.push(ParamAst { name, annotation, default });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    /// Parses `: NEWLINE INDENT statements DEDENT`.
    pub(crate) fn parse_block(&mut self) -> Result<Vec<crate::ast::StatementAst>, Diagnostic> {
        self.expect(&TokenKind::Colon, "':'")?;
        self.expect_newline()?;
        self.expect(&TokenKind::Indent, "an indented block")?;
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(&TokenKind::Dedent) {
                break;
            }
            if self.at(&TokenKind::Eof) {
                break;
            }
            statements.push(self.parse_statement()?);
        }
        if statements.is_empty() {
            return Err(self.parse_error("expected at least one statement in block"));
        }
        Ok(statements)
    }

    // --- classes -----------------------------------------------------------

    fn parse_class(&mut self, is_dataclass: bool, attributes: Vec<String>) -> Result<ClassAst, Diagnostic> {
        self.expect_keyword(Keyword::Class, "'class'")?;
        let name = self.expect_ident("class name")?;

        let mut bases = Vec::new();
        if self.eat(&TokenKind::LParen) {
            while !self.at(&TokenKind::RParen) {
                bases.push(self.expect_ident("base class name")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "')'")?;
        }

        self.expect(&TokenKind::Colon, "':'")?;
        self.expect_newline()?;
        self.expect(&TokenKind::Indent, "an indented class body")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(&TokenKind::Dedent) || self.at(&TokenKind::Eof) {
                break;
            }

            let member_attributes = self.collect_attributes()?;
            match &self.peek().kind {
                TokenKind::Keyword(Keyword::Def) => {
                    methods.push(self.parse_function(false, member_attributes)?);
                }
                TokenKind::Keyword(Keyword::Async) => {
                    self.advance();
                    self.expect_keyword(Keyword::Def, "'def' after 'async'")?;
                    methods.push(self.parse_function_after_def(true, member_attributes)?);
                }
                TokenKind::Keyword(Keyword::Pass) => {
                    self.advance();
                    self.expect_newline()?;
                }
                TokenKind::Ident(_) => {
                    let field_name = self.expect_ident("attribute name")?;
                    self.expect(&TokenKind::Colon, "':' after attribute name")?;
                    let annotation = self.parse_type()?;
                    let default = if self.eat(&TokenKind::Assign) {
                        Some(self.parse_expression()?)
                    } else {
                        None
                    };
                    self.expect_newline()?;
                    fields.push(FieldAst {
                        name: field_name,
                        annotation,
                        default,
                        attributes: member_attributes,
                    });
                }
                _ => {
                    return Err(self.parse_error(format!(
                        "expected attribute or method in class body, found {}",
                        self.peek().kind.describe()
                    )));
                }
            }
        }

        let position = name.position.clone();
        Ok(ClassAst {
            name,
            bases,
            is_dataclass,
            fields,
            methods,
            attributes,
            position,
        })
    }

    // --- type annotations --------------------------------------------------

    /// Parses a type annotation: `name`, `name[args]`, or a `|` union.
    pub(crate) fn parse_type(&mut self) -> Result<TypeAst, Diagnostic> {
        let first = self.parse_type_atom()?;
        if !self.at(&TokenKind::Pipe) {
            return Ok(first);
        }

        let mut members = vec![first];
        while self.eat(&TokenKind::Pipe) {
            members.push(self.parse_type_atom()?);
        }
        let position = members.first().map(|member| member.position.start).unwrap_or(0)
            ..members.last().map(|member| member.position.end).unwrap_or(0);
        Ok(TypeAst {
            kind: TypeAstKind::Union(members),
            position,
        })
    }

    fn parse_type_atom(&mut self) -> Result<TypeAst, Diagnostic> {
        if self.at_keyword(Keyword::None) {
            let token = self.advance();
            return Ok(TypeAst {
                kind: TypeAstKind::Name("None".to_string()),
                position: token.position,
            });
        }

        let name = self.parse_dotted_name()?;
        if !self.eat(&TokenKind::LBracket) {
            let position = name.position.clone();
            return Ok(TypeAst {
                kind: TypeAstKind::Name(name.name),
                position,
            });
        }

        let mut args = Vec::new();
        while !self.at(&TokenKind::RBracket) {
            args.push(self.parse_type()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let close = self.expect(&TokenKind::RBracket, "']'")?;
        Ok(TypeAst {
            kind: TypeAstKind::Generic { base: name.name, args },
            position: name.position.start..close.position.end,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::ast::{ItemAst, TypeAstKind};
    use crate::error::DiagnosticKind;
    use crate::file::SourceFile;
    use crate::nom_tools::State;

    fn parse(code: &str) -> crate::ast::ModuleAst {
        let state = State::new(SourceFile::new(vec!["<memory>".into()], code.to_string()));
        super::parse(&state).unwrap()
    }

    fn parse_err(code: &str) -> crate::error::Diagnostic {
        let state = State::new(SourceFile::new(vec!["<memory>".into()], code.to_string()));
        super::parse(&state).unwrap_err()
    }

    #[test]
    fn function_definition() {
        let module = parse("def greet(name: str) -> str:\n    return name\n");
        let ItemAst::Function(function) = &module.items[0] else {
            panic!("expected function");
        };
        assert_eq!(function.name.name, "greet");
        assert_eq!(function.params.len(), 1);
        assert_eq!(function.params[0].name.name, "name");
        assert!(!function.is_async);
        assert!(function.ret.is_some());
    }

    #[test]
    fn async_function_definition() {
        let module = parse("async def main() -> None:\n    pass\n");
        let ItemAst::Function(function) = &module.items[0] else {
            panic!("expected function");
        };
        assert!(function.is_async);
    }

    #[test]
    fn dataclass_marker() {
        let module = parse("@dataclass\nclass Point:\n    x: float\n    y: float\n");
        let ItemAst::Class(class) = &module.items[0] else {
            panic!("expected class");
        };
        assert!(class.is_dataclass);
        assert_eq!(class.fields.len(), 2);
    }

    #[test]
    fn other_decorators_are_unsupported() {
        let error = parse_err("@property\ndef f() -> int:\n    return 1\n");
        assert_eq!(error.kind, DiagnosticKind::UnsupportedConstruct);
    }

    #[test]
    fn base_class_list_parses() {
        // rejected later by the analyzer, not the parser
        let module = parse("class Child(Base):\n    pass\n");
        let ItemAst::Class(class) = &module.items[0] else {
            panic!("expected class");
        };
        assert_eq!(class.bases.len(), 1);
    }

    #[test]
    fn imports() {
        let module = parse("import asyncio\nfrom utils import helper, other\n");
        let ItemAst::Import(plain) = &module.items[0] else {
            panic!("expected import");
        };
        assert_eq!(plain.module.name, "asyncio");
        assert!(plain.names.is_empty());

        let ItemAst::Import(from) = &module.items[1] else {
            panic!("expected import");
        };
        assert_eq!(from.module.name, "utils");
        assert_eq!(from.names.len(), 2);
    }

    #[test]
    fn top_level_constant() {
        let module = parse("LIMIT: int = 100\n");
        let ItemAst::Constant(constant) = &module.items[0] else {
            panic!("expected constant");
        };
        assert_eq!(constant.name.name, "LIMIT");
        assert!(constant.annotation.is_some());
    }

    #[test]
    fn union_annotation() {
        let module = parse("def f(x: int | None) -> None:\n    pass\n");
        let ItemAst::Function(function) = &module.items[0] else {
            panic!("expected function");
        };
        let annotation = function.params[0].annotation.as_ref().unwrap();
        assert!(matches!(&annotation.kind, TypeAstKind::Union(members) if members.len() == 2));
    }

    #[test]
    fn generic_annotation() {
        let module = parse("def f(xs: dict[str, int]) -> None:\n    pass\n");
        let ItemAst::Function(function) = &module.items[0] else {
            panic!("expected function");
        };
        let annotation = function.params[0].annotation.as_ref().unwrap();
        let TypeAstKind::Generic { base, args } = &annotation.kind else {
            panic!("expected generic annotation");
        };
        assert_eq!(base, "dict");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn try_except_is_unsupported() {
        let error = parse_err("def f() -> None:\n    try:\n        pass\n    except:\n        pass\n");
        assert_eq!(error.kind, DiagnosticKind::UnsupportedConstruct);
    }

    #[test]
    fn attributes_attach_to_items() {
        let module = parse("# #[derive(Serialize)]\n@dataclass\nclass Point:\n    x: float\n");
        let ItemAst::Class(class) = &module.items[0] else {
            panic!("expected class");
        };
        assert_eq!(class.attributes, vec!["#[derive(Serialize)]".to_string()]);
    }
}
