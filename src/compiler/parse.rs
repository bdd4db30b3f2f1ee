use std::rc::Rc;

use crate::compiler::ast::{Ast, AstKind};
use crate::compiler::syntax::Syntax;
use crate::compiler::token::{Token, TokenKind};

/// Parses a whole token stream into a `Root` node whose
/// children are the top-level expressions in source order.
pub fn parse(tokens: Vec<Rc<Token>>) -> Result<Ast, Syntax> {
    let mut parser = Parser::new(tokens);

    let mut children = vec![];
    while !parser.eof() {
        children.push(parser.parse_sexpr()?);
    }

    let end = parser.peek().clone();
    Ok(Ast::branch(AstKind::Root, children, end))
}

/// A recursive-descent parser over the token stream. Only
/// parenthesized s-expressions nest, so there is exactly
/// one rule plus the leaf cases. A repl can drive it one
/// expression at a time through `parse_sexpr` and `eof`.
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Rc<Token>>,
    index: usize,
}

impl Parser {
    /// Builds a parser over a lexed token stream. The
    /// stream is expected to end with an `Eof` token.
    pub fn new(tokens: Vec<Rc<Token>>) -> Parser {
        Parser { tokens, index: 0 }
    }

    pub fn eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Rc<Token> {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Rc<Token> {
        let token = Rc::clone(self.peek());
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    /// Parses one expression: a literal, a symbol, or a
    /// parenthesized list of expressions.
    pub fn parse_sexpr(&mut self) -> Result<Ast, Syntax> {
        let token = self.advance();

        let kind = match token.kind {
            TokenKind::IntLiteral => AstKind::IntLiteral,
            TokenKind::FloatLiteral => AstKind::FloatLiteral,
            TokenKind::StrLiteral => AstKind::StrLiteral,
            TokenKind::BoolLiteral => AstKind::BoolLiteral,
            TokenKind::Symbol => AstKind::Symbol,
            TokenKind::Punctuation if token.text == "(" => {
                return self.finish_expr(token);
            }
            TokenKind::Punctuation if token.text == ")" => {
                return Err(Syntax::error("unexpected ')'", &token.span));
            }
            TokenKind::Punctuation => {
                return Err(Syntax::error(
                    &format!("unexpected '{}'", token.text),
                    &token.span,
                ));
            }
            TokenKind::Eof => {
                return Err(Syntax::error("unexpected end of input", &token.span));
            }
        };

        Ok(Ast::leaf(kind, token))
    }

    /// Parses the children of an expression whose opening
    /// paren has already been consumed.
    fn finish_expr(&mut self, open: Rc<Token>) -> Result<Ast, Syntax> {
        let mut children = vec![];

        loop {
            if self.eof() {
                return Err(Syntax::error(
                    "expected ')' before the end of input",
                    &open.span,
                ));
            }

            let closes = {
                let next = self.peek();
                next.kind == TokenKind::Punctuation && next.text == ")"
            };
            if closes {
                self.advance();
                return Ok(Ast::branch(AstKind::Expr, children, open));
            }

            children.push(self.parse_sexpr()?);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;
    use crate::compiler::lex::Lexer;

    fn parse_str(src: &str) -> Result<Ast, Syntax> {
        parse(Lexer::lex(Source::source(src)).unwrap())
    }

    #[test]
    fn nesting() {
        let root = parse_str("(+ (* 2 3) 4)").unwrap();
        assert_eq!(root.kind, AstKind::Root);
        assert_eq!(root.children.len(), 1);

        let expr = &root.children[0];
        assert_eq!(expr.kind, AstKind::Expr);
        assert_eq!(expr.children.len(), 3);
        assert!(expr.children[0].is_symbol("+"));
        assert_eq!(expr.children[1].kind, AstKind::Expr);
        assert_eq!(expr.children[2].kind, AstKind::IntLiteral);
    }

    #[test]
    fn top_level_sequence() {
        let root = parse_str("(def a 2) (def b 3) (+ a b)").unwrap();
        assert_eq!(root.children.len(), 3);
    }

    #[test]
    fn empty_expression() {
        let root = parse_str("()").unwrap();
        assert_eq!(root.children[0].kind, AstKind::Expr);
        assert!(root.children[0].children.is_empty());
    }

    #[test]
    fn bare_literals() {
        let root = parse_str("42 true \"hi\"").unwrap();
        let kinds: Vec<AstKind> = root.children.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![AstKind::IntLiteral, AstKind::BoolLiteral, AstKind::StrLiteral]
        );
    }

    #[test]
    fn unbalanced() {
        assert!(parse_str("(+ 1 2").is_err());
        assert!(parse_str(")").is_err());
        assert!(parse_str("(]").is_err());
    }
}
