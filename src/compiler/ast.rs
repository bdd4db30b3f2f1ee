use std::rc::Rc;

use crate::compiler::token::Token;

/// The kinds of node the parser produces. Only `Expr`
/// (a parenthesized s-expression) and `Root` (a whole
/// buffer of top-level expressions) have children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AstKind {
    Root,
    Expr,
    Symbol,
    IntLiteral,
    FloatLiteral,
    StrLiteral,
    BoolLiteral,
}

/// A node of the syntax tree. Each node keeps a handle on
/// the token it was parsed from, so errors found later in
/// the pipeline can still point at source code. The
/// emitter walks these read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub kind: AstKind,
    pub children: Vec<Ast>,
    pub token: Rc<Token>,
}

impl Ast {
    pub fn leaf(kind: AstKind, token: Rc<Token>) -> Ast {
        Ast {
            kind,
            children: vec![],
            token,
        }
    }

    pub fn branch(kind: AstKind, children: Vec<Ast>, token: Rc<Token>) -> Ast {
        Ast {
            kind,
            children,
            token,
        }
    }

    /// Whether this node is a symbol with the given text.
    pub fn is_symbol(&self, text: &str) -> bool {
        self.kind == AstKind::Symbol && self.token.text == text
    }
}
