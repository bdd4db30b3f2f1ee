use std::rc::Rc;

use crate::common::source::Source;
use crate::common::span::Span;
use crate::compiler::syntax::Syntax;
use crate::compiler::token::{Token, TokenKind};

/// Characters that may appear in a symbol alongside
/// letters, digits, and `_`. Operators like `>=` lex as
/// plain symbols.
const GLYPH_CHARS: &str = "+-*/<>=!?&|%^~.";

/// Characters that lex as one-character punctuation tokens.
const PUNCT_CHARS: &str = "()[]{}:";

/// The lexer reads a source front to back and produces a
/// flat stream of tokens, ending with an `Eof` token. It
/// greedily consumes the longest token it can at each
/// index.
#[derive(Debug)]
pub struct Lexer {
    source: Rc<Source>,
    index: usize,
    tokens: Vec<Rc<Token>>,
}

impl Lexer {
    /// Lexes a source into a stream of tokens.
    pub fn lex(source: Rc<Source>) -> Result<Vec<Rc<Token>>, Syntax> {
        let mut lexer = Lexer {
            source,
            index: 0,
            tokens: vec![],
        };

        lexer.strip();
        while lexer.index < lexer.source.contents.len() {
            let token = lexer.next_token()?;
            lexer.tokens.push(Rc::new(token));
            lexer.strip();
        }

        let end = Span::point(&lexer.source, lexer.source.contents.len());
        lexer.tokens.push(Rc::new(Token::new(TokenKind::Eof, "", end)));
        Ok(lexer.tokens)
    }

    fn remaining(&self) -> &str {
        &self.source.contents[self.index..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    /// Strips whitespace and `;` line comments.
    fn strip(&mut self) {
        loop {
            let old_index = self.index;

            while let Some(c) = self.peek() {
                if !c.is_whitespace() {
                    break;
                }
                self.index += c.len_utf8();
            }

            if let Some(';') = self.peek() {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.index += c.len_utf8();
                }
            }

            if self.index == old_index {
                break;
            }
        }
    }

    /// Consumes characters while `pred` holds, returning the
    /// consumed slice.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &str {
        let start = self.index;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.index += c.len_utf8();
        }
        &self.source.contents[start..self.index]
    }

    fn next_token(&mut self) -> Result<Token, Syntax> {
        let c = match self.peek() {
            Some(c) => c,
            None => {
                let span = Span::point(&self.source, self.index);
                return Ok(Token::new(TokenKind::Eof, "", span));
            }
        };

        if PUNCT_CHARS.contains(c) {
            let span = Span::point(&self.source, self.index);
            self.index += c.len_utf8();
            return Ok(Token::new(TokenKind::Punctuation, &c.to_string(), span));
        }

        if c == '"' {
            return self.string();
        }

        // a `-` immediately followed by a digit begins a
        // negative number, not the subtraction symbol
        let starts_number = c.is_ascii_digit()
            || (c == '-' && {
                let mut chars = self.remaining().chars();
                chars.next();
                matches!(chars.next(), Some(d) if d.is_ascii_digit())
            });
        if starts_number {
            return self.number();
        }

        if c.is_alphabetic() || c == '_' || GLYPH_CHARS.contains(c) {
            return Ok(self.symbol());
        }

        Err(Syntax::error(
            &format!("unrecognized character '{}'", c),
            &Span::point(&self.source, self.index),
        ))
    }

    /// Lexes an integer or a float. A float needs digits on
    /// both sides of the dot.
    fn number(&mut self) -> Result<Token, Syntax> {
        let start = self.index;

        if let Some('-') = self.peek() {
            self.index += 1;
        }
        self.take_while(|c| c.is_ascii_digit());

        let mut kind = TokenKind::IntLiteral;
        let mut chars = self.remaining().chars();
        if let (Some('.'), Some(d)) = (chars.next(), chars.next()) {
            if d.is_ascii_digit() {
                self.index += 1;
                self.take_while(|c| c.is_ascii_digit());
                kind = TokenKind::FloatLiteral;
            }
        }

        let text = &self.source.contents[start..self.index];
        let span = Span::new(&self.source, start, self.index - start);
        Ok(Token::new(kind, text, span))
    }

    /// Lexes a string literal, resolving escapes. Strings
    /// may not run over a line break.
    fn string(&mut self) -> Result<Token, Syntax> {
        let start = self.index;
        self.index += 1; // the opening quote

        let mut text = String::new();
        loop {
            let c = match self.peek() {
                Some(c) => c,
                None => {
                    return Err(Syntax::error(
                        "unterminated string literal",
                        &Span::point(&self.source, start),
                    ))
                }
            };

            match c {
                '"' => {
                    self.index += 1;
                    break;
                }
                '\n' => {
                    return Err(Syntax::error(
                        "unterminated string literal",
                        &Span::point(&self.source, start),
                    ))
                }
                '\\' => {
                    self.index += 1;
                    let escape = self.peek().ok_or_else(|| {
                        Syntax::error(
                            "unterminated string literal",
                            &Span::point(&self.source, start),
                        )
                    })?;
                    match escape {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        '\\' => text.push('\\'),
                        '"' => text.push('"'),
                        other => {
                            return Err(Syntax::error(
                                &format!("unknown escape '\\{}'", other),
                                &Span::point(&self.source, self.index),
                            ))
                        }
                    }
                    self.index += escape.len_utf8();
                }
                other => {
                    text.push(other);
                    self.index += other.len_utf8();
                }
            }
        }

        let span = Span::new(&self.source, start, self.index - start);
        Ok(Token::new(TokenKind::StrLiteral, &text, span))
    }

    /// Lexes a symbol; `true` and `false` come back as bool
    /// literals instead.
    fn symbol(&mut self) -> Token {
        let start = self.index;
        self.take_while(|c| {
            c.is_alphanumeric() || c == '_' || GLYPH_CHARS.contains(c)
        });

        let text = &self.source.contents[start..self.index];
        let span = Span::new(&self.source, start, self.index - start);

        let kind = match text {
            "true" | "false" => TokenKind::BoolLiteral,
            _ => TokenKind::Symbol,
        };
        Token::new(kind, text, span)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::lex(Source::source(src))
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn expression() {
        use TokenKind::*;
        assert_eq!(
            kinds("(+ 1 2.5)"),
            vec![
                Punctuation,
                Symbol,
                IntLiteral,
                FloatLiteral,
                Punctuation,
                Eof
            ]
        );
    }

    #[test]
    fn operators_are_symbols() {
        let tokens = Lexer::lex(Source::source(">= <= = - foo_bar")).unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec![">=", "<=", "=", "-", "foo_bar", ""]);
        assert!(tokens[..5].iter().all(|t| t.kind == TokenKind::Symbol));
    }

    #[test]
    fn negative_number() {
        let tokens = Lexer::lex(Source::source("(- -12 3)")).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Symbol);
        assert_eq!(tokens[2].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[2].text, "-12");
    }

    #[test]
    fn bools_and_comments() {
        use TokenKind::*;
        assert_eq!(
            kinds("true ; the rest is noise\nfalse"),
            vec![BoolLiteral, BoolLiteral, Eof]
        );
    }

    #[test]
    fn strings_unescape() {
        let tokens = Lexer::lex(Source::source("\"a\\nb\"")).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::StrLiteral);
        assert_eq!(tokens[0].text, "a\nb");
        assert_eq!(tokens[0].span.contents(), "\"a\\nb\"");
    }

    #[test]
    fn unterminated_string() {
        assert!(Lexer::lex(Source::source("\"oops")).is_err());
        assert!(Lexer::lex(Source::source("\"oops\nmore\"")).is_err());
    }

    #[test]
    fn spans_point_home() {
        let tokens = Lexer::lex(Source::source("(def a 2)\n(+ a 1)")).unwrap();
        let a = &tokens[2];
        assert_eq!(a.text, "a");
        assert_eq!(a.span.line_col(), (1, 6));
    }
}
