use std::fmt::{Display, Formatter, Result};
use std::rc::Rc;

use crate::common::source::Source;

/// A `Span` refers to a section of a source, much like a
/// `&str`, but with a reference-counted handle on the
/// `Source` rather than a borrow. Spans are attached to
/// tokens and AST nodes so that errors can point back at
/// the offending piece of code.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Span {
    source: Option<Rc<Source>>,
    offset: usize,
    length: usize,
}

impl Span {
    /// Creates a new `Span` from a byte offset and a length.
    pub fn new(source: &Rc<Source>, offset: usize, length: usize) -> Span {
        Span {
            source: Some(Rc::clone(source)),
            offset,
            length,
        }
    }

    /// A `Span` that points at a single spot in the source.
    pub fn point(source: &Rc<Source>, offset: usize) -> Span {
        Span::new(source, offset, 1)
    }

    /// An empty `Span`, for errors that have no location.
    pub fn empty() -> Span {
        Span {
            source: None,
            offset: 0,
            length: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// The contents of the region this `Span` refers to.
    /// Panics when called on an empty `Span`.
    pub fn contents(&self) -> &str {
        let source = self
            .source
            .as_ref()
            .expect("an empty span does not have contents");
        &source.contents[self.offset..(self.offset + self.length).min(source.contents.len())]
    }

    /// The one-based line and column this `Span` starts on.
    pub fn line_col(&self) -> (usize, usize) {
        let source = self
            .source
            .as_ref()
            .expect("an empty span does not have a location");
        let before = &source.contents[..self.offset.min(source.contents.len())];

        let line = before.matches('\n').count() + 1;
        let col = match before.rfind('\n') {
            Some(newline) => self.offset - newline,
            None => self.offset + 1,
        };

        (line, col)
    }

    /// The full text of the line this `Span` starts on,
    /// without its trailing newline.
    pub fn line_contents(&self) -> &str {
        let source = self
            .source
            .as_ref()
            .expect("an empty span does not have a location");
        let contents = &source.contents;

        let start = match contents[..self.offset.min(contents.len())].rfind('\n') {
            Some(newline) => newline + 1,
            None => 0,
        };
        let end = match contents[start..].find('\n') {
            Some(newline) => start + newline,
            None => contents.len(),
        };

        &contents[start..end]
    }
}

impl Display for Span {
    /// Renders the location header, the offending source
    /// line, and a caret underline the length of the span:
    /// ```plain
    /// ERROR: line 1, column 6
    /// (def foo)
    ///      ^^^
    /// ```
    /// No trailing newline is written, so a message may be
    /// appended after the carets.
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if self.is_empty() {
            return write!(f, "ERROR:");
        }

        let (line, col) = self.line_col();
        writeln!(f, "ERROR: line {}, column {}", line, col)?;
        writeln!(f, "{}", self.line_contents())?;
        write!(f, "{}{}", " ".repeat(col - 1), "^".repeat(self.length.max(1)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn line_col() {
        let source = Source::source("(+ 1 2)\n(def a 2)\n");
        let span = Span::new(&source, 13, 1);
        assert_eq!(span.line_col(), (2, 6));
        assert_eq!(span.contents(), "a");
        assert_eq!(span.line_contents(), "(def a 2)");
    }

    #[test]
    fn underline() {
        let source = Source::source("(foo bar)");
        let span = Span::new(&source, 5, 3);

        let target = "\
ERROR: line 1, column 6
(foo bar)
     ^^^";
        assert_eq!(format!("{}", span), target);
    }

    #[test]
    fn first_line() {
        let source = Source::source("hello");
        let span = Span::new(&source, 0, 5);
        assert_eq!(span.line_col(), (1, 1));
        assert_eq!(span.line_contents(), "hello");
    }
}
