use std::fmt;

use crate::common::span::Span;

/// Represents a static error (unbalanced parens, undefined
/// symbols, malformed special forms, and so on) found
/// before any code runs. Carries the span of the offending
/// token so the diagnostic can underline it.
#[derive(Debug, PartialEq, Eq)]
pub struct Syntax {
    pub message: String,
    pub span: Span,
}

impl Syntax {
    /// Creates a new static error.
    pub fn error(message: &str, span: &Span) -> Syntax {
        Syntax {
            message: message.to_string(),
            span: span.clone(),
        }
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.span, self.message)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;

    #[test]
    fn underlined_message() {
        let source = Source::source("(def foo)");
        let error = Syntax::error(
            "def expects a name and an expression",
            &Span::new(&source, 5, 3),
        );

        let target = "\
ERROR: line 1, column 6
(def foo)
     ^^^ def expects a name and an expression";
        assert_eq!(format!("{}", error), target);
    }

    #[test]
    fn without_location() {
        let error = Syntax::error("unexpected end of input", &Span::empty());
        assert_eq!(format!("{}", error), "ERROR: unexpected end of input");
    }
}
