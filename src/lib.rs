//! # Boba
//! This crate contains the core of the Boba programming
//! language: a small Lisp compiled in a single pass to
//! bytecode and run on a light stack-based VM.
//!
//! ## Overview of the pipeline
//! Source code is represented as a [`Source`]: a string
//! with a path telling where it came from. Regions of a
//! source are marked with [`Span`]s, which tokens and AST
//! nodes carry so that errors can point at real code.
//!
//! The [`compiler::Lexer`] reads a source and produces a
//! flat token stream; the [`compiler::parse`] function
//! builds the s-expression tree out of it. Both raise
//! [`Syntax`] on malformed input.
//!
//! The interesting part is the [`compiler::Emitter`]: it
//! walks one expression at a time and appends bytecode to
//! the processor's instruction buffer, resolving symbols
//! against a compile-time scope stack. Conditionals and
//! lambda bodies are wired up with relative jumps that are
//! back-patched once their targets are known.
//!
//! The [`vm::Processor`] owns the instruction buffer and
//! executes it byte by byte through a dispatch table:
//! a value stack, a stack of environments (variable index
//! to value), and a call stack of return sites. Faults
//! surface as [`Trace`]s.
//!
//! A [`Runtime`] wraps the two halves behind a single
//! operation:
//!
//! ```
//! use boba::Runtime;
//!
//! let mut runtime = Runtime::new();
//! let result = runtime.eval_source("(+ 2 3)").unwrap();
//! assert_eq!(result.to_string(), "5");
//! ```
//!
//! Closures capture their environment by snapshot when
//! they are created; calling one runs its body under a
//! copy of that snapshot, so later changes around the
//! closure don't reach into it.

pub mod common;
pub mod compiler;
pub mod runtime;
pub mod vm;

pub use common::{Closure, Code, Opcode, Source, Span, Value};
pub use compiler::{parse, Ast, AstKind, Emitter, Lexer, Parser, Syntax, Token, TokenKind};
pub use runtime::{Error, Runtime};
pub use vm::{Processor, Trace};

/// Evaluates a string of source against a fresh runtime,
/// returning the last top-level expression's value.
pub fn eval(src: &str) -> Result<Value, Error> {
    Runtime::new().eval_source(src)
}
