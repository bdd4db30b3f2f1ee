use std::fmt;
use std::rc::Rc;

use crate::common::closure::Closure;
use crate::common::opcode::Opcode;
use crate::common::source::Source;
use crate::common::value::Value;
use crate::compiler::ast::{Ast, AstKind};
use crate::compiler::emit::Emitter;
use crate::compiler::lex::Lexer;
use crate::compiler::parse::parse;
use crate::compiler::syntax::Syntax;
use crate::vm::processor::Processor;
use crate::vm::trace::Trace;

/// Anything evaluation can fail with: a static error from
/// the compiler or a fault from the processor.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Syntax(Syntax),
    Trace(Trace),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Syntax(syntax) => syntax.fmt(f),
            Error::Trace(trace) => trace.fmt(f),
        }
    }
}

impl From<Syntax> for Error {
    fn from(syntax: Syntax) -> Error {
        Error::Syntax(syntax)
    }
}

impl From<Trace> for Error {
    fn from(trace: Trace) -> Error {
        Error::Trace(trace)
    }
}

/// The builtin table: name, arity, whether extra operands
/// may be folded in by chaining, and the opcode realizing
/// the operation. Order matters: the table claims variable
/// indices 0 upwards.
const BUILTINS: &[(&str, usize, bool, Opcode)] = &[
    ("+", 2, true, Opcode::Add),
    ("-", 2, false, Opcode::Sub),
    ("*", 2, true, Opcode::Mul),
    ("/", 2, false, Opcode::Div),
    ("=", 2, false, Opcode::Eq),
    (">", 2, false, Opcode::Greater),
    (">=", 2, false, Opcode::GreaterEq),
    ("<", 2, false, Opcode::Less),
    ("<=", 2, false, Opcode::LessEq),
    ("and", 2, false, Opcode::And),
    ("or", 2, false, Opcode::Or),
    ("not", 1, false, Opcode::Not),
];

/// The runtime ties the emitter and the processor together
/// behind one operation: `eval` an expression, get a value
/// back. It installs the builtins at construction and
/// keeps both halves' state alive across evaluations, so a
/// sequence of expressions builds up one program.
pub struct Runtime {
    emitter: Emitter,
    proc: Processor,
}

impl Runtime {
    pub fn new() -> Runtime {
        let mut runtime = Runtime {
            emitter: Emitter::new(),
            proc: Processor::new(),
        };

        for (name, arity, variadic, opcode) in BUILTINS {
            runtime.define_builtin(name, *arity, *variadic, *opcode);
        }
        runtime
    }

    /// Installs one builtin: the emitter learns its name
    /// and opcode for inlining, and the global environment
    /// gets a closure wrapping the same opcode so the
    /// builtin can also be passed around as a value.
    fn define_builtin(&mut self, name: &str, arity: usize, variadic: bool, opcode: Opcode) {
        let index = self.emitter.bind_builtin(name, arity, variadic, opcode);
        let closure = Closure::builtin(arity, variadic, opcode);
        self.proc
            .define_global(index, Value::Closure(Rc::new(closure)));
    }

    /// Compiles one top-level expression, runs the
    /// processor until the terminator, and returns the
    /// value left on top of the stack (or nil).
    ///
    /// Bytecode for anything but a `def` can never be
    /// referenced again, so it is reclaimed afterwards by
    /// rewinding the write cursor. A compile error rewinds
    /// too, dropping any partial emission; a runtime fault
    /// leaves the bytecode but clears the stacks.
    pub fn eval(&mut self, ast: &Ast) -> Result<Value, Error> {
        let mark = self.proc.code.end();

        if let Err(error) = self.emitter.emit(&mut self.proc.code, ast) {
            self.proc.rewind(mark);
            return Err(error.into());
        }

        if let Err(fault) = self.proc.run() {
            self.proc.recover();
            return Err(fault.into());
        }

        let result = self.proc.take_result();
        if !is_def(ast) {
            self.proc.rewind(mark);
        }
        Ok(result)
    }

    /// Lexes, parses, and evaluates a whole source,
    /// returning the last top-level expression's value.
    pub fn eval_source(&mut self, src: &str) -> Result<Value, Error> {
        let tokens = Lexer::lex(Source::source(src))?;
        let root = parse(tokens)?;

        let mut result = Value::Nil;
        for expr in &root.children {
            result = self.eval(expr)?;
        }
        Ok(result)
    }

    /// A bytecode listing of everything currently in the
    /// instruction buffer.
    pub fn dump(&self) -> String {
        self.proc.code.dump()
    }

    /// How many values are sitting on the processor's
    /// stacks; zero outside a running expression.
    pub fn stack_depths(&self) -> (usize, usize) {
        (self.proc.stack_depth(), self.proc.call_depth())
    }
}

impl Default for Runtime {
    fn default() -> Runtime {
        Runtime::new()
    }
}

fn is_def(ast: &Ast) -> bool {
    ast.kind == AstKind::Expr
        && ast.children.first().map(|head| head.is_symbol("def")) == Some(true)
}

#[cfg(test)]
mod test {
    use super::*;

    fn eval_str(runtime: &mut Runtime, src: &str) -> Result<Value, Error> {
        runtime.eval_source(src)
    }

    #[test]
    fn builtins_are_values_too() {
        let mut runtime = Runtime::new();
        eval_str(&mut runtime, "(def plus +)").unwrap();
        assert_eq!(eval_str(&mut runtime, "(plus 2 3)"), Ok(Value::Int(5)));
    }

    #[test]
    fn throwaway_bytecode_is_reclaimed() {
        let mut runtime = Runtime::new();
        eval_str(&mut runtime, "(+ 1 2)").unwrap();
        let after_throwaway = runtime.proc.code.end();
        eval_str(&mut runtime, "(def a 2)").unwrap();
        let after_def = runtime.proc.code.end();

        assert_eq!(after_throwaway, 0);
        assert!(after_def > 0);

        // and a def's bytecode stays valid afterwards
        assert_eq!(eval_str(&mut runtime, "a"), Ok(Value::Int(2)));
    }

    #[test]
    fn compile_error_rewinds_partial_emission() {
        let mut runtime = Runtime::new();
        assert!(eval_str(&mut runtime, "(+ 1 nope)").is_err());
        assert_eq!(runtime.proc.code.end(), 0);
        assert_eq!(eval_str(&mut runtime, "(+ 1 2)"), Ok(Value::Int(3)));
    }

    #[test]
    fn faults_recover() {
        let mut runtime = Runtime::new();
        assert!(eval_str(&mut runtime, "(+ 1 true)").is_err());
        assert_eq!(runtime.stack_depths(), (0, 0));
        assert_eq!(eval_str(&mut runtime, "(+ 1 2)"), Ok(Value::Int(3)));
    }
}
