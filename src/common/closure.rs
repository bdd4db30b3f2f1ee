use std::cell::RefCell;

use crate::common::code::Code;
use crate::common::opcode::Opcode;
use crate::vm::env::Env;

/// A callable value: a complete body of bytecode, ending in
/// `Ret`, together with a snapshot of the environment it
/// was created in. Calling a closure pushes a copy of the
/// captured environment, so every free variable in the body
/// resolves against the closure's lexical context.
///
/// The captured environment sits behind a `RefCell` because
/// `Store` writes a closure back into its own capture when
/// binding it, which is what lets recursive definitions
/// find themselves at call time.
#[derive(Debug)]
pub struct Closure {
    pub arity: usize,
    pub variadic: bool,
    pub code: Code,
    pub captured: RefCell<Env>,
}

impl Closure {
    /// Wraps a function body and the environment snapshot it
    /// captures. The arity is recovered from the body
    /// itself: parameter binds are always the first
    /// instructions emitted, one `Store` per parameter.
    pub fn wrap(code: Code, captured: Env) -> Closure {
        let step = 1 + Opcode::Store.operand_width();
        let mut arity = 0;
        while code.byte(arity * step) == Opcode::Store as u8 {
            arity += 1;
        }

        Closure {
            arity,
            variadic: false,
            code,
            captured: RefCell::new(captured),
        }
    }

    /// Builds a builtin: a closure whose whole body is a
    /// single opcode followed by `Ret`, operating directly
    /// on the caller's operands.
    pub fn builtin(arity: usize, variadic: bool, op: Opcode) -> Closure {
        let mut code = Code::new();
        code.emit(op);
        code.emit(Opcode::Ret);

        Closure {
            arity,
            variadic,
            code,
            captured: RefCell::new(Env::new()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arity_from_parameter_binds() {
        let mut code = Code::new();
        code.emit(Opcode::Store);
        code.emit_i32(3);
        code.emit(Opcode::Store);
        code.emit_i32(2);
        code.emit(Opcode::PushRef);
        code.emit_i32(2);
        code.emit(Opcode::Ret);

        let closure = Closure::wrap(code, Env::new());
        assert_eq!(closure.arity, 2);
        assert!(!closure.variadic);
    }

    #[test]
    fn builtin_body() {
        let builtin = Closure::builtin(2, false, Opcode::Add);
        assert_eq!(builtin.code.byte(0), Opcode::Add as u8);
        assert_eq!(builtin.code.byte(1), Opcode::Ret as u8);
        assert_eq!(builtin.arity, 2);
    }
}
