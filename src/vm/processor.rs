use std::rc::Rc;

use crate::common::closure::Closure;
use crate::common::code::Code;
use crate::common::opcode::Opcode;
use crate::common::value::Value;
use crate::vm::env::Env;
use crate::vm::trace::Trace;

/// A dispatch handler. On entry the instruction pointer
/// sits just past the opcode byte; the handler reads its
/// operands and leaves the pointer past them, or rewrites
/// it entirely for jumps, calls, and returns.
type Handler = fn(&mut Processor) -> Result<(), Trace>;

/// Where to resume after a `Ret`: the code that was running
/// (the root buffer when `running` is `None`) and the
/// offset of the instruction after the call.
struct ReturnSite {
    running: Option<Rc<Closure>>,
    ip: usize,
}

/// The virtual machine. Owns the shared instruction buffer,
/// the value stack, the environment stack, and the call
/// stack, and executes bytecode one opcode at a time
/// through a table of handlers indexed by the raw byte.
pub struct Processor {
    /// The instruction buffer top-level code is emitted into.
    pub code: Code,
    /// Offset of the next byte to execute.
    ip: usize,
    /// The closure whose body is currently executing; the
    /// root buffer when `None`.
    running: Option<Rc<Closure>>,
    stack: Vec<Value>,
    envs: Vec<Env>,
    calls: Vec<ReturnSite>,
    dispatch: [Handler; 256],
}

impl Processor {
    pub fn new() -> Processor {
        let mut dispatch: [Handler; 256] = [bad_opcode; 256];

        dispatch[Opcode::PushInt as usize] = push_int;
        dispatch[Opcode::PushFloat as usize] = push_float;
        dispatch[Opcode::PushStr as usize] = push_str;
        dispatch[Opcode::PushTrue as usize] = push_true;
        dispatch[Opcode::PushFalse as usize] = push_false;
        dispatch[Opcode::PushNil as usize] = push_nil;
        dispatch[Opcode::PushRef as usize] = push_ref;
        dispatch[Opcode::Store as usize] = store;
        dispatch[Opcode::Jmp as usize] = jmp;
        dispatch[Opcode::JmpTrue as usize] = jmp_true;
        dispatch[Opcode::JmpFalse as usize] = jmp_false;
        dispatch[Opcode::Call as usize] = call;
        dispatch[Opcode::CallPop as usize] = call_pop;
        dispatch[Opcode::CreateClosure as usize] = create_closure;
        dispatch[Opcode::Ret as usize] = ret;
        dispatch[Opcode::Not as usize] = not;
        dispatch[Opcode::And as usize] = and;
        dispatch[Opcode::Or as usize] = or;
        dispatch[Opcode::Eq as usize] = eq;
        dispatch[Opcode::Greater as usize] = greater;
        dispatch[Opcode::GreaterEq as usize] = greater_eq;
        dispatch[Opcode::Less as usize] = less;
        dispatch[Opcode::LessEq as usize] = less_eq;
        dispatch[Opcode::Add as usize] = add;
        dispatch[Opcode::Sub as usize] = sub;
        dispatch[Opcode::Mul as usize] = mul;
        dispatch[Opcode::Div as usize] = div;
        dispatch[Opcode::Neg as usize] = neg;

        Processor {
            code: Code::new(),
            ip: 0,
            running: None,
            stack: vec![],
            envs: vec![Env::new()],
            calls: vec![],
            dispatch,
        }
    }

    /// The fetch-execute loop. Runs until the current code
    /// yields the zero terminator, which for well-formed
    /// bytecode only ever happens at the root buffer's
    /// write cursor.
    pub fn run(&mut self) -> Result<(), Trace> {
        loop {
            let byte = self.running_code().byte(self.ip);
            if byte == 0 {
                break;
            }
            self.ip += 1;
            self.dispatch[byte as usize](self)?;
        }

        if !self.calls.is_empty() {
            return Err(Trace::error(
                "Internal Error",
                "ran off the end of a closure body",
            ));
        }
        Ok(())
    }

    /// Binds a value in the global environment. Used to
    /// install builtins before any code runs.
    pub fn define_global(&mut self, index: u32, value: Value) {
        self.envs[0].set(index, value);
    }

    /// Rewinds the write cursor to `mark`, discarding the
    /// bytecode after it, and parks the instruction pointer
    /// there. Sound for any expression whose bytecode can
    /// no longer be reached: closures copy their bodies out
    /// at creation time.
    pub fn rewind(&mut self, mark: usize) {
        self.code.rewind(mark);
        self.ip = mark;
    }

    /// Recovers from a runtime fault: the value and call
    /// stacks are emptied, the environment stack drops back
    /// to the global environment, and the instruction
    /// pointer skips to the end of the emitted code.
    pub fn recover(&mut self) {
        self.stack.clear();
        self.calls.clear();
        self.envs.truncate(1);
        self.running = None;
        self.ip = self.code.end();
    }

    /// Pops the result of a finished top-level expression,
    /// or `Nil` when it left nothing, and empties the stack.
    pub fn take_result(&mut self) -> Value {
        let result = self.stack.pop().unwrap_or(Value::Nil);
        self.stack.clear();
        result
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn call_depth(&self) -> usize {
        self.calls.len()
    }

    fn running_code(&self) -> &Code {
        match &self.running {
            Some(closure) => &closure.code,
            None => &self.code,
        }
    }

    fn fetch_i32(&mut self) -> i32 {
        let value = self.running_code().read_i32(self.ip);
        self.ip += 4;
        value
    }

    fn fetch_f64(&mut self) -> f64 {
        let value = self.running_code().read_f64(self.ip);
        self.ip += 8;
        value
    }

    fn pop(&mut self) -> Result<Value, Trace> {
        self.stack
            .pop()
            .ok_or_else(|| Trace::error("Stack Error", "value stack underflow"))
    }

    fn pop_bool(&mut self) -> Result<bool, Trace> {
        match self.pop()? {
            Value::Bool(b) => Ok(b),
            other => Err(Trace::error(
                "Type Error",
                &format!("expected a bool, found {}", other.kind()),
            )),
        }
    }

    fn env(&self) -> &Env {
        self.envs.last().expect("environment stack is never empty")
    }

    fn env_mut(&mut self) -> &mut Env {
        self.envs
            .last_mut()
            .expect("environment stack is never empty")
    }

    /// Pushes a return site and switches execution into a
    /// closure's body, under a copy of its captured
    /// environment.
    fn enter(&mut self, closure: Rc<Closure>) {
        self.calls.push(ReturnSite {
            running: self.running.take(),
            ip: self.ip,
        });
        self.envs.push(closure.captured.borrow().clone());
        self.running = Some(closure);
        self.ip = 0;
    }
}

impl Default for Processor {
    fn default() -> Processor {
        Processor::new()
    }
}

fn bad_opcode(proc: &mut Processor) -> Result<(), Trace> {
    let byte = proc.running_code().byte(proc.ip - 1);
    Err(Trace::error(
        "Internal Error",
        &format!("invalid opcode byte {:#04x}", byte),
    ))
}

fn push_int(proc: &mut Processor) -> Result<(), Trace> {
    let value = proc.fetch_i32();
    proc.stack.push(Value::Int(value as i64));
    Ok(())
}

fn push_float(proc: &mut Processor) -> Result<(), Trace> {
    let value = proc.fetch_f64();
    proc.stack.push(Value::Float(value));
    Ok(())
}

fn push_str(proc: &mut Processor) -> Result<(), Trace> {
    let length = proc.fetch_i32() as usize;
    let bytes = proc.running_code().slice(proc.ip, proc.ip + length).to_vec();
    proc.ip += length;

    match String::from_utf8(bytes) {
        Ok(text) => {
            proc.stack.push(Value::Str(Rc::new(text)));
            Ok(())
        }
        Err(_) => Err(Trace::error(
            "Internal Error",
            "string constant is not valid utf-8",
        )),
    }
}

fn push_true(proc: &mut Processor) -> Result<(), Trace> {
    proc.stack.push(Value::Bool(true));
    Ok(())
}

fn push_false(proc: &mut Processor) -> Result<(), Trace> {
    proc.stack.push(Value::Bool(false));
    Ok(())
}

fn push_nil(proc: &mut Processor) -> Result<(), Trace> {
    proc.stack.push(Value::Nil);
    Ok(())
}

fn push_ref(proc: &mut Processor) -> Result<(), Trace> {
    let index = proc.fetch_i32() as u32;
    match proc.env().get(index) {
        Some(value) => {
            let value = value.clone();
            proc.stack.push(value);
            Ok(())
        }
        None => Err(Trace::error(
            "Reference Error",
            &format!("nothing bound in the current environment at index {}", index),
        )),
    }
}

fn store(proc: &mut Processor) -> Result<(), Trace> {
    let index = proc.fetch_i32() as u32;
    let value = proc.pop()?;

    // A closure being bound also receives itself in its own
    // captured environment, so recursive calls resolve.
    if let Value::Closure(closure) = &value {
        closure.captured.borrow_mut().set(index, value.clone());
    }

    proc.env_mut().set(index, value);
    Ok(())
}

fn jmp(proc: &mut Processor) -> Result<(), Trace> {
    let at = proc.ip - 1;
    let offset = proc.fetch_i32();
    proc.ip = (at as i64 + offset as i64) as usize;
    Ok(())
}

fn jmp_true(proc: &mut Processor) -> Result<(), Trace> {
    let at = proc.ip - 1;
    let condition = proc.pop_bool()?;
    let offset = proc.fetch_i32();
    if condition {
        proc.ip = (at as i64 + offset as i64) as usize;
    }
    Ok(())
}

fn jmp_false(proc: &mut Processor) -> Result<(), Trace> {
    let at = proc.ip - 1;
    let condition = proc.pop_bool()?;
    let offset = proc.fetch_i32();
    if !condition {
        proc.ip = (at as i64 + offset as i64) as usize;
    }
    Ok(())
}

fn call(proc: &mut Processor) -> Result<(), Trace> {
    let index = proc.fetch_i32() as u32;
    let value = match proc.env().get(index) {
        Some(value) => value.clone(),
        None => {
            return Err(Trace::error(
                "Reference Error",
                &format!("nothing bound in the current environment at index {}", index),
            ))
        }
    };

    match value {
        Value::Closure(closure) => {
            proc.enter(closure);
            Ok(())
        }
        other => Err(Trace::error(
            "Type Error",
            &format!("can't call {}", other.kind()),
        )),
    }
}

fn call_pop(proc: &mut Processor) -> Result<(), Trace> {
    match proc.pop()? {
        Value::Closure(closure) => {
            proc.enter(closure);
            Ok(())
        }
        other => Err(Trace::error(
            "Type Error",
            &format!("can't call {}", other.kind()),
        )),
    }
}

fn create_closure(proc: &mut Processor) -> Result<(), Trace> {
    let at = proc.ip - 1;
    let body_len = proc.fetch_i32() as usize;
    if body_len > at {
        return Err(Trace::error(
            "Internal Error",
            "closure body is longer than the code before it",
        ));
    }

    // The body is the run of bytes just before this
    // instruction; lift it out so the closure stays valid
    // even if this region of the buffer is reclaimed.
    let body = proc.running_code().slice(at - body_len, at).to_vec();
    let captured = proc.env().clone();
    let closure = Closure::wrap(Code::from_bytes(body), captured);

    proc.stack.push(Value::Closure(Rc::new(closure)));
    Ok(())
}

fn ret(proc: &mut Processor) -> Result<(), Trace> {
    let site = match proc.calls.pop() {
        Some(site) => site,
        None => {
            return Err(Trace::error(
                "Stack Error",
                "no return address on the call stack",
            ))
        }
    };

    if proc.envs.len() <= 1 {
        return Err(Trace::error(
            "Internal Error",
            "return would pop the global environment",
        ));
    }

    proc.envs.pop();
    proc.running = site.running;
    proc.ip = site.ip;
    Ok(())
}

fn not(proc: &mut Processor) -> Result<(), Trace> {
    let value = proc.pop_bool()?;
    proc.stack.push(Value::Bool(!value));
    Ok(())
}

fn and(proc: &mut Processor) -> Result<(), Trace> {
    let rhs = proc.pop_bool()?;
    let lhs = proc.pop_bool()?;
    proc.stack.push(Value::Bool(lhs && rhs));
    Ok(())
}

fn or(proc: &mut Processor) -> Result<(), Trace> {
    let rhs = proc.pop_bool()?;
    let lhs = proc.pop_bool()?;
    proc.stack.push(Value::Bool(lhs || rhs));
    Ok(())
}

fn eq(proc: &mut Processor) -> Result<(), Trace> {
    let rhs = proc.pop()?;
    let lhs = proc.pop()?;

    let equal = match (&lhs, &rhs) {
        (Value::Int(_), Value::Int(_))
        | (Value::Float(_), Value::Float(_))
        | (Value::Bool(_), Value::Bool(_))
        | (Value::Str(_), Value::Str(_))
        | (Value::Symbol(_), Value::Symbol(_))
        | (Value::Nil, Value::Nil)
        | (Value::EmptyList, Value::EmptyList) => lhs == rhs,
        _ => {
            return Err(Trace::error(
                "Type Error",
                &format!("can't compare {} and {}", lhs.kind(), rhs.kind()),
            ))
        }
    };

    proc.stack.push(Value::Bool(equal));
    Ok(())
}

/// Pops the right then the left operand and applies an
/// ordering. Only values of the same numeric kind compare;
/// anything else is a fault.
fn comparison(
    proc: &mut Processor,
    ints: fn(i64, i64) -> bool,
    floats: fn(f64, f64) -> bool,
) -> Result<(), Trace> {
    let rhs = proc.pop()?;
    let lhs = proc.pop()?;

    let result = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => ints(*a, *b),
        (Value::Float(a), Value::Float(b)) => floats(*a, *b),
        _ => {
            return Err(Trace::error(
                "Type Error",
                &format!("can't compare {} and {}", lhs.kind(), rhs.kind()),
            ))
        }
    };

    proc.stack.push(Value::Bool(result));
    Ok(())
}

fn greater(proc: &mut Processor) -> Result<(), Trace> {
    comparison(proc, |a, b| a > b, |a, b| a > b)
}

fn greater_eq(proc: &mut Processor) -> Result<(), Trace> {
    comparison(proc, |a, b| a >= b, |a, b| a >= b)
}

fn less(proc: &mut Processor) -> Result<(), Trace> {
    comparison(proc, |a, b| a < b, |a, b| a < b)
}

fn less_eq(proc: &mut Processor) -> Result<(), Trace> {
    comparison(proc, |a, b| a <= b, |a, b| a <= b)
}

/// Pops the right then the left operand and applies an
/// arithmetic operation. Ints stay ints and floats stay
/// floats; there is no promotion between the two. `None`
/// from the integer operation signals division by zero.
fn arithmetic(
    proc: &mut Processor,
    ints: fn(i64, i64) -> Option<i64>,
    floats: fn(f64, f64) -> f64,
    verb: &str,
) -> Result<(), Trace> {
    let rhs = proc.pop()?;
    let lhs = proc.pop()?;

    let result = match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => match ints(*a, *b) {
            Some(n) => Value::Int(n),
            None => return Err(Trace::error("Arithmetic Error", "division by zero")),
        },
        (Value::Float(a), Value::Float(b)) => Value::Float(floats(*a, *b)),
        _ => {
            return Err(Trace::error(
                "Type Error",
                &format!("can't {} {} and {}", verb, lhs.kind(), rhs.kind()),
            ))
        }
    };

    proc.stack.push(result);
    Ok(())
}

fn add(proc: &mut Processor) -> Result<(), Trace> {
    arithmetic(proc, |a, b| Some(a.wrapping_add(b)), |a, b| a + b, "add")
}

fn sub(proc: &mut Processor) -> Result<(), Trace> {
    arithmetic(proc, |a, b| Some(a.wrapping_sub(b)), |a, b| a - b, "subtract")
}

fn mul(proc: &mut Processor) -> Result<(), Trace> {
    arithmetic(proc, |a, b| Some(a.wrapping_mul(b)), |a, b| a * b, "multiply")
}

fn div(proc: &mut Processor) -> Result<(), Trace> {
    arithmetic(
        proc,
        |a, b| if b == 0 { None } else { Some(a.wrapping_div(b)) },
        |a, b| a / b,
        "divide",
    )
}

fn neg(proc: &mut Processor) -> Result<(), Trace> {
    let result = match proc.pop()? {
        Value::Int(n) => Value::Int(n.wrapping_neg()),
        Value::Float(n) => Value::Float(-n),
        other => {
            return Err(Trace::error(
                "Type Error",
                &format!("can't negate {}", other.kind()),
            ))
        }
    };

    proc.stack.push(result);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn run_bytes(build: impl FnOnce(&mut Code)) -> Result<Value, Trace> {
        let mut proc = Processor::new();
        build(&mut proc.code);
        proc.run()?;
        Ok(proc.take_result())
    }

    #[test]
    fn push_and_add() {
        let result = run_bytes(|code| {
            code.emit(Opcode::PushInt);
            code.emit_i32(2);
            code.emit(Opcode::PushInt);
            code.emit_i32(3);
            code.emit(Opcode::Add);
        });
        assert_eq!(result, Ok(Value::Int(5)));
    }

    #[test]
    fn sub_pops_right_hand_side_first() {
        let result = run_bytes(|code| {
            code.emit(Opcode::PushInt);
            code.emit_i32(1);
            code.emit(Opcode::PushInt);
            code.emit_i32(3);
            code.emit(Opcode::Sub);
        });
        assert_eq!(result, Ok(Value::Int(-2)));
    }

    #[test]
    fn mixed_kinds_fault() {
        let result = run_bytes(|code| {
            code.emit(Opcode::PushInt);
            code.emit_i32(1);
            code.emit(Opcode::PushTrue);
            code.emit(Opcode::Add);
        });
        assert_eq!(
            result,
            Err(Trace::error("Type Error", "can't add int and bool"))
        );
    }

    #[test]
    fn int_float_do_not_promote() {
        let result = run_bytes(|code| {
            code.emit(Opcode::PushInt);
            code.emit_i32(1);
            code.emit(Opcode::PushFloat);
            code.emit_f64(1.0);
            code.emit(Opcode::Add);
        });
        assert!(result.is_err());
    }

    #[test]
    fn division_by_zero_faults() {
        let result = run_bytes(|code| {
            code.emit(Opcode::PushInt);
            code.emit_i32(1);
            code.emit(Opcode::PushInt);
            code.emit_i32(0);
            code.emit(Opcode::Div);
        });
        assert_eq!(
            result,
            Err(Trace::error("Arithmetic Error", "division by zero"))
        );
    }

    #[test]
    fn underflow_faults() {
        let result = run_bytes(|code| {
            code.emit(Opcode::Add);
        });
        assert_eq!(
            result,
            Err(Trace::error("Stack Error", "value stack underflow"))
        );
    }

    #[test]
    fn jump_skips_forward() {
        // jmp +10 over a PushInt 1; only PushInt 2 runs
        let result = run_bytes(|code| {
            let at = code.reserve_jump();
            code.emit(Opcode::PushInt);
            code.emit_i32(1);
            let to = code.end();
            code.patch_jump(at, Opcode::Jmp, to);
            code.emit(Opcode::PushInt);
            code.emit_i32(2);
        });
        assert_eq!(result, Ok(Value::Int(2)));
    }

    #[test]
    fn stray_ret_faults() {
        let result = run_bytes(|code| {
            code.emit(Opcode::Ret);
        });
        assert_eq!(
            result,
            Err(Trace::error(
                "Stack Error",
                "no return address on the call stack"
            ))
        );
    }

    #[test]
    fn recover_resets_the_stacks() {
        let mut proc = Processor::new();
        proc.code.emit(Opcode::PushInt);
        proc.code.emit_i32(1);
        proc.code.emit(Opcode::PushTrue);
        proc.code.emit(Opcode::Add);
        assert!(proc.run().is_err());

        proc.recover();
        assert_eq!(proc.stack_depth(), 0);
        assert_eq!(proc.call_depth(), 0);

        // a fresh expression appended after the fault still runs
        proc.code.emit(Opcode::PushInt);
        proc.code.emit_i32(9);
        assert_eq!(proc.run(), Ok(()));
        assert_eq!(proc.take_result(), Value::Int(9));
    }
}
