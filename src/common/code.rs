use std::fmt::Write as _;

use crate::common::opcode::Opcode;

/// `Code` is a single contiguous run of bytecode: one byte
/// per opcode, operands spliced in right after it in
/// little-endian order. The write cursor is simply the end
/// of the buffer, and any read past the end produces the
/// zero byte, which the processor treats as a terminator.
///
/// Jump operands are signed offsets relative to the address
/// of the jump opcode itself, so a block of code means the
/// same thing no matter where it sits in a buffer. This is
/// what lets `CreateClosure` lift a function body out into
/// its own buffer without rewriting anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Code {
    bytes: Vec<u8>,
}

/// The width of a reserved jump: one opcode byte plus a
/// four-byte relative offset.
pub const JUMP_WIDTH: usize = 5;

impl Code {
    pub fn new() -> Code {
        Code { bytes: vec![] }
    }

    /// Wraps raw bytes, e.g. a closure body lifted out of an
    /// enclosing buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Code {
        Code { bytes }
    }

    /// The write cursor, i.e. where the next byte lands.
    pub fn end(&self) -> usize {
        self.bytes.len()
    }

    /// Rewinds the write cursor, discarding everything at
    /// and after `mark`. Reads past the new end fetch the
    /// zero terminator again.
    pub fn rewind(&mut self, mark: usize) {
        self.bytes.truncate(mark);
    }

    pub fn emit(&mut self, op: Opcode) {
        self.bytes.push(op as u8);
    }

    pub fn emit_i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_f64(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Emits a length-prefixed string: a `u32` byte count
    /// followed by the UTF-8 bytes themselves.
    pub fn emit_str(&mut self, value: &str) {
        self.bytes
            .extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(value.as_bytes());
    }

    /// Reserves space for a jump whose target is not known
    /// yet, returning the address of the future opcode so it
    /// can be back-patched with `patch_jump`.
    pub fn reserve_jump(&mut self) -> usize {
        let at = self.end();
        self.bytes.extend_from_slice(&[0; JUMP_WIDTH]);
        at
    }

    /// Back-patches a reserved jump at `at` so that taking
    /// it lands on `to`. The offset written is relative to
    /// the jump opcode itself.
    pub fn patch_jump(&mut self, at: usize, op: Opcode, to: usize) {
        self.bytes[at] = op as u8;
        let offset = (to as i64 - at as i64) as i32;
        self.bytes[at + 1..at + JUMP_WIDTH].copy_from_slice(&offset.to_le_bytes());
    }

    /// The byte at `at`, or the zero terminator past the end.
    pub fn byte(&self, at: usize) -> u8 {
        self.bytes.get(at).copied().unwrap_or(0)
    }

    pub fn read_i32(&self, at: usize) -> i32 {
        match self.bytes.get(at..at + 4) {
            Some(bytes) => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            None => 0,
        }
    }

    pub fn read_u32(&self, at: usize) -> u32 {
        self.read_i32(at) as u32
    }

    pub fn read_f64(&self, at: usize) -> f64 {
        match self.bytes.get(at..at + 8) {
            Some(bytes) => {
                let mut raw = [0; 8];
                raw.copy_from_slice(bytes);
                f64::from_le_bytes(raw)
            }
            None => 0.0,
        }
    }

    /// A borrowed run of bytes, clamped to the buffer.
    pub fn slice(&self, from: usize, to: usize) -> &[u8] {
        &self.bytes[from.min(self.bytes.len())..to.min(self.bytes.len())]
    }

    /// Walks the buffer and returns the offset and opcode of
    /// every instruction up to the terminator. Anything a
    /// jump lands on must be one of these offsets.
    pub fn instructions(&self) -> Vec<(usize, Opcode)> {
        let mut listing = vec![];
        let mut at = 0;

        while let Some(op) = Opcode::from_byte(self.byte(at)) {
            listing.push((at, op));
            at += 1 + op.operand_width();
            if op == Opcode::PushStr {
                // skip over the string bytes after the length prefix
                at += self.read_u32(at - 4) as usize;
            }
        }

        listing
    }

    /// Dumps a human-readable bytecode listing for
    /// inspection.
    pub fn dump(&self) -> String {
        let mut listing = String::new();

        for (at, op) in self.instructions() {
            let _ = match op {
                Opcode::PushInt | Opcode::PushRef | Opcode::Store | Opcode::Call => {
                    writeln!(listing, "{:>6}  {:?} {}", at, op, self.read_i32(at + 1))
                }
                Opcode::PushFloat => {
                    writeln!(listing, "{:>6}  {:?} {}", at, op, self.read_f64(at + 1))
                }
                Opcode::PushStr => {
                    let len = self.read_u32(at + 1) as usize;
                    let bytes = self.slice(at + 5, at + 5 + len);
                    writeln!(
                        listing,
                        "{:>6}  {:?} {:?}",
                        at,
                        op,
                        String::from_utf8_lossy(bytes)
                    )
                }
                Opcode::Jmp | Opcode::JmpTrue | Opcode::JmpFalse => {
                    let offset = self.read_i32(at + 1);
                    writeln!(
                        listing,
                        "{:>6}  {:?} {:+} (to {})",
                        at,
                        op,
                        offset,
                        at as i64 + offset as i64
                    )
                }
                Opcode::CreateClosure => {
                    writeln!(
                        listing,
                        "{:>6}  {:?} body={}",
                        at,
                        op,
                        self.read_i32(at + 1)
                    )
                }
                _ => writeln!(listing, "{:>6}  {:?}", at, op),
            };
        }

        listing
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sentinel_past_end() {
        let mut code = Code::new();
        code.emit(Opcode::Add);
        assert_eq!(code.byte(0), Opcode::Add as u8);
        assert_eq!(code.byte(1), 0);
        assert_eq!(code.byte(4096), 0);
    }

    #[test]
    fn operands_round_trip() {
        let mut code = Code::new();
        code.emit(Opcode::PushInt);
        code.emit_i32(-42);
        code.emit(Opcode::PushFloat);
        code.emit_f64(2.5);
        code.emit(Opcode::PushStr);
        code.emit_str("boba");

        assert_eq!(code.read_i32(1), -42);
        assert_eq!(code.read_f64(6), 2.5);
        assert_eq!(code.read_u32(15), 4);
        assert_eq!(code.slice(19, 23), b"boba");
    }

    #[test]
    fn patching() {
        let mut code = Code::new();
        let at = code.reserve_jump();
        code.emit(Opcode::PushNil);
        code.patch_jump(at, Opcode::Jmp, code.end());

        assert_eq!(code.byte(at), Opcode::Jmp as u8);
        assert_eq!(code.read_i32(at + 1), 6);
    }

    #[test]
    fn rewind_discards() {
        let mut code = Code::new();
        code.emit(Opcode::PushNil);
        let mark = code.end();
        code.emit(Opcode::PushTrue);
        code.rewind(mark);

        assert_eq!(code.end(), mark);
        assert_eq!(code.byte(mark), 0);
    }

    #[test]
    fn listing_walks_operands() {
        let mut code = Code::new();
        code.emit(Opcode::PushInt);
        code.emit_i32(7);
        code.emit(Opcode::PushStr);
        code.emit_str("hi");
        code.emit(Opcode::Add);

        let offsets: Vec<usize> = code.instructions().iter().map(|(at, _)| *at).collect();
        assert_eq!(offsets, vec![0, 5, 12]);
    }
}
