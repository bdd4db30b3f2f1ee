//! Datastructures shared by the `compiler` and the `vm`:
//!
//! - Source code representation and span annotations.
//! - Opcodes and the instruction buffer.
//! - Runtime values and closures.

pub mod closure;
pub mod code;
pub mod opcode;
pub mod source;
pub mod span;
pub mod value;

pub use closure::Closure;
pub use code::Code;
pub use opcode::Opcode;
pub use source::Source;
pub use span::Span;
pub use value::Value;
