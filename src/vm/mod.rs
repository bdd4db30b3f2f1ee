//! The back half of the pipeline: the processor that
//! executes the instruction buffer, the environments it
//! binds values in, and the fault type it reports with.

pub mod env;
pub mod processor;
pub mod trace;

pub use env::Env;
pub use processor::Processor;
pub use trace::Trace;
