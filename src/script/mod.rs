// Execution script generation
pub mod emitter;

pub use emitter::*;
