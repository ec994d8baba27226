// Job planning: seeds, plan expansion, advanced flags and validation
pub mod advanced;
pub mod plan;
pub mod seeds;
pub mod validate;

pub use advanced::*;
pub use plan::*;
pub use seeds::*;
pub use validate::*;
