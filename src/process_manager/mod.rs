// Batch process management
mod pool;
pub mod executor;
pub mod signal;

pub use executor::*;
pub use signal::Termination;
