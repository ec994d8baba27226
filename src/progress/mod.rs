// Progress tracking
pub mod aggregator;
pub mod markers;

pub use aggregator::*;
pub use markers::*;
