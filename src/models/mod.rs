// Data models (structs)
pub mod batch;
pub mod input_file;
pub mod job;
pub mod run_params;
pub mod settings;

pub use batch::*;
pub use input_file::*;
pub use job::*;
pub use run_params::*;
pub use settings::*;
