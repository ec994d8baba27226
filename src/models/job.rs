// Job plan data models
use super::InputFile;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One worker invocation: one input file with one seed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSpec {
    pub input_file: InputFile,
    /// Input base name used in marker lines and output names.
    pub name: String,
    pub replicate: u32,
    pub seed: u64,
    pub output_file_path: PathBuf,
    /// Arguments passed to the worker binary, excluding the binary itself.
    pub argument_vector: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchPlan {
    pub jobs: Vec<JobSpec>,
    pub worker_binary: PathBuf,
    pub output_directory: PathBuf,
    pub log_file_path: PathBuf,
    pub script_path: PathBuf,
    pub concurrency_limit: usize,
}

impl BatchPlan {
    pub fn total_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Number of waves: groups of up to `concurrency_limit` jobs run together.
    pub fn wave_count(&self) -> usize {
        self.jobs.len().div_ceil(self.concurrency_limit.max(1))
    }
}
