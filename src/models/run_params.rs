// Run parameter data models
use serde::{Deserialize, Serialize};

/// Requested concurrency bound for a batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Parallelism {
    /// One worker per logical core.
    #[default]
    Auto,
    Fixed(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunFlags {
    /// `-v`
    #[serde(default)]
    pub verbose: bool,
    /// `-F`
    #[serde(default)]
    pub save_all: bool,
}

/// Snapshot of the run configuration taken when a batch starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunParameters {
    pub iterations: u32,
    pub burnin_steps: u32,
    pub thinning_interval: u32,
    pub output_prefix: String,
    #[serde(default)]
    pub parallelism: Parallelism,
    /// Independent seeds per input file. Concurrency is governed by
    /// `parallelism` alone.
    #[serde(default = "default_replicates")]
    pub replicates: u32,
    #[serde(default)]
    pub base_seed: Option<u64>,
    /// Opaque worker flags forwarded ahead of the seed, in order.
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default)]
    pub flags: RunFlags,
}

fn default_replicates() -> u32 {
    1
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            iterations: 100,
            burnin_steps: 100,
            thinning_interval: 1,
            output_prefix: String::from("phase_output"),
            parallelism: Parallelism::Auto,
            replicates: default_replicates(),
            base_seed: None,
            extra_args: Vec::new(),
            flags: RunFlags::default(),
        }
    }
}
