// Job plan construction
use super::seeds::{derive_seeds, offset_seeds};
use crate::error::{BatchError, BatchResult};
use crate::host::{host_parallelism, FALLBACK_MAX_PARALLELISM};
use crate::models::{BatchPlan, InputFile, JobSpec, Parallelism, RunParameters};
use log::debug;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const OUTPUT_DIR_NAME: &str = "ez_phase_output";
pub const LOG_FILE_NAME: &str = "phase_execution.log";
pub const SCRIPT_FILE_NAME: &str = "run_phase.sh";

/// Turn the requested parallelism into a concrete concurrency limit.
///
/// `Auto` uses every logical core. Explicit values are capped at the core
/// count, or at `FALLBACK_MAX_PARALLELISM` when the host does not say.
pub fn resolve_parallelism(requested: Parallelism, available: Option<usize>) -> BatchResult<usize> {
    match requested {
        Parallelism::Auto => Ok(available.unwrap_or(1).max(1)),
        Parallelism::Fixed(0) => Err(BatchError::config("Parallelism must be at least 1")),
        Parallelism::Fixed(n) => {
            let ceiling = available.unwrap_or(FALLBACK_MAX_PARALLELISM).max(1);
            Ok((n as usize).min(ceiling))
        }
    }
}

/// `{dirname(first input)}/ez_phase_output`
pub fn output_directory_for(files: &[InputFile]) -> BatchResult<PathBuf> {
    let first = files
        .first()
        .ok_or_else(|| BatchError::config("No input files specified"))?;
    let parent = first
        .path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| {
            BatchError::config(format!(
                "Cannot determine directory of input file: {}",
                first.path.display()
            ))
        })?;
    Ok(parent.join(OUTPUT_DIR_NAME))
}

pub fn output_file_path(output_dir: &Path, prefix: &str, base_name: &str, seed: u64) -> PathBuf {
    output_dir.join(format!("{}_{}_seed{}.out", prefix, base_name, seed))
}

/// Advanced flags, `-S{seed}`, the five positionals, then `-v` / `-F`.
pub fn build_argument_vector(
    params: &RunParameters,
    input_path: &Path,
    output_path: &Path,
    seed: u64,
) -> Vec<String> {
    let mut args = params.extra_args.clone();
    args.push(format!("-S{}", seed));
    args.push(input_path.to_string_lossy().to_string());
    args.push(output_path.to_string_lossy().to_string());
    args.push(params.iterations.to_string());
    args.push(params.thinning_interval.to_string());
    args.push(params.burnin_steps.to_string());
    if params.flags.verbose {
        args.push("-v".to_string());
    }
    if params.flags.save_all {
        args.push("-F".to_string());
    }
    args
}

/// Build a plan using the host's core count for `Parallelism::Auto`.
pub fn build_plan(
    input_files: &[InputFile],
    params: &RunParameters,
    worker_binary: &Path,
) -> BatchResult<BatchPlan> {
    build_plan_with_host(input_files, params, worker_binary, host_parallelism())
}

pub fn build_plan_with_host(
    input_files: &[InputFile],
    params: &RunParameters,
    worker_binary: &Path,
    available_units: Option<usize>,
) -> BatchResult<BatchPlan> {
    if input_files.is_empty() {
        return Err(BatchError::config("No input files specified"));
    }
    if params.replicates < 1 {
        return Err(BatchError::config("Replicates per file must be at least 1"));
    }
    if params.output_prefix.contains(['/', '\\']) {
        return Err(BatchError::config(format!(
            "Output prefix must not contain path separators: {}",
            params.output_prefix
        )));
    }

    let concurrency_limit = resolve_parallelism(params.parallelism, available_units)?;
    let output_directory = output_directory_for(input_files)?;

    let replicates = params.replicates as usize;
    if let Some(seed) = params.base_seed {
        if offset_seeds(seed, replicates).is_none() {
            return Err(BatchError::config(format!(
                "Seed {} is too large for {} replicates",
                seed, replicates
            )));
        }
    }
    // One draw per plan: every file reuses the same replicate seeds.
    let seeds = derive_seeds(params.base_seed, replicates);

    let mut jobs = Vec::with_capacity(input_files.len() * replicates);
    let mut seen_outputs = HashSet::new();

    for file in input_files {
        let name = file.base_name();
        for (replicate, &seed) in seeds.iter().enumerate() {
            let output_file_path =
                output_file_path(&output_directory, &params.output_prefix, &name, seed);

            if !seen_outputs.insert(output_file_path.clone()) {
                return Err(BatchError::config(format!(
                    "Two jobs would write the same output file: {}",
                    output_file_path.display()
                )));
            }

            let argument_vector =
                build_argument_vector(params, &file.path, &output_file_path, seed);

            jobs.push(JobSpec {
                input_file: file.clone(),
                name: name.clone(),
                replicate: replicate as u32,
                seed,
                output_file_path,
                argument_vector,
            });
        }
    }

    debug!(
        "Built plan: {} jobs, concurrency {}, output {:?}",
        jobs.len(),
        concurrency_limit,
        output_directory
    );

    Ok(BatchPlan {
        jobs,
        worker_binary: worker_binary.to_path_buf(),
        log_file_path: output_directory.join(LOG_FILE_NAME),
        script_path: output_directory.join(SCRIPT_FILE_NAME),
        output_directory,
        concurrency_limit,
    })
}
