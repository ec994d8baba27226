// Settings data models
use super::{ExecutionMode, RunParameters};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub worker_binary_path: Option<String>,
    #[serde(default)]
    pub default_parameters: RunParameters,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: usize,
}

fn default_history_limit() -> usize {
    50
}

fn default_log_tail_lines() -> usize {
    200
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            worker_binary_path: None,
            default_parameters: RunParameters::default(),
            execution_mode: ExecutionMode::default(),
            history_limit: default_history_limit(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

/// Persisted summary of a finished batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchRunRecord {
    pub id: String,
    pub status: super::BatchStatus,
    pub input_files: Vec<String>,
    pub total_jobs: usize,
    pub succeeded_jobs: usize,
    pub failed_jobs: usize,
    pub exit_code: Option<i32>,
    pub output_directory: String,
    pub log_file_path: String,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl BatchRunRecord {
    pub fn from_run(run: &super::BatchRun, input_files: &[super::InputFile]) -> Self {
        Self {
            id: run.id.clone(),
            status: run.status,
            input_files: input_files
                .iter()
                .map(|f| f.path.to_string_lossy().to_string())
                .collect(),
            total_jobs: run.total_jobs,
            succeeded_jobs: run.succeeded_jobs,
            failed_jobs: run.failed_jobs,
            exit_code: run.exit_code,
            output_directory: run.output_directory.to_string_lossy().to_string(),
            log_file_path: run.log_file_path.to_string_lossy().to_string(),
            started_at: run.started_at.clone(),
            finished_at: run.finished_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_old_settings_file_gets_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "worker_binary_path": "/opt/phase/PHASE" }"#).unwrap();
        assert_eq!(settings.worker_binary_path.as_deref(), Some("/opt/phase/PHASE"));
        assert_eq!(settings.history_limit, 50);
        assert_eq!(settings.log_tail_lines, 200);
        assert_eq!(settings.default_parameters, RunParameters::default());
    }
}
