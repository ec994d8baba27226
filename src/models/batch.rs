// Batch run data models
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;

/// How a batch plan is executed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Emit `run_phase.sh` and run it under bash in its own process group.
    Script,
    /// Spawn worker processes directly behind a semaphore.
    Pool,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        if cfg!(unix) {
            ExecutionMode::Script
        } else {
            ExecutionMode::Pool
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Cancelling,
    Succeeded,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Succeeded | BatchStatus::Failed | BatchStatus::Cancelled
        )
    }
}

/// Executor lifecycle as seen from outside.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
    Idle,
    Starting,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl From<BatchStatus> for ExecutorState {
    fn from(status: BatchStatus) -> Self {
        match status {
            BatchStatus::Pending => ExecutorState::Starting,
            BatchStatus::Running | BatchStatus::Cancelling => ExecutorState::Running,
            BatchStatus::Succeeded => ExecutorState::Succeeded,
            BatchStatus::Failed => ExecutorState::Failed,
            BatchStatus::Cancelled => ExecutorState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub percent: u8,
    pub completed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionReport {
    pub success: bool,
    pub exit_code: i32,
    pub cancelled: bool,
}

/// Notifications streamed to the subscriber while a batch runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum BatchEvent {
    Output(String),
    Error(String),
    Progress(ProgressUpdate),
    Completed(CompletionReport),
}

/// Reply to a cancellation request. Acknowledgement means the signal was
/// requested, not that the batch has stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelAck {
    pub acknowledged: bool,
    pub message: String,
}

impl CancelAck {
    pub fn acknowledged(message: &str) -> Self {
        Self {
            acknowledged: true,
            message: message.to_string(),
        }
    }

    pub fn rejected(message: &str) -> Self {
        Self {
            acknowledged: false,
            message: message.to_string(),
        }
    }
}

/// Resolved value of a successful batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchOutcome {
    pub output_directory: PathBuf,
    pub processed_job_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    pub id: String,
    pub status: BatchStatus,
    pub mode: ExecutionMode,
    pub completed_jobs: usize,
    pub succeeded_jobs: usize,
    pub failed_jobs: usize,
    pub total_jobs: usize,
    pub output_directory: PathBuf,
    pub log_file_path: PathBuf,
    pub exit_code: Option<i32>,
    pub raw_log_tail: VecDeque<String>,
    #[serde(skip)]
    pub tail_limit: usize,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl BatchRun {
    pub fn new(
        id: String,
        mode: ExecutionMode,
        total_jobs: usize,
        output_directory: PathBuf,
        log_file_path: PathBuf,
        tail_limit: usize,
    ) -> Self {
        Self {
            id,
            status: BatchStatus::Pending,
            mode,
            completed_jobs: 0,
            succeeded_jobs: 0,
            failed_jobs: 0,
            total_jobs,
            output_directory,
            log_file_path,
            exit_code: None,
            raw_log_tail: VecDeque::new(),
            tail_limit,
            started_at: chrono::Utc::now().to_rfc3339(),
            finished_at: None,
        }
    }

    /// Keep the last `tail_limit` lines of combined output.
    pub fn push_log_line(&mut self, line: &str) {
        if self.tail_limit == 0 {
            return;
        }
        while self.raw_log_tail.len() >= self.tail_limit {
            self.raw_log_tail.pop_front();
        }
        self.raw_log_tail.push_back(line.to_string());
    }

    pub fn apply_progress(&mut self, update: &ProgressUpdate) {
        self.completed_jobs = update.completed;
        self.succeeded_jobs = update.succeeded;
        self.failed_jobs = update.failed;
    }

    pub fn finish(&mut self, status: BatchStatus, exit_code: i32) {
        self.status = status;
        self.exit_code = Some(exit_code);
        self.finished_at = Some(chrono::Utc::now().to_rfc3339());
    }
}
